use std::fmt;
use serde::{Deserialize, Serialize};

/// Classified failure of a `generate` call.
/// Every failed Outcome carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind
{   /// Prompt, model name or temperature rejected before any I/O
    ValidationError
  , /// Endpoint unreachable or refusing connections
    ConnectionError
  , /// Probe or generation request exceeded its timeout
    TimeoutError
  , /// Endpoint does not know the requested model (HTTP 404)
    ModelError
  , /// Success status but the body was not the expected JSON
    JsonError
  , /// Endpoint kept failing with HTTP 500
    ServerError
  , /// Any other non-success HTTP status
    ApiError
  , /// Transport failure that fits no other class
    UnexpectedError
  , /// Retry loop ended without a terminal result
    MaxRetriesExceeded
}

impl ErrorKind
{   /// Wire name of the kind, e.g. `"server_error"`
    pub fn as_str(&self) -> &'static str
    {   match self
        {   ErrorKind::ValidationError => "validation_error"
          , ErrorKind::ConnectionError => "connection_error"
          , ErrorKind::TimeoutError => "timeout_error"
          , ErrorKind::ModelError => "model_error"
          , ErrorKind::JsonError => "json_error"
          , ErrorKind::ServerError => "server_error"
          , ErrorKind::ApiError => "api_error"
          , ErrorKind::UnexpectedError => "unexpected_error"
          , ErrorKind::MaxRetriesExceeded => "max_retries_exceeded"
        }
    }

    /// Whether the client retries this class before giving up
    pub fn is_transient(&self) -> bool
    {   matches!(
          self
        , ErrorKind::ServerError
          | ErrorKind::TimeoutError
          | ErrorKind::ConnectionError
          | ErrorKind::UnexpectedError
        )
    }

    /// Suggested text for a chat view to show the user
    pub fn user_message(&self) -> &'static str
    {   match self
        {   ErrorKind::ValidationError => {
              "Please check your message and try again."
            }
          , ErrorKind::ConnectionError => {
              "Cannot reach the Ollama server. \
               Make sure it is running and try again."
            }
          , ErrorKind::TimeoutError => {
              "The model took too long to answer. \
               Try again later or pick a smaller model."
            }
          , ErrorKind::ModelError => {
              "That model is not installed. \
               Choose another model or pull it with `ollama pull`."
            }
          , ErrorKind::JsonError => {
              "The server sent a response that could not be read."
            }
          , ErrorKind::ServerError => {
              "The Ollama server is having trouble. Try again later."
            }
          , ErrorKind::ApiError => {
              "The Ollama server rejected the request."
            }
          , ErrorKind::UnexpectedError => {
              "Something unexpected went wrong. Please try again."
            }
          , ErrorKind::MaxRetriesExceeded => {
              "The request failed after several attempts. \
               Try again later."
            }
        }
    }
}

impl fmt::Display for ErrorKind
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   f.write_str(self.as_str())
    }
}

/// Error type for operations outside `generate`
/// (config loading, client setup, model listing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error
{   /// Invalid configuration
    InvalidConfiguration(String)
  , /// HTTP request error
    HttpError(String)
  , /// API returned an error response
    ApiError(String)
  , /// Failed to parse API response or config file
    ParseError(String)
  , /// Timeout error
    Timeout
}

impl fmt::Display for Error
{   fn fmt(&self, f: &mut fmt::Formatter<'_>)
      -> fmt::Result
    {   match self
        {   Error::InvalidConfiguration(msg) => {
              write!(f, "Invalid configuration: {}", msg)
            }
          , Error::HttpError(msg) => {
              write!(f, "HTTP error: {}", msg)
            }
          , Error::ApiError(msg) => {
              write!(f, "API error: {}", msg)
            }
          , Error::ParseError(msg) => {
              write!(f, "Parse error: {}", msg)
            }
          , Error::Timeout => {
              write!(f, "Request timed out")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error
{   fn from(e: reqwest::Error) -> Self
    {   if e.is_timeout()
        {   Error::Timeout
        } else
        {   Error::HttpError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error
{   fn from(e: serde_json::Error) -> Self
    {   Error::ParseError(e.to_string())
    }
}

impl From<std::io::Error> for Error
{   fn from(e: std::io::Error) -> Self
    {   Error::InvalidConfiguration(e.to_string())
    }
}
