//! Wire types for the Ollama endpoint and the Outcome returned to callers

use serde::{Deserialize, Serialize};
use crate::error::ErrorKind;

/// Body of `POST /api/generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest
{   /// Model name
    pub model: String
  , /// The prompt text
    pub prompt: String
  , /// Temperature for sampling
    pub temperature: f32
  , /// Always false; the client reads one complete body
    pub stream: bool
}

impl GenerateRequest
{   pub fn new(
      prompt: &str
    , model: &str
    , temperature: f32
    ) -> Self
    {   GenerateRequest
        {   model: model.to_string()
          , prompt: prompt.to_string()
          , temperature
          , stream: false
        }
    }
}

/// Body of a 200 reply from `/api/generate`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse
{   #[serde(default)]
    pub response: Option<String>
}

/// Body of a 200 reply from `/api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse
{   #[serde(default)]
    pub models: Vec<ModelTag>
}

/// An installed model as reported by `/api/tags`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTag
{   pub name: String
  , #[serde(default)]
    pub size: Option<u64>
  , #[serde(default)]
    pub modified_at: Option<String>
}

/// Result of one `generate` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome
{   Success
    {   response_text: String
    }
  , Failure
    {   error_kind: ErrorKind
      , error_message: String
    }
}

impl Outcome
{   pub fn success(text: impl Into<String>) -> Self
    {   Outcome::Success
        {   response_text: text.into()
        }
    }

    pub fn failure(
      kind: ErrorKind
    , message: impl Into<String>
    ) -> Self
    {   Outcome::Failure
        {   error_kind: kind
          , error_message: message.into()
        }
    }

    pub fn is_success(&self) -> bool
    {   matches!(self, Outcome::Success { .. })
    }

    /// Generated text, if any
    pub fn text(&self) -> Option<&str>
    {   match self
        {   Outcome::Success { response_text } => {
              Some(response_text)
            }
          , Outcome::Failure { .. } => None
        }
    }

    /// Failure class, if any
    pub fn error_kind(&self) -> Option<ErrorKind>
    {   match self
        {   Outcome::Success { .. } => None
          , Outcome::Failure { error_kind, .. } => Some(*error_kind)
        }
    }

    /// Line a chat view appends for this outcome
    pub fn into_reply_text(self) -> String
    {   match self
        {   Outcome::Success { response_text } => response_text
          , Outcome::Failure { error_message, .. } => {
              format!("Sorry, I encountered an error: {}", error_message)
            }
        }
    }
}
