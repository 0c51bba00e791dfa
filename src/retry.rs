//! Retry policy and per-attempt result classification

use std::time::Duration;
use log::debug;
use reqwest::StatusCode;
use crate::error::ErrorKind;
use crate::request::Outcome;

/// Retry policy for generation requests
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy
{   pub max_attempts: usize
  , pub unit: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_attempts: usize
    , unit_ms: u64
    ) -> Self
    {   RetryPolicy
        {   max_attempts
          , unit: Duration::from_millis(unit_ms)
        }
    }

    /// Wait after an HTTP 500 on 0-based `attempt`: `2^attempt` units
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   debug!("Calculating backoff for attempt {}", attempt);
        let factor = 1u32
          .checked_shl(attempt as u32)
          .unwrap_or(u32::MAX);
        self.unit.saturating_mul(factor)
    }

    /// Wait after a refused or dropped connection: fixed, one unit
    pub fn connection_delay(&self) -> Duration
    {   self.unit
    }

    /// True when 0-based `attempt` is the last one allowed
    pub fn is_last(&self, attempt: usize) -> bool
    {   attempt + 1 >= self.max_attempts
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(3, 1000)
    }
}

impl From<&crate::config::RetryConfig> for RetryPolicy
{   fn from(config: &crate::config::RetryConfig) -> Self
    {   RetryPolicy::new(config.max_attempts, config.backoff_unit_ms)
    }
}

/// What one attempt means for the retry loop
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict
{   /// Stop now with this outcome
    Done(Outcome)
  , /// Try again after `delay`; `kind` is reported if attempts run out
    Retry
    {   kind: ErrorKind
      , message: String
      , delay: Duration
    }
}

/// Classify a non-200 status of the generation endpoint
pub fn classify_status(
  policy: &RetryPolicy
, attempt: usize
, status: StatusCode
, model: &str
) -> Verdict
{   match status
    {   StatusCode::NOT_FOUND => Verdict::Done(Outcome::failure(
          ErrorKind::ModelError
        , format!("Model '{}' not found", model)
        ))
      , StatusCode::INTERNAL_SERVER_ERROR => Verdict::Retry
        {   kind: ErrorKind::ServerError
          , message: "Server error (HTTP 500)".to_string()
          , delay: policy.backoff_for_attempt(attempt)
        }
      , other => Verdict::Done(Outcome::failure(
          ErrorKind::ApiError
        , format!("API returned status {}", other.as_u16())
        ))
    }
}

/// Classify a transport-level failure of a generation attempt
pub fn classify_transport(
  policy: &RetryPolicy
, error: &reqwest::Error
) -> Verdict
{   if error.is_timeout()
    {   Verdict::Retry
        {   kind: ErrorKind::TimeoutError
          , message: "Request timed out".to_string()
          , delay: Duration::ZERO
        }
    } else if error.is_connect() || is_dropped_connection(error)
    {   Verdict::Retry
        {   kind: ErrorKind::ConnectionError
          , message: format!("Connection to server failed: {}", error)
          , delay: policy.connection_delay()
        }
    } else
    {   Verdict::Retry
        {   kind: ErrorKind::UnexpectedError
          , message: format!("Unexpected error: {}", error)
          , delay: Duration::ZERO
        }
    }
}

/// Server closed or reset the socket mid-exchange
fn is_dropped_connection(error: &reqwest::Error) -> bool
{   let mut source = std::error::Error::source(error);
    while let Some(err) = source
    {   if let Some(hyper_err) = err.downcast_ref::<hyper::Error>()
        {   if hyper_err.is_incomplete_message() || hyper_err.is_closed()
            {   return true;
            }
        }
        if let Some(io_err) = err.downcast_ref::<std::io::Error>()
        {   if matches!(
              io_err.kind()
            , std::io::ErrorKind::ConnectionReset
              | std::io::ErrorKind::ConnectionAborted
              | std::io::ErrorKind::BrokenPipe
            )
            {   return true;
            }
        }
        source = err.source();
    }
    false
}
