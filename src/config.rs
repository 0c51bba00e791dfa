//! Configuration for the inference client and its retry behavior

use std::path::Path;
use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

/// Base URL of a local Ollama install
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Environment variable that overrides the base URL
pub const BASE_URL_ENV: &str = "OLLAMA_HOST";

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig
{   /// Max POST attempts per `generate` call
    pub max_attempts: usize
  , /// One backoff unit in milliseconds
    pub backoff_unit_ms: u64
}

impl Default for RetryConfig
{   fn default() -> Self
    {   RetryConfig
        {   max_attempts: 3
          , backoff_unit_ms: 1000
        }
    }
}

/// Inference client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig
{   /// API base URL, without trailing slash
    pub base_url: String
  , /// Liveness probe timeout in milliseconds
    pub probe_timeout_ms: u64
  , /// Generation request timeout in milliseconds
    pub request_timeout_ms: u64
  , /// Retry configuration
    pub retry: RetryConfig
}

impl Default for ClientConfig
{   fn default() -> Self
    {   ClientConfig
        {   base_url: DEFAULT_BASE_URL.to_string()
          , probe_timeout_ms: 5000
          , request_timeout_ms: 30000
          , retry: RetryConfig::default()
        }
    }
}

impl ClientConfig
{   /// Default config pointed at `base_url`
    pub fn with_base_url(base_url: impl Into<String>) -> Self
    {   ClientConfig
        {   base_url: base_url.into()
          , ..ClientConfig::default()
        }
    }

    /// Default config, honoring `OLLAMA_HOST` when set
    pub fn from_env() -> Self
    {   match std::env::var(BASE_URL_ENV)
        {   Ok(host) if !host.trim().is_empty() => {
              debug!("Using {} = {}", BASE_URL_ENV, host);
              let host = host.trim();
              if host.starts_with("http://")
                || host.starts_with("https://")
              {   ClientConfig::with_base_url(host)
              } else
              {   ClientConfig::with_base_url(
                    format!("http://{}", host)
                  )
              }
            }
          , _ => ClientConfig::default()
        }
    }

    /// Load from a JSON file; missing fields take defaults
    pub fn from_json_file(path: impl AsRef<Path>)
      -> Result<Self, crate::error::Error>
    {   let path = path.as_ref();
        debug!("Loading client config from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let config: ClientConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the client cannot run with
    pub fn validate(&self) -> Result<(), crate::error::Error>
    {   let url = self.base_url.trim();
        if url.is_empty()
        {   return Err(crate::error::Error::InvalidConfiguration(
              "base_url is empty".to_string()
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://"))
        {   return Err(crate::error::Error::InvalidConfiguration(
              format!("base_url must be http(s): {}", url)
            ));
        }
        if self.probe_timeout_ms == 0 || self.request_timeout_ms == 0
        {   return Err(crate::error::Error::InvalidConfiguration(
              "timeouts must be non-zero".to_string()
            ));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn base(&self) -> &str
    {   self.base_url.trim().trim_end_matches('/')
    }

    pub fn probe_timeout(&self) -> Duration
    {   Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration
    {   Duration::from_millis(self.request_timeout_ms)
    }
}
