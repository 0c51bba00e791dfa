//! Local checks applied before any request leaves the process

use crate::error::ErrorKind;
use crate::request::Outcome;

/// Longest accepted prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Substrings rejected anywhere in a prompt, compared lowercase.
/// A coarse filter, not a security boundary.
pub const DENYLIST: [&str; 4]
  = ["<script", "<?php", "javascript:", "eval("];

pub const MIN_TEMPERATURE: f32 = 0.0;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Check a prompt; the error is a ready-made `validation_error` Outcome
pub fn validate_prompt(prompt: &str) -> Result<(), Outcome>
{   if prompt.trim().is_empty()
    {   return Err(invalid("Prompt cannot be empty"));
    }

    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS
    {   return Err(invalid(format!(
          "Prompt too long ({} characters, max {})"
        , chars, MAX_PROMPT_CHARS
        )));
    }

    let lowered = prompt.to_lowercase();
    if let Some(pattern) = DENYLIST.iter().find(|p| lowered.contains(*p))
    {   return Err(invalid(format!(
          "Prompt contains disallowed content: {}", pattern
        )));
    }

    Ok(())
}

/// Check the rest of a request
pub fn validate_params(
  model: &str
, temperature: f32
) -> Result<(), Outcome>
{   if model.trim().is_empty()
    {   return Err(invalid("Model name cannot be empty"));
    }
    if !temperature.is_finite()
      || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature)
    {   return Err(invalid(format!(
          "Temperature must be between {} and {}, got {}"
        , MIN_TEMPERATURE, MAX_TEMPERATURE, temperature
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> Outcome
{   Outcome::failure(ErrorKind::ValidationError, message)
}
