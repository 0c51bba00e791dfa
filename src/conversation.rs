//! Caller-owned chat history and settings.
//!
//! A UI layer keeps one `Conversation` per session and passes it into its
//! handlers; the inference client itself stays stateless.

use log::debug;
use serde::{Deserialize, Serialize};
use crate::client::InferenceClient;
use crate::error::ErrorKind;
use crate::request::Outcome;

pub const DEFAULT_MODEL: &str = "llama2";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Models offered by the chat settings picker
pub const MODEL_OPTIONS: [&str; 3] = ["llama2", "mistral", "codellama"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role
{   User
  , Assistant
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: Role
  , pub content: String
  , /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String
}

impl ChatMessage
{   fn now(role: Role, content: String) -> Self
    {   ChatMessage
        {   role
          , content
          , timestamp: chrono::Local::now().format("%H:%M:%S").to_string()
        }
    }
}

/// Model and temperature used for the next exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings
{   pub model: String
  , pub temperature: f32
}

impl ChatSettings
{   pub fn new(model: impl Into<String>, temperature: f32) -> Self
    {   ChatSettings
        {   model: model.into()
          , temperature
        }
    }

    /// Back to llama2 at 0.7
    pub fn reset(&mut self)
    {   *self = ChatSettings::default();
    }
}

impl Default for ChatSettings
{   fn default() -> Self
    {   ChatSettings::new(DEFAULT_MODEL, DEFAULT_TEMPERATURE)
    }
}

/// Ordered chat history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation
{   messages: Vec<ChatMessage>
}

impl Conversation
{   pub fn new() -> Self
    {   Conversation::default()
    }

    pub fn messages(&self) -> &[ChatMessage]
    {   &self.messages
    }

    pub fn len(&self) -> usize
    {   self.messages.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.messages.is_empty()
    }

    pub fn user_message_count(&self) -> usize
    {   self.messages
          .iter()
          .filter(|m| m.role == Role::User)
          .count()
    }

    pub fn push_user(&mut self, content: impl Into<String>)
    {   self.messages.push(ChatMessage::now(Role::User, content.into()));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>)
    {   self.messages.push(
          ChatMessage::now(Role::Assistant, content.into())
        );
    }

    pub fn clear(&mut self)
    {   debug!("Clearing {} messages", self.messages.len());
        self.messages.clear();
    }

    /// Send `input` and record both sides of the exchange.
    ///
    /// Blank input is refused without touching the history. Otherwise the
    /// assistant line is the reply text or an apology carrying the error.
    pub async fn exchange(
      &mut self
    , client: &InferenceClient
    , settings: &ChatSettings
    , input: &str
    ) -> Outcome
    {   let input = input.trim();
        if input.is_empty()
        {   return Outcome::failure(
              ErrorKind::ValidationError
            , "Please enter a message before sending."
            );
        }

        self.push_user(input);
        let outcome = client
          .generate(input, &settings.model, settings.temperature)
          .await;
        self.push_assistant(outcome.clone().into_reply_text());
        outcome
    }
}
