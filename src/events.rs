//! Structured events emitted while serving a `generate` call

use std::sync::Mutex;
use std::time::Duration;
use log::{log, Level};
use crate::error::ErrorKind;

/// One recorded step of a `generate` call
#[derive(Debug, Clone, PartialEq)]
pub enum Event
{   /// Liveness probe failed; no generation was attempted
    ProbeFailed
    {   kind: ErrorKind
      , message: String
      , elapsed: Duration
    }
  , /// A POST is about to be sent; `attempt` is 1-based
    Attempt
    {   model: String
      , temperature: f32
      , prompt_len: usize
      , attempt: usize
    }
  , /// A transient failure; sleeping before the next decision
    Backoff
    {   kind: ErrorKind
      , attempt: usize
      , delay: Duration
    }
  , /// Terminal success
    Success
    {   model: String
      , temperature: f32
      , response_len: usize
      , attempts: usize
      , elapsed: Duration
    }
  , /// Terminal failure
    Failure
    {   model: String
      , kind: ErrorKind
      , message: String
      , attempts: usize
      , elapsed: Duration
    }
}

impl Event
{   /// Action name used as the event key in logs
    pub fn action(&self) -> &'static str
    {   match self
        {   Event::ProbeFailed { .. } => "probe_failed"
          , Event::Attempt { .. } => "generate_attempt"
          , Event::Backoff { .. } => "retry_backoff"
          , Event::Success { .. } => "generate_success"
          , Event::Failure { .. } => "generate_failure"
        }
    }

    /// Log level for this event; only a terminal failure is an error
    pub fn level(&self) -> Level
    {   match self
        {   Event::ProbeFailed { .. } => Level::Warn
          , Event::Attempt { .. } => Level::Debug
          , Event::Backoff { .. } => Level::Warn
          , Event::Success { .. } => Level::Info
          , Event::Failure { .. } => Level::Error
        }
    }
}

/// Receiver for client events
pub trait EventSink: Send + Sync
{   fn record(&self, event: &Event);
}

/// Writes every event through the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink
{   fn record(&self, event: &Event)
    {   let action = event.action();
        let level = event.level();
        match event
        {   Event::ProbeFailed { kind, message, elapsed } => {
              log!(
                level
              , "action={} kind={} elapsed_ms={} message={:?}"
              , action, kind, elapsed.as_millis(), message
              );
            }
          , Event::Attempt { model, temperature, prompt_len, attempt } => {
              log!(
                level
              , "action={} model={} temperature={} prompt_len={} attempt={}"
              , action, model, temperature, prompt_len, attempt
              );
            }
          , Event::Backoff { kind, attempt, delay } => {
              log!(
                level
              , "action={} kind={} attempt={} delay_ms={}"
              , action, kind, attempt, delay.as_millis()
              );
            }
          , Event::Success {
              model, temperature, response_len, attempts, elapsed
            } => {
              log!(
                level
              , "action={} model={} temperature={} response_len={} \
                   attempts={} elapsed_ms={}"
              , action, model, temperature, response_len
              , attempts, elapsed.as_millis()
              );
            }
          , Event::Failure { model, kind, message, attempts, elapsed } => {
              log!(
                level
              , "action={} model={} kind={} attempts={} elapsed_ms={} \
                   message={:?}"
              , action, model, kind, attempts, elapsed.as_millis(), message
              );
            }
        }
    }
}

/// Keeps events in memory, in order
#[derive(Debug, Default)]
pub struct MemorySink
{   events: Mutex<Vec<Event>>
}

impl MemorySink
{   pub fn new() -> Self
    {   MemorySink::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<Event>
    {   match self.events.lock()
        {   Ok(events) => events.clone()
          , Err(poisoned) => poisoned.into_inner().clone()
        }
    }

    /// Number of POST attempts recorded
    pub fn attempts(&self) -> usize
    {   self.events()
          .iter()
          .filter(|e| matches!(e, Event::Attempt { .. }))
          .count()
    }

    /// Backoff delays in the order they were taken
    pub fn delays(&self) -> Vec<Duration>
    {   self.events()
          .iter()
          .filter_map(|e| match e
          {   Event::Backoff { delay, .. } => Some(*delay)
            , _ => None
          })
          .collect()
    }
}

impl EventSink for MemorySink
{   fn record(&self, event: &Event)
    {   match self.events.lock()
        {   Ok(mut events) => events.push(event.clone())
          , Err(poisoned) => poisoned.into_inner().push(event.clone())
        }
    }
}
