pub mod error;
pub mod config;
pub mod request;
pub mod validate;
pub mod retry;
pub mod events;
pub mod client;
pub mod conversation;

/*

steady: a resilient client for a local Ollama inference server.

Every call to `InferenceClient::generate` yields exactly one `Outcome`:
either the generated text or a classified failure. Nothing else leaks
out, so a chat front end only ever has to map an `ErrorKind` to a
message for the user.

steady/
├── Cargo.toml
├── src/
│   ├── lib.rs           # Re-exports
│   ├── error.rs         # ErrorKind taxonomy and crate Error
│   ├── config.rs        # Endpoint, timeouts, retry settings
│   ├── request.rs       # Wire types and Outcome
│   ├── validate.rs      # Local prompt / parameter checks
│   ├── retry.rs         # Backoff policy and attempt classification
│   ├── events.rs        # Structured event sink
│   ├── client.rs        # generate / list_models
│   └── conversation.rs  # Caller-owned chat history
└── tests/               # End-to-end tests against a mock server

*/

pub use client::InferenceClient;
pub use config::{ClientConfig, RetryConfig};
pub use conversation::{ChatMessage, ChatSettings, Conversation, Role};
pub use error::{Error, ErrorKind};
pub use events::{Event, EventSink, LogSink, MemorySink};
pub use request::{ModelTag, Outcome};

/// Initialize `env_logger` from `RUST_LOG`; safe to call repeatedly
pub fn init_logging()
{   let _ = env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("warn")
    )
    .try_init();
}
