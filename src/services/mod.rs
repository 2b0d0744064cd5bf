// Service exports
pub mod llm;
pub mod roster;

pub use llm::{
    build_backend, AnthropicBackend, BackendConfig, CompletionBackend, LlmError, LlmProvider,
    OpenAiBackend,
};
pub use roster::{Roster, RosterError};
