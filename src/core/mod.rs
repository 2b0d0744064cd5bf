// Core engine exports
pub mod matcher;
pub mod prompt;
pub mod ranker;
pub mod scoring;

pub use matcher::{MatchingEngine, MatchError, EngineConfig};
pub use prompt::{build_prompt, ScoringPrompt, DEFAULT_BIO_CHAR_LIMIT};
pub use ranker::rank;
pub use scoring::{parse_reply, ScoringClient, ScoringError, RetryPolicy};
