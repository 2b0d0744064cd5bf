//! Speaker Match - LLM-scored speaker recommendations for conference attendees
//!
//! This library scores every speaker on a conference roster against a
//! free-text description of an attendee's business, one language-model call
//! per speaker, and returns a deterministically ranked result set.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use self::core::{MatchingEngine, MatchError, EngineConfig, ScoringClient, RetryPolicy, build_prompt, rank};
pub use models::{SpeakerRecord, UserProfile, ScoreResult, RankedMatch, MatchBatch, MatchRequest, MatchResponse};
pub use services::{CompletionBackend, LlmError, LlmProvider, Roster};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Verify that the library exports work correctly
        let batch = rank(Vec::new(), 6.0);
        assert_eq!(batch.total_speakers, 0);
    }
}
