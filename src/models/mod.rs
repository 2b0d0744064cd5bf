// Model exports
pub mod domain;
pub mod requests;
pub mod responses;

pub use domain::{SpeakerRecord, UserProfile, ScoreResult, RankedMatch, MatchBatch, MIN_SCORE, MAX_SCORE};
pub use requests::{MatchRequest, MIN_BIO_CHARS};
pub use responses::{MatchResponse, SpeakerMatch, SpeakersResponse, HealthResponse, ErrorResponse};
