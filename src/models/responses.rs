use serde::{Deserialize, Serialize};
use crate::models::domain::{MatchBatch, RankedMatch, SpeakerRecord};

/// One ranked speaker in a match response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerMatch {
    pub id: String,
    pub name: String,
    pub title: String,
    pub organization: String,
    pub bio: String,
    pub score: f64,
    pub reasoning: String,
}

impl From<&RankedMatch> for SpeakerMatch {
    fn from(m: &RankedMatch) -> Self {
        Self {
            id: m.speaker.id.clone(),
            name: m.speaker.name.clone(),
            title: m.speaker.title.clone(),
            organization: m.speaker.organization.clone(),
            bio: m.speaker.bio.clone(),
            score: m.result.score,
            reasoning: m.result.reasoning.clone(),
        }
    }
}

/// Response for the match endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResponse {
    pub matches: Vec<SpeakerMatch>,
    pub total_speakers: usize,
    pub matches_found: usize,
}

impl MatchResponse {
    /// Build the response from a batch, either the threshold view or everything
    pub fn from_batch(batch: &MatchBatch, include_all: bool) -> Self {
        let view = if include_all { &batch.results[..] } else { batch.matches() };
        Self {
            matches: view.iter().map(SpeakerMatch::from).collect(),
            total_speakers: batch.total_speakers,
            matches_found: batch.matches_found,
        }
    }
}

/// Response listing the loaded roster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakersResponse {
    pub speakers: Vec<SpeakerRecord>,
    pub count: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub speakers_loaded: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
