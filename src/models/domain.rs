use serde::{Deserialize, Serialize};

/// Lowest score a speaker can receive
pub const MIN_SCORE: f64 = 0.0;

/// Highest score a speaker can receive
pub const MAX_SCORE: f64 = 10.0;

/// Conference speaker as scraped from the agenda
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default)]
    pub bio: String,
}

/// Free-text description of the attendee's business and goals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub text: String,
}

impl UserProfile {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Relevance judgment for one speaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub speaker_id: String,
    pub score: f64,
    pub reasoning: String,
}

impl ScoreResult {
    /// Build a result, clamping the score into `[0, 10]`.
    ///
    /// Callers must reject non-finite scores before this point.
    pub fn new(speaker_id: impl Into<String>, score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            score: clamp_score(score),
            reasoning: reasoning.into(),
        }
    }

    /// Zero-score placeholder for a speaker whose scoring call failed
    pub fn fallback(speaker_id: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            score: MIN_SCORE,
            reasoning: format!("scoring failed: {}", cause),
        }
    }
}

/// Clamp a model-reported score into the valid range
#[inline]
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(MIN_SCORE, MAX_SCORE)
}

/// Score result joined with the speaker it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedMatch {
    pub speaker: SpeakerRecord,
    pub result: ScoreResult,
    /// Position of the speaker in the roster, used as the tie-breaker
    pub roster_index: usize,
    /// True when `result` is a fallback rather than a model judgment
    pub degraded: bool,
}

impl RankedMatch {
    #[inline]
    pub fn score(&self) -> f64 {
        self.result.score
    }
}

/// Ranked output of one match request
///
/// `results` holds every roster speaker exactly once, sorted by score
/// descending with roster order breaking ties. Entries at or above the
/// threshold form a prefix of `results`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchBatch {
    pub results: Vec<RankedMatch>,
    pub total_speakers: usize,
    pub matches_found: usize,
    pub threshold: f64,
}

impl MatchBatch {
    /// Speakers scoring at or above the threshold
    pub fn matches(&self) -> &[RankedMatch] {
        &self.results[..self.matches_found]
    }

    /// Speakers scoring below the threshold
    pub fn lower_priority(&self) -> &[RankedMatch] {
        &self.results[self.matches_found..]
    }

    /// Number of speakers that received a fallback result
    pub fn degraded_count(&self) -> usize {
        self.results.iter().filter(|m| m.degraded).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_clamped() {
        assert_eq!(ScoreResult::new("a", 12.0, "").score, 10.0);
        assert_eq!(ScoreResult::new("a", -3.5, "").score, 0.0);
        assert_eq!(ScoreResult::new("a", 7.25, "").score, 7.25);
    }

    #[test]
    fn test_fallback_result() {
        let result = ScoreResult::fallback("spk-1", "rate limited");
        assert_eq!(result.score, 0.0);
        assert_eq!(result.reasoning, "scoring failed: rate limited");
        assert_eq!(result.speaker_id, "spk-1");
    }
}
