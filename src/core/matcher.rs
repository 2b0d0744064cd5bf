use crate::core::{
    prompt::{build_prompt, DEFAULT_BIO_CHAR_LIMIT},
    ranker::rank,
    scoring::ScoringClient,
};
use crate::models::{MatchBatch, RankedMatch, ScoreResult, SpeakerRecord, UserProfile};
use crate::services::Roster;
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

/// Batch-wide failures of a match request
///
/// Per-speaker failures never show up here; they become fallback results.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Match request cancelled")]
    Cancelled,

    #[error("Match request timed out after {0:?}")]
    TimedOut(Duration),
}

/// Engine limits
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Maximum scoring attempts in flight at once, across all requests
    pub max_concurrency: usize,
    /// Upper bound on the wall time of one batch
    pub batch_timeout: Duration,
    pub bio_char_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 16,
            batch_timeout: Duration::from_secs(120),
            bio_char_limit: DEFAULT_BIO_CHAR_LIMIT,
        }
    }
}

/// Main matching orchestrator
///
/// # Pipeline
/// 1. Build one prompt per roster speaker
/// 2. Score every speaker concurrently, at most `max_concurrency` at a time
/// 3. Record each outcome in the slot for the speaker's roster position,
///    substituting a zero-score fallback for failed calls
/// 4. Rank and partition at the threshold
///
/// All per-speaker work runs inside the caller's task. Dropping the returned
/// future cancels every pending call.
pub struct MatchingEngine {
    client: ScoringClient,
    roster: Option<Arc<Roster>>,
    limiter: Semaphore,
    config: EngineConfig,
}

impl MatchingEngine {
    pub fn new(
        client: ScoringClient,
        roster: Option<Arc<Roster>>,
        config: EngineConfig,
    ) -> Result<Self, MatchError> {
        if config.max_concurrency == 0 {
            return Err(MatchError::Configuration(
                "max_concurrency must be at least 1".into(),
            ));
        }

        Ok(Self {
            client,
            roster,
            limiter: Semaphore::new(config.max_concurrency),
            config,
        })
    }

    pub fn roster(&self) -> Option<&Roster> {
        self.roster.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Match a profile against the loaded roster
    pub async fn match_profile(
        &self,
        profile: &UserProfile,
        threshold: f64,
    ) -> Result<MatchBatch, MatchError> {
        let roster = self
            .roster
            .as_deref()
            .ok_or_else(|| MatchError::Configuration("no speaker roster loaded".into()))?;
        self.match_roster(profile, roster, threshold).await
    }

    /// Like [`match_profile`](Self::match_profile), but gives up with
    /// `Cancelled` as soon as `cancel` completes
    pub async fn match_until<C>(
        &self,
        profile: &UserProfile,
        threshold: f64,
        cancel: C,
    ) -> Result<MatchBatch, MatchError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::info!("Match request cancelled, discarding pending scoring calls");
                Err(MatchError::Cancelled)
            }
            result = self.match_profile(profile, threshold) => result,
        }
    }

    /// Match a profile against an explicit roster
    pub async fn match_roster(
        &self,
        profile: &UserProfile,
        roster: &Roster,
        threshold: f64,
    ) -> Result<MatchBatch, MatchError> {
        if !self.client.is_configured() {
            return Err(MatchError::Configuration(
                "no credentials available for the language-model service".into(),
            ));
        }

        let span = tracing::info_span!(
            "match_batch",
            batch_id = %Uuid::new_v4(),
            speakers = roster.len()
        );
        let batch_timeout = self.config.batch_timeout;

        async move {
            let started = Instant::now();

            let results = tokio::time::timeout(batch_timeout, self.score_all(profile, roster))
                .await
                .map_err(|_| {
                    tracing::warn!("Batch exceeded {:?}, discarding partial results", batch_timeout);
                    MatchError::TimedOut(batch_timeout)
                })?;

            let batch = rank(results, threshold);

            tracing::info!(
                "Scored {} speakers in {:?}: {} matches at >= {}, {} degraded",
                batch.total_speakers,
                started.elapsed(),
                batch.matches_found,
                threshold,
                batch.degraded_count()
            );

            Ok(batch)
        }
        .instrument(span)
        .await
    }

    /// Score every speaker and return results in roster order
    async fn score_all(&self, profile: &UserProfile, roster: &Roster) -> Vec<RankedMatch> {
        let speakers = roster.speakers();
        let mut slots: Vec<Option<(ScoreResult, bool)>> = vec![None; speakers.len()];

        let mut in_flight: FuturesUnordered<_> = speakers
            .iter()
            .enumerate()
            .map(|(idx, speaker)| self.score_one(idx, profile, speaker))
            .collect();

        // Completion order is arbitrary; each outcome goes to its own slot
        while let Some((idx, result, degraded)) = in_flight.next().await {
            slots[idx] = Some((result, degraded));
        }

        slots
            .into_iter()
            .zip(speakers)
            .enumerate()
            .map(|(idx, (slot, speaker))| {
                let (result, degraded) = slot.unwrap_or_else(|| {
                    (ScoreResult::fallback(&speaker.id, "no result recorded"), true)
                });
                RankedMatch {
                    speaker: speaker.clone(),
                    result,
                    roster_index: idx,
                    degraded,
                }
            })
            .collect()
    }

    async fn score_one(
        &self,
        idx: usize,
        profile: &UserProfile,
        speaker: &SpeakerRecord,
    ) -> (usize, ScoreResult, bool) {
        let prompt = build_prompt(profile, speaker, self.config.bio_char_limit);

        match self.client.score_limited(&prompt, &self.limiter).await {
            Ok(result) => (idx, result, false),
            Err(e) => {
                tracing::warn!("Scoring failed for speaker {} ({}): {}", speaker.id, speaker.name, e);
                (idx, ScoreResult::fallback(&speaker.id, e), true)
            }
        }
    }
}
