// Shared test doubles for the matching engine

#![allow(dead_code)]

use async_trait::async_trait;
use speaker_match::core::{EngineConfig, MatchingEngine, RetryPolicy, ScoringClient, ScoringPrompt};
use speaker_match::models::SpeakerRecord;
use speaker_match::services::{CompletionBackend, LlmError, Roster};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Deterministic stand-in for the language-model service
///
/// Replies are keyed by speaker id. A speaker can be made to fail a fixed
/// number of attempts before succeeding, or to fail forever.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: HashMap<String, String>,
    failures: HashMap<String, u32>,
    latency: Duration,
    attempts: Mutex<HashMap<String, u32>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: Mutex<HashMap<String, Instant>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_score(self, id: &str, score: f64) -> Self {
        let reply = format!(r#"{{"score": {}, "reasoning": "scripted for {}"}}"#, score, id);
        self.with_reply(id, &reply)
    }

    pub fn with_reply(mut self, id: &str, raw: &str) -> Self {
        self.replies.insert(id.to_string(), raw.to_string());
        self
    }

    /// Fail the first `n` attempts for `id`
    pub fn failing(mut self, id: &str, n: u32) -> Self {
        self.failures.insert(id.to_string(), n);
        self
    }

    pub fn always_failing(self, id: &str) -> Self {
        self.failing(id, u32::MAX)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// When the successful call for `id` returned
    pub fn completed_at(&self, id: &str) -> Option<Instant> {
        self.completed.lock().unwrap().get(id).copied()
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, prompt: &ScoringPrompt) -> Result<String, LlmError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let count = attempts.entry(prompt.speaker_id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let outcome = match self.failures.get(&prompt.speaker_id) {
            Some(&n) if attempt <= n => Err(LlmError::ApiError {
                status: 503,
                message: "upstream overloaded".to_string(),
            }),
            _ => self.replies.get(&prompt.speaker_id).cloned().ok_or_else(|| {
                LlmError::InvalidResponse(format!("no reply scripted for {}", prompt.speaker_id))
            }),
        };

        if outcome.is_ok() {
            self.completed
                .lock()
                .unwrap()
                .insert(prompt.speaker_id.clone(), Instant::now());
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

pub fn speaker(id: &str) -> SpeakerRecord {
    SpeakerRecord {
        id: id.to_string(),
        name: format!("Speaker {}", id),
        title: "Director".to_string(),
        organization: "Defense Innovation".to_string(),
        bio: format!("Bio of {}", id),
    }
}

pub fn roster(ids: &[&str]) -> Roster {
    Roster::new(ids.iter().map(|id| speaker(id)).collect()).unwrap()
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_millis(50),
        call_timeout: Duration::from_secs(30),
    }
}

pub fn engine_with(
    backend: Arc<ScriptedBackend>,
    roster: Roster,
    policy: RetryPolicy,
    config: EngineConfig,
) -> MatchingEngine {
    MatchingEngine::new(ScoringClient::new(backend, policy), Some(Arc::new(roster)), config).unwrap()
}

pub fn engine(backend: Arc<ScriptedBackend>, roster: Roster) -> MatchingEngine {
    engine_with(backend, roster, fast_policy(), EngineConfig::default())
}
