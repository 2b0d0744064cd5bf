use crate::core::prompt::ScoringPrompt;
use crate::models::ScoreResult;
use crate::services::llm::{CompletionBackend, LlmError};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Errors from scoring a single speaker
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("service error: {0}")]
    Service(#[from] LlmError),

    #[error("unparseable reply: {0}")]
    Parse(String),

    #[error("invalid score: {0}")]
    Validation(String),

    #[error("concurrency limiter closed")]
    LimiterClosed,

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ScoringError>,
    },
}

impl ScoringError {
    /// Whether another attempt may produce a usable reply
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::Service(e) => e.is_transient(),
            ScoringError::Parse(_) | ScoringError::Validation(_) => true,
            ScoringError::LimiterClosed | ScoringError::Exhausted { .. } => false,
        }
    }
}

/// Retry and timeout limits for one speaker's scoring call
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub base_backoff: Duration,
    /// Upper bound on a single attempt
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn backoff_for(&self, attempt: u32) -> Duration {
        // attempt is 1-based and refers to the attempt that just failed
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Parse and validate a raw model reply into a score result
///
/// Out-of-range scores are clamped into `[0, 10]`. Missing fields are a
/// `Parse` error; a score that is not a finite number is a `Validation` error.
pub fn parse_reply(speaker_id: &str, raw: &str) -> Result<ScoreResult, ScoringError> {
    let body = strip_code_fence(raw);
    let mut reply: Map<String, Value> = serde_json::from_str(body)
        .map_err(|e| ScoringError::Parse(format!("reply is not a JSON object: {}", e)))?;

    // A present `null` score is a bad value, not a missing field
    let score = reply
        .remove("score")
        .ok_or_else(|| ScoringError::Parse("missing field `score`".into()))?;
    let reasoning = match reply.remove("reasoning") {
        Some(Value::String(text)) => text,
        Some(other) => {
            return Err(ScoringError::Parse(format!("`reasoning` is not a string: {}", other)))
        }
        None => return Err(ScoringError::Parse("missing field `reasoning`".into())),
    };

    let score = match &score {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| ScoringError::Validation(format!("score {} is not a number", score)))?;

    Ok(ScoreResult::new(speaker_id, score, reasoning.trim()))
}

/// Unwrap a reply wrapped in a Markdown code fence
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag such as ```json
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

/// Scores one speaker per call against a completion backend
///
/// Each call retries transient failures with exponential backoff. Retries are
/// local to the call and never touch other speakers. When a limiter is given,
/// a permit is held for each attempt only, never across a backoff sleep.
#[derive(Clone)]
pub struct ScoringClient {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl ScoringClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn is_configured(&self) -> bool {
        self.backend.is_configured()
    }

    /// Perform one logical scoring request
    pub async fn score(&self, prompt: &ScoringPrompt) -> Result<ScoreResult, ScoringError> {
        self.score_with(prompt, None).await
    }

    /// Perform one logical scoring request, taking a permit from `limiter`
    /// for every attempt
    pub async fn score_limited(
        &self,
        prompt: &ScoringPrompt,
        limiter: &Semaphore,
    ) -> Result<ScoreResult, ScoringError> {
        self.score_with(prompt, Some(limiter)).await
    }

    async fn score_with(
        &self,
        prompt: &ScoringPrompt,
        limiter: Option<&Semaphore>,
    ) -> Result<ScoreResult, ScoringError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match limiter {
                Some(limiter) => {
                    let _permit = limiter
                        .acquire()
                        .await
                        .map_err(|_| ScoringError::LimiterClosed)?;
                    self.attempt(prompt).await
                }
                None => self.attempt(prompt).await,
            };

            let err = match outcome {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            "Speaker {} scored on attempt {}",
                            prompt.speaker_id,
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(ScoringError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff_for(attempt);
            tracing::debug!(
                "Attempt {}/{} for speaker {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                prompt.speaker_id,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(&self, prompt: &ScoringPrompt) -> Result<ScoreResult, ScoringError> {
        let raw = tokio::time::timeout(self.policy.call_timeout, self.backend.complete(prompt))
            .await
            .map_err(|_| LlmError::Timeout(self.policy.call_timeout))??;
        parse_reply(&prompt.speaker_id, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order, repeating the last one
    struct Replay {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: Mutex<u32>,
    }

    impl Replay {
        fn new(replies: Vec<Result<&str, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string))
                        .collect(),
                ),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl CompletionBackend for Replay {
        async fn complete(&self, _prompt: &ScoringPrompt) -> Result<String, LlmError> {
            *self.calls.lock().unwrap() += 1;
            let mut replies = self.replies.lock().unwrap();
            if replies.len() > 1 {
                replies.pop_front().unwrap()
            } else {
                match replies.front().unwrap() {
                    Ok(s) => Ok(s.clone()),
                    Err(_) => Err(LlmError::RateLimited),
                }
            }
        }
    }

    fn prompt() -> ScoringPrompt {
        ScoringPrompt {
            speaker_id: "spk-1".to_string(),
            system: String::new(),
            user: String::new(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            call_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_valid_reply() {
        let result = parse_reply("a", r#"{"score": 7.5, "reasoning": " Strong fit. "}"#).unwrap();
        assert_eq!(result.score, 7.5);
        assert_eq!(result.reasoning, "Strong fit.");
        assert_eq!(result.speaker_id, "a");
    }

    #[test]
    fn test_parse_clamps_out_of_range() {
        assert_eq!(parse_reply("a", r#"{"score": 12, "reasoning": ""}"#).unwrap().score, 10.0);
        assert_eq!(parse_reply("a", r#"{"score": -2, "reasoning": ""}"#).unwrap().score, 0.0);
    }

    #[test]
    fn test_parse_numeric_string_score() {
        let result = parse_reply("a", r#"{"score": " 6 ", "reasoning": "ok"}"#).unwrap();
        assert_eq!(result.score, 6.0);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "```json\n{\"score\": 4, \"reasoning\": \"weak\"}\n```";
        assert_eq!(parse_reply("a", raw).unwrap().score, 4.0);
    }

    #[test]
    fn test_parse_missing_fields() {
        assert!(matches!(
            parse_reply("a", r#"{"reasoning": "no score"}"#),
            Err(ScoringError::Parse(_))
        ));
        assert!(matches!(
            parse_reply("a", r#"{"score": 5}"#),
            Err(ScoringError::Parse(_))
        ));
        assert!(matches!(
            parse_reply("a", "I think this speaker is a 7"),
            Err(ScoringError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_non_numeric_score() {
        assert!(matches!(
            parse_reply("a", r#"{"score": "high", "reasoning": ""}"#),
            Err(ScoringError::Validation(_))
        ));
        assert!(matches!(
            parse_reply("a", r#"{"score": null, "reasoning": ""}"#),
            Err(ScoringError::Validation(_))
        ));
    }

    #[test]
    fn test_backoff_doubles() {
        let p = policy();
        assert_eq!(p.backoff_for(1), Duration::from_millis(100));
        assert_eq!(p.backoff_for(2), Duration::from_millis(200));
        assert_eq!(p.backoff_for(3), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let backend = Arc::new(Replay::new(vec![
            Err(LlmError::RateLimited),
            Ok("not json"),
            Ok(r#"{"score": 8, "reasoning": "good"}"#),
        ]));
        let client = ScoringClient::new(backend.clone(), policy());

        let result = client.score(&prompt()).await.unwrap();
        assert_eq!(result.score, 8.0);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries() {
        let backend = Arc::new(Replay::new(vec![Err(LlmError::RateLimited)]));
        let client = ScoringClient::new(backend.clone(), policy());

        let err = client.score(&prompt()).await.unwrap_err();
        assert!(matches!(err, ScoringError::Exhausted { attempts: 3, .. }));
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        struct Denied;

        #[async_trait]
        impl CompletionBackend for Denied {
            async fn complete(&self, _prompt: &ScoringPrompt) -> Result<String, LlmError> {
                Err(LlmError::Unauthorized)
            }
        }

        let client = ScoringClient::new(Arc::new(Denied), policy());
        let err = client.score(&prompt()).await.unwrap_err();
        assert!(matches!(err, ScoringError::Service(LlmError::Unauthorized)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_limited_retry_releases_permit_during_backoff() {
        let backend = Arc::new(Replay::new(vec![
            Err(LlmError::RateLimited),
            Ok(r#"{"score": 6, "reasoning": "fine"}"#),
        ]));
        let client = ScoringClient::new(backend.clone(), policy());
        let limiter = Arc::new(Semaphore::new(1));

        let task = {
            let limiter = limiter.clone();
            tokio::spawn(async move { client.score_limited(&prompt(), &limiter).await })
        };

        // First attempt fails at once; the task is now sleeping out its backoff
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.calls(), 1);
        assert_eq!(limiter.available_permits(), 1);

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.score, 6.0);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_closed_limiter_is_not_retried() {
        let backend = Arc::new(Replay::new(vec![Ok(r#"{"score": 6, "reasoning": "fine"}"#)]));
        let client = ScoringClient::new(backend.clone(), policy());
        let limiter = Semaphore::new(1);
        limiter.close();

        let err = client.score_limited(&prompt(), &limiter).await.unwrap_err();
        assert!(matches!(err, ScoringError::LimiterClosed));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        struct Stalled;

        #[async_trait]
        impl CompletionBackend for Stalled {
            async fn complete(&self, _prompt: &ScoringPrompt) -> Result<String, LlmError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(r#"{"score": 9, "reasoning": "late"}"#.to_string())
            }
        }

        let client = ScoringClient::new(Arc::new(Stalled), policy());
        let err = client.score(&prompt()).await.unwrap_err();
        match err {
            ScoringError::Exhausted { last, .. } => {
                assert!(matches!(*last, ScoringError::Service(LlmError::Timeout(_))))
            }
            other => panic!("expected exhausted timeout, got {:?}", other),
        }
    }
}
