//! Retry loop for state that can only be observed by asking again

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            attempts: 30,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }
}

/// Call `check` until it yields a value, at most `poll.attempts` times with
/// `poll.interval` between calls. `None` when every attempt came back empty.
pub async fn poll_until<T, F, Fut>(poll: PollConfig, what: &str, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for attempt in 1..=poll.attempts {
        if let Some(value) = check().await {
            return Some(value);
        }
        tracing::debug!(what, attempt, attempts = poll.attempts, "still waiting");
        if attempt < poll.attempts {
            tokio::time::sleep(poll.interval).await;
        }
    }
    tracing::debug!(what, "gave up");
    None
}
