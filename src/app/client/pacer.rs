//! Inter-request pacing floor

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Enforces a minimum gap between the end of one request and the start of the next
///
/// This is a hard floor, not a throughput target: however long a request
/// took, the next one waits `min_delay` after it finished.
#[derive(Debug)]
pub struct Pacer {
    min_delay: Duration,
    last_completed: Option<Instant>,
}

impl Pacer {
    pub fn new(min_delay: Duration) -> Self {
        Self {
            min_delay,
            last_completed: None,
        }
    }

    /// Wait until the next request may start
    pub async fn wait(&self) {
        if let Some(last) = self.last_completed {
            let ready_at = last + self.min_delay;
            if Instant::now() < ready_at {
                debug!("Pacing: waiting {:?}", ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }
    }

    /// Record that a request (including its body) has finished
    pub fn record_completion(&mut self) {
        self.last_completed = Some(Instant::now());
    }

    /// Time left before the next request may start
    pub fn remaining(&self) -> Duration {
        match self.last_completed {
            Some(last) => (last + self.min_delay).saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }
}
