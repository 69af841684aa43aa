use std::time::Duration;

use tokio::time::Instant;

/// Time source for elapsed-time measurement and retry delays
///
/// Uses tokio time so paused-clock tests drive it deterministically.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Milliseconds since this clock was created
    fn now_ms(&self) -> u64;

    /// Suspend for the given duration
    async fn sleep(&self, duration: Duration);
}

/// Default clock backed by `tokio::time`
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
