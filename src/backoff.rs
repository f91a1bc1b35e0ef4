//! Bounded exponential backoff for aggregation-store redelivery
//!
//! When a merge fails transiently the message is not considered consumed;
//! the consumer retries the same merge with increasing delays instead of
//! advancing past it.

use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    max_attempts: u32,
    attempt: u32,
}

#[derive(Debug)]
pub struct RetriesExhausted;

impl std::fmt::Display for RetriesExhausted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "retry attempts exhausted")
    }
}

impl std::error::Error for RetriesExhausted {}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
            attempt: 0,
        }
    }

    /// Delay that the next `wait` call would sleep for.
    fn next_delay_ms(&self) -> u64 {
        self.base_delay_ms
            .saturating_mul(1u64 << self.attempt.min(16))
            .min(self.max_delay_ms)
    }

    /// Sleep before the next retry, or report exhaustion.
    pub async fn wait(&mut self) -> Result<(), RetriesExhausted> {
        if self.attempt >= self.max_attempts {
            return Err(RetriesExhausted);
        }

        let delay = self.next_delay_ms();
        log::warn!(
            "⏳ Retry {} of {} in {}ms",
            self.attempt + 1,
            self.max_attempts,
            delay
        );

        sleep(Duration::from_millis(delay)).await;
        self.attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
