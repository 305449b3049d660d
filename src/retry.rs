//! Bounded retry for file writes that may hit a transient lock

use log::{info, warn};
use std::fmt::Display;
use std::time::Duration;

/// Something that can pause between attempts
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Blocks the current thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// Three attempts, one second apart
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or the attempts run out
    ///
    /// `op` receives the 1-based attempt number. On exhaustion the last
    /// error is returned together with the number of attempts made. A
    /// policy with `max_attempts == 0` still makes one attempt.
    pub fn run<T, E, F>(&self, sleeper: &dyn Sleeper, mut op: F) -> Result<T, (u32, E)>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < max_attempts => {
                    warn!("Write attempt {} failed: {}", attempt, e);
                    info!("Retrying in {:?}...", self.delay);
                    sleeper.sleep(self.delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Write attempt {} failed, giving up: {}", attempt, e);
                    return Err((attempt, e));
                }
            }
        }
    }
}
