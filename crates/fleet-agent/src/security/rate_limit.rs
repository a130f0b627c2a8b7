//! Command rate limiting: a rolling per-minute quota plus a bound on how
//! many commands may run concurrently.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded: {count} commands in the last minute (max {max})")]
    TooManyRequests { count: usize, max: usize },
    #[error("too many concurrent commands running (max {max})")]
    TooManyConcurrent { max: usize },
}

/// A permit held for the duration of one command execution. Dropping it
/// releases the concurrency slot.
pub struct RatePermit<'a> {
    _semaphore_permit: tokio::sync::SemaphorePermit<'a>,
}

pub struct CommandRateLimiter {
    max_per_minute: usize,
    max_concurrent: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    concurrency: Semaphore,
}

impl CommandRateLimiter {
    pub fn new(max_per_minute: usize, max_concurrent: usize) -> Self {
        Self {
            max_per_minute,
            max_concurrent,
            window: Duration::from_secs(60),
            timestamps: Mutex::new(VecDeque::new()),
            concurrency: Semaphore::new(max_concurrent),
        }
    }

    /// Check the rolling-window quota and reserve a concurrency slot for
    /// the caller. The returned permit must be held for the lifetime of
    /// the command; dropping it frees the slot for the next command.
    pub async fn acquire(&self) -> Result<RatePermit<'_>, RateLimitError> {
        {
            let mut timestamps = self.timestamps.lock().await;
            let now = Instant::now();
            while let Some(front) = timestamps.front() {
                if now.duration_since(*front) > self.window {
                    timestamps.pop_front();
                } else {
                    break;
                }
            }
            if timestamps.len() >= self.max_per_minute {
                return Err(RateLimitError::TooManyRequests {
                    count: timestamps.len(),
                    max: self.max_per_minute,
                });
            }
            timestamps.push_back(now);
        }

        let permit = self
            .concurrency
            .try_acquire()
            .map_err(|_| RateLimitError::TooManyConcurrent {
                max: self.max_concurrent,
            })?;

        Ok(RatePermit {
            _semaphore_permit: permit,
        })
    }
}

impl Default for CommandRateLimiter {
    /// 60 commands/minute, 4 concurrent — generous enough for interactive
    /// fleet operations without letting a runaway client saturate a host.
    fn default() -> Self {
        Self::new(60, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_commands_within_quota() {
        let limiter = CommandRateLimiter::new(5, 5);
        for _ in 0..5 {
            assert!(limiter.acquire().await.is_ok());
        }
    }

    #[tokio::test]
    async fn rejects_once_per_minute_quota_exceeded() {
        let limiter = CommandRateLimiter::new(2, 10);
        assert!(limiter.acquire().await.is_ok());
        assert!(limiter.acquire().await.is_ok());
        let err = limiter.acquire().await.unwrap_err();
        assert_eq!(err, RateLimitError::TooManyRequests { count: 2, max: 2 });
    }

    #[tokio::test]
    async fn rejects_when_concurrency_cap_is_saturated() {
        let limiter = CommandRateLimiter::new(100, 1);
        let permit = limiter.acquire().await.unwrap();
        let err = limiter.acquire().await.unwrap_err();
        assert_eq!(err, RateLimitError::TooManyConcurrent { max: 1 });
        drop(permit);
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn releasing_a_permit_frees_its_slot_for_reuse() {
        let limiter = CommandRateLimiter::new(100, 2);
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        drop(a);
        let c = limiter.acquire().await;
        assert!(c.is_ok());
        drop(b);
        drop(c);
    }
}
