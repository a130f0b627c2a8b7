//! Replay protection: every inbound message carries a timestamp and a
//! nonce; both must check out before the message is processed.
//!
//! `W` bounds how old a timestamp may be, `F` bounds how far in the future
//! it may be (clock skew tolerance). A nonce is remembered for as long as
//! it could still fall inside the acceptance window, then evicted.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use uuid::Uuid;

/// Default acceptance window: a message older than this is rejected.
pub const DEFAULT_WINDOW_SECS: f64 = 300.0;
/// Default future-skew tolerance.
pub const DEFAULT_FUTURE_SKEW_SECS: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayRejection {
    Replayed,
    TooOld,
    TooFarInFuture,
}

impl ReplayRejection {
    pub fn message(&self) -> &'static str {
        match self {
            ReplayRejection::Replayed => "nonce replay detected",
            ReplayRejection::TooOld => "message timestamp too old",
            ReplayRejection::TooFarInFuture => "message timestamp too far in the future",
        }
    }
}

pub struct ReplayGuard {
    window_secs: f64,
    future_skew_secs: f64,
    seen: Mutex<HashMap<String, f64>>,
}

impl ReplayGuard {
    pub fn new(window_secs: f64, future_skew_secs: f64) -> Self {
        Self {
            window_secs,
            future_skew_secs,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate_nonce(&self) -> String {
        Uuid::new_v4().to_string()
    }

    /// Validate a `(timestamp, nonce)` pair. On success the nonce is
    /// remembered so a subsequent replay of the same pair is rejected.
    pub async fn validate_message(
        &self,
        timestamp: f64,
        nonce: &str,
    ) -> Result<(), ReplayRejection> {
        let now = now_secs();
        let age = now - timestamp;

        if age > self.window_secs {
            return Err(ReplayRejection::TooOld);
        }
        if -age > self.future_skew_secs {
            return Err(ReplayRejection::TooFarInFuture);
        }

        let mut seen = self.seen.lock().await;
        self.evict_expired(&mut seen, now);

        if seen.contains_key(nonce) {
            return Err(ReplayRejection::Replayed);
        }
        seen.insert(nonce.to_string(), timestamp);
        Ok(())
    }

    fn evict_expired(&self, seen: &mut HashMap<String, f64>, now: f64) {
        let cutoff = self.window_secs + self.future_skew_secs;
        seen.retain(|_, ts| (now - *ts).abs() <= cutoff);
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS, DEFAULT_FUTURE_SKEW_SECS)
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}
