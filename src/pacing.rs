//! Rate gates awaited around every request while it holds its concurrency slot.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Error, Result};

/// A gate the requester awaits right before and right after each call.
///
/// Both hooks run while the call still owns its concurrency slot, so a pause
/// in `after_call` delays the next queued request as well.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn before_call(&self) {}
    async fn after_call(&self) {}
}

/// Sleeps for a fixed time after each call completes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedDelay(pub Duration);

impl FixedDelay {
    pub fn from_secs_f64(secs: f64) -> Result<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(Error::InvalidDelay(secs));
        }
        Duration::try_from_secs_f64(secs)
            .map(Self)
            .map_err(|_| Error::InvalidDelay(secs))
    }
}

#[async_trait]
impl Pacer for FixedDelay {
    async fn after_call(&self) {
        if !self.0.is_zero() {
            tokio::time::sleep(self.0).await;
        }
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Token bucket: `rate_per_sec` tokens refill per second up to `burst`.
/// A rate of zero disables the gate.
#[derive(Debug)]
pub struct TokenBucket {
    rate_per_sec: f64,
    burst: f64,
    state: Mutex<Bucket>,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f64, burst: f64) -> Result<Self> {
        if !rate_per_sec.is_finite() || rate_per_sec < 0.0 {
            return Err(Error::InvalidRate(rate_per_sec));
        }
        if !burst.is_finite() || burst < 0.0 {
            return Err(Error::InvalidRate(burst));
        }
        // the longest wait is one whole token
        if rate_per_sec > 0.0 && Duration::try_from_secs_f64(1.0 / rate_per_sec).is_err() {
            return Err(Error::InvalidRate(rate_per_sec));
        }
        let burst = burst.max(1.0);
        Ok(Self {
            rate_per_sec,
            burst,
            state: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        })
    }

    /// One second worth of burst, at least one token.
    pub fn per_second(rate_per_sec: f64) -> Result<Self> {
        Self::new(rate_per_sec, rate_per_sec.max(1.0))
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last).as_secs_f64();
        if elapsed > 0.0 {
            bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.burst);
            bucket.last = now;
        }
    }

    /// Takes a token if one is available right now.
    pub async fn try_take(&self) -> bool {
        if self.rate_per_sec <= 0.0 {
            return true;
        }
        let mut bucket = self.state.lock().await;
        self.refill(&mut bucket);
        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub async fn take(&self) {
        if self.rate_per_sec <= 0.0 {
            return;
        }
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.rate_per_sec)
            };
            tokio::time::sleep(wait).await;
        }
    }
}

#[async_trait]
impl Pacer for TokenBucket {
    async fn before_call(&self) {
        self.take().await;
    }
}
