//! Token-bucket rate limiting.
//!
//! The bucket holds at most `rate` tokens and refills continuously at
//! `rate` tokens per second. Internally the bucket is tracked as a single
//! "theoretical arrival time" (the instant at which the bucket would be full
//! again), which lets acquisition be a single compare-and-swap with no lock.
//! Refill is computed lazily from wall-clock elapsed time when a caller
//! polls, so there is no background refill work and scheduling jitter does
//! not affect accuracy.

use crate::error::{CoreError, CoreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// A lock-free token bucket.
///
/// # Example
///
/// ```
/// use tilesync_core::RateLimiter;
///
/// let limiter = RateLimiter::new(2).unwrap();
/// assert!(limiter.try_acquire());
/// assert!(limiter.try_acquire());
/// assert!(!limiter.try_acquire());
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    rate: u32,
    /// Nanoseconds per token.
    interval_ns: u64,
    /// Nanoseconds of debt that a full bucket can absorb (`rate * interval`).
    capacity_ns: u64,
    origin: Instant,
    /// Nanoseconds after `origin` at which the bucket is full again.
    full_at: AtomicU64,
}

impl RateLimiter {
    /// Creates a full bucket allowing `rate` operations per second.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRate`] if `rate` is zero.
    pub fn new(rate: u32) -> CoreResult<Self> {
        let (interval_ns, capacity_ns) = Self::shape(rate)?;
        Ok(Self {
            rate,
            interval_ns,
            capacity_ns,
            origin: Instant::now(),
            full_at: AtomicU64::new(0),
        })
    }

    fn shape(rate: u32) -> CoreResult<(u64, u64)> {
        if rate == 0 {
            return Err(CoreError::InvalidRate {
                rate: i64::from(rate),
            });
        }
        let interval_ns = (NANOS_PER_SEC / u64::from(rate)).max(1);
        Ok((interval_ns, interval_ns * u64::from(rate)))
    }

    /// Returns the configured rate (and bucket capacity).
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Takes one token if available.
    ///
    /// Returns false without changing any state when the bucket is empty.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    /// Takes one token as of `now`.
    pub fn try_acquire_at(&self, now: Instant) -> bool {
        let now = self.elapsed_ns(now);
        let mut current = self.full_at.load(Ordering::Acquire);

        loop {
            let next = current.max(now) + self.interval_ns;
            if next - now > self.capacity_ns {
                return false;
            }

            match self.full_at.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Returns true if a token is available, without consuming it.
    pub fn can_acquire(&self) -> bool {
        self.can_acquire_at(Instant::now())
    }

    /// Peeks as of `now`.
    pub fn can_acquire_at(&self, now: Instant) -> bool {
        let now = self.elapsed_ns(now);
        let current = self.full_at.load(Ordering::Acquire);
        current.max(now) + self.interval_ns - now <= self.capacity_ns
    }

    /// Returns the number of tokens currently in the bucket.
    pub fn available_tokens(&self) -> f64 {
        self.available_tokens_at(Instant::now())
    }

    /// Returns the number of tokens in the bucket as of `now`.
    pub fn available_tokens_at(&self, now: Instant) -> f64 {
        let now = self.elapsed_ns(now);
        let debt = self.full_at.load(Ordering::Acquire).saturating_sub(now);
        self.capacity_ns.saturating_sub(debt) as f64 / self.interval_ns as f64
    }

    /// Refills the bucket to full capacity.
    pub fn reset(&self) {
        self.full_at.store(0, Ordering::Release);
    }

    /// Changes the rate.
    ///
    /// The bucket is reset to the new full capacity; partially consumed
    /// tokens are not rescaled.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidRate`] if `rate` is zero. The limiter is
    /// left unchanged in that case.
    pub fn set_rate(&mut self, rate: u32) -> CoreResult<()> {
        let (interval_ns, capacity_ns) = Self::shape(rate)?;
        self.rate = rate;
        self.interval_ns = interval_ns;
        self.capacity_ns = capacity_ns;
        self.reset();
        Ok(())
    }

    fn elapsed_ns(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.origin).as_nanos()).unwrap_or(u64::MAX)
    }
}
