//! Trickle timer (RFC 6206) pacing MLE Advertisements.
//!
//! The redundancy constant is infinite: a transmission happens once per
//! interval, at a random point in its second half.

use rand_core::RngCore;

use crate::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct TrickleTimer {
    i_min: Duration,
    i_max: Duration,

    i: Duration,
    t_expiration: Instant,
    i_expiration: Instant,
    transmitted: bool,
    running: bool,
}

/// Uniform random duration in `[min, max]`.
pub(crate) fn random_duration(rng: &mut impl RngCore, min: Duration, max: Duration) -> Duration {
    let span = (max - min).as_us().max(0) as u64;
    Duration::from_us(min.as_us() + (rng.next_u64() % (span + 1)) as i64)
}

impl TrickleTimer {
    pub const fn new(i_min: Duration, i_max: Duration) -> Self {
        Self {
            i_min,
            i_max,
            i: i_min,
            t_expiration: Instant::ZERO,
            i_expiration: Instant::ZERO,
            transmitted: false,
            running: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start with the minimum interval.
    pub fn start(&mut self, now: Instant, rng: &mut impl RngCore) {
        self.running = true;
        self.begin_interval(now, self.i_min, rng);
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// An inconsistency was heard: restart with the minimum interval unless
    /// already there.
    pub fn reset(&mut self, now: Instant, rng: &mut impl RngCore) {
        if self.running && self.i > self.i_min {
            self.begin_interval(now, self.i_min, rng);
        }
    }

    fn begin_interval(&mut self, now: Instant, i: Duration, rng: &mut impl RngCore) {
        self.i = i;
        self.i_expiration = now + i;
        self.t_expiration = now + random_duration(rng, i / 2, i);
        self.transmitted = false;
    }

    /// Advance the timer. Returns `true` when a transmission is due.
    pub fn poll(&mut self, now: Instant, rng: &mut impl RngCore) -> bool {
        if !self.running {
            return false;
        }

        let transmit = !self.transmitted && now >= self.t_expiration;
        if transmit {
            self.transmitted = true;
        }

        if now >= self.i_expiration {
            let doubled = self.i + self.i;
            let next = if doubled > self.i_max { self.i_max } else { doubled };
            self.begin_interval(now, next, rng);
        }

        transmit
    }

    /// Next instant [`poll`](Self::poll) has something to do.
    pub fn poll_at(&self) -> Option<Instant> {
        if !self.running {
            None
        } else if self.transmitted {
            Some(self.i_expiration)
        } else {
            Some(self.t_expiration.min(self.i_expiration))
        }
    }
}
