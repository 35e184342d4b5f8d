//! Monotonic time in microseconds.
//!
//! The stack only compares and offsets points in time, it never needs a wall
//! clock. [`Instant`] counts from the moment the alarm started.

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instant {
    us: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Eq, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Duration {
    us: i64,
}

macro_rules! units {
    ($t:ty) => {
        impl $t {
            pub const ZERO: Self = Self { us: 0 };

            pub const fn from_us(us: i64) -> Self {
                Self { us }
            }

            pub const fn from_ms(ms: i64) -> Self {
                Self { us: ms * 1_000 }
            }

            pub const fn from_secs(secs: i64) -> Self {
                Self {
                    us: secs * 1_000_000,
                }
            }

            pub const fn as_us(&self) -> i64 {
                self.us
            }

            pub const fn as_ms(&self) -> i64 {
                self.us / 1_000
            }

            pub const fn as_secs(&self) -> i64 {
                self.us / 1_000_000
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let ms = self.as_ms();
                write!(f, "{}.{:03}s", ms / 1_000, (ms % 1_000).abs())
            }
        }
    };
}

units!(Instant);
units!(Duration);

impl Instant {
    /// Time elapsed from `earlier` to `self`, zero when `earlier` is later.
    pub fn saturating_since(&self, earlier: Instant) -> Duration {
        Duration::from_us((self.us - earlier.us).max(0))
    }
}

impl core::ops::Sub for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_us(self.us - rhs.us)
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_us(self.us + rhs.us)
    }
}

impl core::ops::Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Instant {
        Instant::from_us(self.us - rhs.us)
    }
}

impl core::ops::Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration::from_us(self.us + rhs.us)
    }
}

impl core::ops::Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration::from_us(self.us - rhs.us)
    }
}

impl core::ops::Mul<u32> for Duration {
    type Output = Duration;

    fn mul(self, rhs: u32) -> Duration {
        Duration::from_us(self.us * rhs as i64)
    }
}

impl core::ops::Div<u32> for Duration {
    type Output = Duration;

    fn div(self, rhs: u32) -> Duration {
        Duration::from_us(self.us / rhs as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_arithmetic() {
        let a = Instant::from_ms(100);
        let b = Instant::from_ms(50);
        assert_eq!((a - b).as_ms(), 50);
        assert_eq!((a - Duration::from_ms(50)).as_ms(), 50);
        assert_eq!((a + Duration::from_secs(1)).as_ms(), 1100);
        assert_eq!(b.saturating_since(a), Duration::ZERO);
        assert_eq!(a.saturating_since(b), Duration::from_ms(50));
    }

    #[test]
    fn duration_arithmetic() {
        let a = Duration::from_secs(2);
        let b = Duration::from_ms(500);
        assert_eq!((a - b).as_ms(), 1500);
        assert_eq!((a * 2).as_secs(), 4);
        assert_eq!((a / 4).as_ms(), 500);
        assert_eq!((a + b).as_us(), 2_500_000);
    }

    #[test]
    fn displayed_in_seconds() {
        assert_eq!(format!("{}", Instant::from_ms(12_345)), "12.345s");
        assert_eq!(format!("{}", Duration::from_ms(3)), "0.003s");
    }
}
