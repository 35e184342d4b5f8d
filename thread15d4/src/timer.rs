//! Alarm abstraction and the timer set multiplexed on top of it.

use heapless::Vec;

use crate::time::{Duration, Instant};
use crate::{Error, Result};

/// A single hardware alarm with a monotonic clock.
///
/// Only one alarm is live at any time: `start_at` supersedes a previously
/// armed deadline. When the alarm fires the platform calls
/// [`Instance::signal_alarm_fired`](crate::Instance::signal_alarm_fired).
pub trait Alarm {
    /// Return the current time.
    fn now(&self) -> Instant;

    /// Arm the alarm to fire at `t0 + dt`.
    fn start_at(&mut self, t0: Instant, dt: Duration);

    /// Disarm the alarm. Stopping a stopped alarm has no effect.
    fn stop(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    id: T,
    deadline: Instant,
    seq: u32,
}

/// A set of named timers.
///
/// Each timer has at most one deadline. Expired timers are returned in
/// deadline order and timers sharing a deadline in the order they were
/// started.
pub struct TimerScheduler<T: Copy + PartialEq, const N: usize> {
    timers: Vec<Entry<T>, N>,
    seq: u32,
}

impl<T: Copy + PartialEq, const N: usize> Default for TimerScheduler<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + PartialEq, const N: usize> TimerScheduler<T, N> {
    pub const fn new() -> Self {
        Self {
            timers: Vec::new(),
            seq: 0,
        }
    }

    /// Start (or restart) timer `id` so it expires at `deadline`.
    pub fn start_at(&mut self, id: T, deadline: Instant) -> Result<()> {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        if let Some(entry) = self.timers.iter_mut().find(|e| e.id == id) {
            entry.deadline = deadline;
            entry.seq = seq;
            return Ok(());
        }

        self.timers
            .push(Entry { id, deadline, seq })
            .map_err(|_| Error::NoBufs)
    }

    /// Start (or restart) timer `id` so it expires `delay` after `now`.
    pub fn start(&mut self, id: T, now: Instant, delay: Duration) -> Result<()> {
        self.start_at(id, now + delay)
    }

    /// Stop timer `id`. Stopping a stopped timer has no effect.
    pub fn stop(&mut self, id: T) {
        self.timers.retain(|e| e.id != id);
    }

    pub fn is_running(&self, id: T) -> bool {
        self.timers.iter().any(|e| e.id == id)
    }

    pub fn deadline(&self, id: T) -> Option<Instant> {
        self.timers.iter().find(|e| e.id == id).map(|e| e.deadline)
    }

    /// The earliest deadline, used to arm the hardware alarm.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.iter().map(|e| e.deadline).min()
    }

    /// Remove and return the next expired timer.
    pub fn pop_expired(&mut self, now: Instant) -> Option<T> {
        let (index, _) = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, e)| e.deadline <= now)
            .min_by_key(|(_, e)| (e.deadline, e.seq.wrapping_sub(self.seq)))?;

        Some(self.timers.swap_remove(index).id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum T {
        A,
        B,
        C,
    }

    #[test]
    fn deadline_order() {
        let mut timers = TimerScheduler::<T, 4>::new();
        let now = Instant::from_ms(0);
        timers.start(T::A, now, Duration::from_ms(30)).unwrap();
        timers.start(T::B, now, Duration::from_ms(10)).unwrap();
        timers.start(T::C, now, Duration::from_ms(20)).unwrap();
        assert_eq!(timers.next_deadline(), Some(Instant::from_ms(10)));

        assert_eq!(timers.pop_expired(Instant::from_ms(5)), None);
        let later = Instant::from_ms(30);
        assert_eq!(timers.pop_expired(later), Some(T::B));
        assert_eq!(timers.pop_expired(later), Some(T::C));
        assert_eq!(timers.pop_expired(later), Some(T::A));
        assert_eq!(timers.pop_expired(later), None);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn ties_in_insertion_order() {
        let mut timers = TimerScheduler::<T, 4>::new();
        let deadline = Instant::from_ms(5);
        timers.start_at(T::C, deadline).unwrap();
        timers.start_at(T::A, deadline).unwrap();
        timers.start_at(T::B, deadline).unwrap();
        assert_eq!(timers.pop_expired(deadline), Some(T::C));
        assert_eq!(timers.pop_expired(deadline), Some(T::A));
        assert_eq!(timers.pop_expired(deadline), Some(T::B));
    }

    #[test]
    fn restart_and_stop() {
        let mut timers = TimerScheduler::<T, 2>::new();
        timers.start_at(T::A, Instant::from_ms(10)).unwrap();
        timers.start_at(T::A, Instant::from_ms(50)).unwrap();
        assert_eq!(timers.deadline(T::A), Some(Instant::from_ms(50)));
        assert_eq!(timers.pop_expired(Instant::from_ms(20)), None);

        timers.stop(T::A);
        timers.stop(T::A);
        assert!(!timers.is_running(T::A));

        timers.start_at(T::A, Instant::from_ms(1)).unwrap();
        timers.start_at(T::B, Instant::from_ms(1)).unwrap();
        assert_eq!(timers.start_at(T::C, Instant::from_ms(1)), Err(Error::NoBufs));
    }

    #[test]
    fn handler_rearms_itself() {
        let mut timers = TimerScheduler::<T, 2>::new();
        let mut now = Instant::from_ms(0);
        timers.start(T::A, now, Duration::from_ms(10)).unwrap();
        let mut fired = 0;
        for _ in 0..3 {
            now = timers.next_deadline().unwrap();
            while let Some(id) = timers.pop_expired(now) {
                assert_eq!(id, T::A);
                fired += 1;
                timers.start(T::A, now, Duration::from_ms(10)).unwrap();
            }
        }
        assert_eq!(fired, 3);
        assert_eq!(now, Instant::from_ms(30));
    }
}
