use once_cell::sync::Lazy;
use std::time::Instant;

static START: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds since the process started.
///
/// Truncated to 32 bits like the firmware's `millis()`, so it wraps after
/// roughly 49 days; every comparison against it uses `wrapping_sub`.
pub fn millis() -> u32 {
    START.elapsed().as_millis() as u32
}

/// Source of monotonic millisecond timestamps for controllers and data points.
pub trait Clock: Send + Sync {
    fn millis(&self) -> u32;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn millis(&self) -> u32 {
        millis()
    }
}

/// Time elapsed from `since` to `now`, tolerant of the 32 bit wrap.
pub fn elapsed(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

/// Whether `time` lies after `reference`, assuming both are less than half
/// the counter range apart.
pub fn is_after(time: u32, reference: u32) -> bool {
    let ahead = elapsed(time, reference);
    ahead != 0 && ahead <= i32::MAX as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_handles_wraparound() {
        assert_eq!(elapsed(1500, 1000), 500);
        assert_eq!(elapsed(10, u32::MAX - 9), 20);
    }

    #[test]
    fn is_after_across_wraparound() {
        assert!(is_after(1500, 1000));
        assert!(!is_after(1000, 1500));
        assert!(!is_after(1000, 1000));
        assert!(is_after(5, u32::MAX - 10));
        assert!(!is_after(u32::MAX - 10, 5));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock;
        let first = clock.millis();
        let second = clock.millis();
        assert!(second >= first);
    }
}
