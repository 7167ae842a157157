use crate::{Duration, global_clock::global_clock};

/// A raw monotonic cycle-counter reading.
///
/// This is the "t_event"/"t_decrypt"/"t_callback" timestamp type: cheap to
/// take (a single `RDTSC`-class read via `quanta`, no syscall), compared by
/// converting the *difference* of two readings to nanoseconds rather than
/// converting each reading individually, since the calibration is only valid
/// across a delta.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Instant(pub u64);

impl Instant {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn now() -> Self {
        Instant(global_clock().raw())
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(*self)
    }

    #[inline]
    pub fn saturating_duration_since(&self, earlier: Instant) -> Duration {
        if self.0 < earlier.0 {
            return Duration::ZERO;
        }
        Duration(global_clock().delta_as_nanos(earlier.0, self.0))
    }
}

impl PartialOrd for Instant {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.0.cmp(&other.0))
    }
}

impl Ord for Instant {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_ordering() {
        let a = Instant::now();
        let b = Instant::now();
        assert!(b >= a);
    }

    #[test]
    fn elapsed_never_underflows() {
        let future = Instant(u64::MAX);
        assert_eq!(future.elapsed(), Duration::ZERO);
    }
}
