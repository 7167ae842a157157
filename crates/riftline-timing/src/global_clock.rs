use once_cell::sync::OnceCell;

/// Process-wide monotonic cycle-counter source.
///
/// Excluded from the core per the spec (component F): the contract is just
/// "monotonic 64-bit counter + cycles->ns conversion". `quanta` already gives
/// us a calibrated TSC reader on x86_64 with a portable fallback elsewhere.
pub type Clock = quanta::Clock;

static GLOBAL_CLOCK: OnceCell<Clock> = OnceCell::new();

#[inline]
pub fn global_clock() -> &'static Clock {
    GLOBAL_CLOCK.get_or_init(Clock::new)
}
