//! Conversions between [`Duration`] and the dispatcher's native tick
//! representation.
//!
//! The dispatcher measures time in signed 100-nanosecond ticks. Negative
//! quantities express relative offsets, which is how waits and timers are
//! armed; the saturated positive value is the infinite sentinel.

use std::time::{Duration, Instant};

/// Signed 100-nanosecond tick count.
pub type NativeTicks = i64;

/// Ticks per second of the native quantum.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// Nanoseconds represented by one tick.
pub const NANOS_PER_TICK: u32 = 100;

/// The infinite-timeout sentinel: the saturated positive tick count.
pub const INFINITE: NativeTicks = NativeTicks::MAX;

/// Converts a duration to native ticks, saturating at [`INFINITE`].
pub fn to_ticks(duration: Duration) -> NativeTicks {
    let ticks = duration.as_nanos() / NANOS_PER_TICK as u128;
    if ticks >= INFINITE as u128 {
        INFINITE
    } else {
        ticks as NativeTicks
    }
}

/// Converts a non-negative tick count back to a duration.
pub fn from_ticks(ticks: NativeTicks) -> Duration {
    let ticks = ticks.max(0);
    let secs = (ticks / TICKS_PER_SECOND) as u64;
    let nanos = (ticks % TICKS_PER_SECOND) as u32 * NANOS_PER_TICK;
    Duration::new(secs, nanos)
}

/// Negates a tick count to express a relative offset.
pub fn negate(ticks: NativeTicks) -> NativeTicks {
    ticks.checked_neg().unwrap_or(NativeTicks::MIN + 1)
}

/// Converts a duration into the negated relative tick form waits and timers
/// are armed with.
pub fn as_relative(duration: Duration) -> NativeTicks {
    negate(to_ticks(duration))
}

/// Interprets a (possibly negated) relative tick quantity as a duration.
pub fn relative_duration(ticks: NativeTicks) -> Duration {
    from_ticks(ticks.unsigned_abs().min(NativeTicks::MAX as u64) as NativeTicks)
}

/// Time left until `deadline` on the steady clock.
///
/// A deadline in the past clamps to zero, meaning "fire immediately".
pub fn until_deadline(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
