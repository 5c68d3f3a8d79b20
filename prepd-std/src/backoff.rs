use std::{cmp::min, time::Duration};

const INITIAL_WAIT_MS: u64 = 250;
const MAXIMUM_WAIT_MS: u64 = 32_000;
const EXP_BASE: u64 = 2;

/// An infinite iterator of [`Duration`]s which can be passed to e.g.
/// `tokio::time::sleep` to observe time-based exponential backoff.
///
/// Waits start at 250ms, double each step, and cap out at 32s.
pub fn iter() -> impl Iterator<Item = Duration> {
    iter_with_initial_wait_ms(INITIAL_WAIT_MS)
}

/// Like [`iter`], but with a custom initial wait time in milliseconds.
pub fn iter_with_initial_wait_ms(
    initial_wait_ms: u64,
) -> impl Iterator<Item = Duration> {
    // An initial wait above the cap doesn't break anything, but the caller
    // probably didn't intend it.
    debug_assert!(initial_wait_ms <= MAXIMUM_WAIT_MS);

    (0u32..).map(move |index| {
        let factor = EXP_BASE.saturating_pow(index);
        let wait_ms = initial_wait_ms.saturating_mul(factor);
        Duration::from_millis(min(wait_ms, MAXIMUM_WAIT_MS))
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_integer_overflow() {
        let mut durations = iter();
        for _ in 0..200 {
            durations.next();
        }
    }

    #[test]
    fn caps_at_maximum() {
        let late = iter().nth(50).unwrap();
        assert_eq!(late, Duration::from_millis(MAXIMUM_WAIT_MS));
    }
}
