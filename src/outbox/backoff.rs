// src/outbox/backoff.rs
// Exponential backoff with jitter, bounded by a ceiling, for outbox retries.

use chrono::Duration as ChronoDuration;
use rand::Rng;
use std::time::Duration;

/// Delay before the next attempt: `base * 2^(attempts-1)`, capped at
/// `ceiling`, with up to 20% jitter added to avoid synchronized retries
/// across workers.
pub fn next_delay(attempts: u32, base: Duration, ceiling: Duration) -> ChronoDuration {
    let exponent = attempts.saturating_sub(1).min(20);
    let scaled = base.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
    let capped = scaled.min(ceiling);

    let jitter_fraction = rand::rng().random_range(0.0..0.2);
    let jittered = capped.mul_f64(1.0 + jitter_fraction);

    ChronoDuration::from_std(jittered.min(ceiling.mul_f64(1.2))).unwrap_or(ChronoDuration::zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_with_attempts_until_ceiling() {
        let base = Duration::from_millis(100);
        let ceiling = Duration::from_secs(10);

        let first = next_delay(1, base, ceiling);
        let second = next_delay(2, base, ceiling);
        let late = next_delay(50, base, ceiling);

        assert!(first.num_milliseconds() < second.num_milliseconds());
        assert!(late.num_milliseconds() <= (ceiling.mul_f64(1.2)).as_millis() as i64);
    }

    #[test]
    fn delay_never_exceeds_ceiling_plus_jitter_bound() {
        let base = Duration::from_millis(500);
        let ceiling = Duration::from_secs(5);

        for attempts in 1..30 {
            let delay = next_delay(attempts, base, ceiling);
            assert!(delay.num_milliseconds() <= (ceiling.mul_f64(1.2)).as_millis() as i64);
        }
    }
}
