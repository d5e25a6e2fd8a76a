//! Exponential backoff with jitter for failed reconciles.

use std::time::Duration;

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    /// Returns the delay before retry number `failures` (zero-based), without jitter.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    /// Returns the delay with up to 10% random jitter, still capped at `max`.
    #[must_use]
    pub fn jittered_delay(&self, failures: u32) -> Duration {
        let delay = self.delay(failures);
        let jitter = delay.mul_f64(random_fraction() * 0.1);
        (delay + jitter).min(self.max)
    }
}

fn random_fraction() -> f64 {
    let mut bytes = [0_u8; 2];
    if getrandom::fill(&mut bytes).is_err() {
        return 0.0;
    }

    f64::from(u16::from_le_bytes(bytes)) / f64::from(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay(0), Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(9), Duration::from_secs(300));
        assert_eq!(backoff.delay(64), Duration::from_secs(300));
    }

    #[test]
    fn jitter_stays_within_ten_percent_and_cap() {
        let backoff = Backoff::default();
        for failures in 0..12 {
            let base = backoff.delay(failures);
            let jittered = backoff.jittered_delay(failures);
            assert!(jittered >= base);
            assert!(jittered <= (base + base / 10 + Duration::from_millis(1)).min(backoff.max));
        }
    }
}
