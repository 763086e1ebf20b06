use std::time::Duration;

/// Bounded retry with exponential backoff and a per-attempt timeout.
///
/// The policy is stateless; each call keeps its own attempt counter. Fields
/// are private so every policy goes through [`RetryPolicy::new`] and always
/// allows at least one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    timeout_per_attempt: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, timeout_per_attempt: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            timeout_per_attempt,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn timeout_per_attempt(&self) -> Duration {
        self.timeout_per_attempt
    }

    /// Wait inserted after the failed attempt with zero-based index
    /// `attempt_index`: `base_delay * 2^attempt_index`.
    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Upper bound on how long a single fetch may run.
    pub fn worst_case_duration(&self) -> Duration {
        (0..self.max_attempts).fold(Duration::ZERO, |total, idx| {
            let backoff = if idx + 1 < self.max_attempts {
                self.delay_for_attempt(idx)
            } else {
                Duration::ZERO
            };
            total
                .saturating_add(self.timeout_per_attempt)
                .saturating_add(backoff)
        })
    }
}
