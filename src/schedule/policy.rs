//! Injectable retry policy
//!
//! One value object holds every retry constant: attempt bound, the linear
//! delay ramp with its cap, priority escalation, and the limits on
//! rescheduling terminally-failed entries. Callers never hard-code a retry
//! number.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::schedule::entry::Priority;

/// Retry policy for schedule entries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum executions per entry before it moves to the failed log
    pub max_attempts: u32,

    /// Delay unit in minutes; attempt `n` waits `n * base_delay_minutes`
    pub base_delay_minutes: i64,

    /// Upper bound on the retry delay in minutes
    pub delay_cap_minutes: i64,

    /// Failed entries with this many final attempts or more are not
    /// eligible for rescheduling
    pub reschedule_attempt_cap: u32,

    /// Maximum failed entries re-enqueued per recovery run
    pub reschedule_batch_limit: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_minutes: 15,
            delay_cap_minutes: 60,
            reschedule_attempt_cap: 5,
            reschedule_batch_limit: 10,
        }
    }
}

impl RetryPolicy {
    /// Whether an entry with `attempts` executions so far may try again
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Linear backoff: `min(base * attempts, cap)`
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let minutes = (self.base_delay_minutes * i64::from(attempts)).min(self.delay_cap_minutes);
        Duration::minutes(minutes)
    }

    /// Priority applied to a retried entry
    pub fn escalate(&self, priority: Priority) -> Priority {
        priority.escalated()
    }

    /// Whether a failed record is still eligible for rescheduling
    pub fn reschedulable(&self, final_attempts: u32) -> bool {
        final_attempts < self.reschedule_attempt_cap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_linear_delay_with_cap() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(1), Duration::minutes(15));
        assert_eq!(policy.delay_for(2), Duration::minutes(30));
        assert_eq!(policy.delay_for(3), Duration::minutes(45));
        // Capped at 60 minutes
        assert_eq!(policy.delay_for(5), Duration::minutes(60));
    }

    #[test]
    fn test_escalation() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.escalate(Priority::Normal), Priority::High);
        assert_eq!(policy.escalate(Priority::Emergency), Priority::Emergency);
    }

    #[test]
    fn test_reschedulable_bound() {
        let policy = RetryPolicy::default();
        assert!(policy.reschedulable(3));
        assert!(!policy.reschedulable(5));
    }

    #[test]
    fn test_policy_deserialize_partial() {
        let policy: RetryPolicy = toml::from_str("max_attempts = 5").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_minutes, 15);
    }
}
