//! Configuration for the sync engine.

use goalsync_core::profile_id_for_account;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Remote account user id of the signed-in user.
    pub account_user_id: String,
    /// Maximum records requested per change query.
    pub pull_batch_size: u32,
    /// Maximum records applied per kind during a background fetch.
    pub background_batch_cap: u32,
    /// Timeout for each remote call.
    pub operation_timeout: Duration,
    /// Wall-clock budget for a background fetch.
    pub background_budget: Duration,
    /// Retry budget for conflicted saves.
    pub retry: ConflictRetry,
    /// Capacity of the trigger channel.
    pub trigger_queue_depth: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration for an account.
    pub fn new(account_user_id: impl Into<String>) -> Self {
        Self {
            account_user_id: account_user_id.into(),
            pull_batch_size: 100,
            background_batch_cap: 25,
            operation_timeout: Duration::from_secs(30),
            background_budget: Duration::from_secs(25),
            retry: ConflictRetry::default(),
            trigger_queue_depth: 64,
        }
    }

    /// Local id of the account's profile.
    pub fn profile_id(&self) -> String {
        profile_id_for_account(&self.account_user_id)
    }

    /// Sets the pull batch size.
    pub fn with_pull_batch_size(mut self, size: u32) -> Self {
        self.pull_batch_size = size.max(1);
        self
    }

    /// Sets the background batch cap.
    pub fn with_background_batch_cap(mut self, cap: u32) -> Self {
        self.background_batch_cap = cap.max(1);
        self
    }

    /// Sets the per-call timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the background fetch budget.
    pub fn with_background_budget(mut self, budget: Duration) -> Self {
        self.background_budget = budget;
        self
    }

    /// Sets the conflicted-save retry budget.
    pub fn with_retry(mut self, retry: ConflictRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the trigger channel capacity.
    pub fn with_trigger_queue_depth(mut self, depth: usize) -> Self {
        self.trigger_queue_depth = depth.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// How often a save that keeps conflicting is retried within one pass.
///
/// Each retry re-merges onto the server's newest copy, so the wait grows
/// linearly to give the other writer time to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictRetry {
    /// Maximum save attempts for one entity in one pass.
    pub max_attempts: u32,
    /// Wait added per retry.
    pub backoff: Duration,
}

impl ConflictRetry {
    /// Up to `max_attempts` saves with a 100 ms step between them.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(100),
        }
    }

    /// Retries without waiting.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts).with_backoff(Duration::ZERO)
    }

    /// Sets the per-retry step.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Wait before the save following `attempt` (1-based) conflicted saves.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for ConflictRetry {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("_a1b2c3")
            .with_pull_batch_size(50)
            .with_background_batch_cap(0)
            .with_operation_timeout(Duration::from_secs(5));

        assert_eq!(config.profile_id(), "a1b2c3");
        assert_eq!(config.pull_batch_size, 50);
        assert_eq!(config.background_batch_cap, 1);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.retry, ConflictRetry::new(3));
    }

    #[test]
    fn conflict_retry_waits_longer_each_time() {
        let retry = ConflictRetry::new(0).with_backoff(Duration::from_millis(50));
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay_after(1), Duration::from_millis(50));
        assert_eq!(retry.delay_after(3), Duration::from_millis(150));
        assert_eq!(ConflictRetry::immediate(5).delay_after(4), Duration::ZERO);
    }
}
