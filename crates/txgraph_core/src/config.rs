//! Coordinator configuration.

/// Configuration for opening a [`crate::Database`].
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Whether to fsync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// How many resolved transactions are remembered for idempotent replay.
    pub resolved_txn_retention: usize,

    /// Run conflict-index garbage collection every N commits (0 = never).
    pub gc_every_commits: u64,

    /// Largest number of edits accepted in one mutation.
    pub max_edits_per_mutation: usize,

    /// How many transactions opened by queries may sit open with nothing
    /// staged before the oldest is aborted.
    pub max_idle_txns: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
            resolved_txn_retention: 10_000,
            gc_every_commits: 256,
            max_edits_per_mutation: 100_000,
            max_idle_txns: crate::txn::DEFAULT_MAX_IDLE,
        }
    }
}

impl CoreConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to fsync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets how many resolved transactions are retained.
    #[must_use]
    pub const fn resolved_txn_retention(mut self, count: usize) -> Self {
        self.resolved_txn_retention = count;
        self
    }

    /// Sets the garbage collection interval in commits.
    #[must_use]
    pub const fn gc_every_commits(mut self, commits: u64) -> Self {
        self.gc_every_commits = commits;
        self
    }

    /// Sets the per-mutation edit limit.
    #[must_use]
    pub const fn max_edits_per_mutation(mut self, limit: usize) -> Self {
        self.max_edits_per_mutation = limit;
        self
    }

    /// Sets the idle transaction limit.
    #[must_use]
    pub const fn max_idle_txns(mut self, limit: usize) -> Self {
        self.max_idle_txns = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CoreConfig::default();
        assert!(config.sync_on_commit);
        assert_eq!(config.gc_every_commits, 256);
    }

    #[test]
    fn builder_pattern() {
        let config = CoreConfig::new()
            .sync_on_commit(false)
            .resolved_txn_retention(8)
            .gc_every_commits(0)
            .max_edits_per_mutation(10)
            .max_idle_txns(3);

        assert!(!config.sync_on_commit);
        assert_eq!(config.resolved_txn_retention, 8);
        assert_eq!(config.gc_every_commits, 0);
        assert_eq!(config.max_edits_per_mutation, 10);
        assert_eq!(config.max_idle_txns, 3);
    }
}
