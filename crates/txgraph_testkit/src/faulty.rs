//! Fault-injecting storage backend.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use txgraph_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

#[derive(Debug, Default)]
struct FaultState {
    fail_next: AtomicUsize,
    fail_always: AtomicBool,
    rejected: AtomicU64,
}

/// Controls a [`FaultyBackend`] after it has been moved into a database.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    state: Arc<FaultState>,
}

impl FaultSwitch {
    /// Rejects the next `count` appends.
    pub fn fail_next_appends(&self, count: usize) {
        self.state.fail_next.store(count, Ordering::SeqCst);
    }

    /// Rejects every append until [`FaultSwitch::heal`].
    pub fn fail_all_appends(&self) {
        self.state.fail_always.store(true, Ordering::SeqCst);
    }

    /// Stops injecting faults.
    pub fn heal(&self) {
        self.state.fail_next.store(0, Ordering::SeqCst);
        self.state.fail_always.store(false, Ordering::SeqCst);
    }

    /// Appends rejected so far.
    #[must_use]
    pub fn rejected(&self) -> u64 {
        self.state.rejected.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.state.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// An in-memory backend whose appends can be made to fail on demand.
///
/// Rejected appends write nothing, so the log stays intact.
#[derive(Debug, Clone)]
pub struct FaultyBackend {
    inner: InMemoryBackend,
    switch: FaultSwitch,
}

impl FaultyBackend {
    /// Creates a backend over fresh storage, plus its switch.
    #[must_use]
    pub fn in_memory() -> (Self, FaultSwitch) {
        Self::wrap(InMemoryBackend::new())
    }

    /// Wraps existing storage. Clones of `inner` see the same bytes.
    #[must_use]
    pub fn wrap(inner: InMemoryBackend) -> (Self, FaultSwitch) {
        let switch = FaultSwitch::default();
        (
            Self {
                inner,
                switch: switch.clone(),
            },
            switch,
        )
    }

    /// The wrapped storage.
    #[must_use]
    pub fn inner(&self) -> &InMemoryBackend {
        &self.inner
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        if self.switch.should_fail() {
            self.switch.state.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(StorageError::WriteRejected(format!(
                "injected fault on {}-byte append",
                data.len()
            )));
        }
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
