//! Commit log writer and replay.

use crate::error::{CoreError, CoreResult};
use crate::log::record::{decode_frame, FrameHeader, LogRecord, HEADER_SIZE};
use parking_lot::Mutex;
use tracing::{debug, warn};
use txgraph_storage::StorageBackend;

/// Append-only log of committed state changes.
///
/// Appends are all-or-nothing from the reader's point of view: when the
/// backend fails mid-append, or the flush fails, the log is cut back to its
/// previous length so a failed commit can never resurface after restart.
pub struct CommitLog {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("sync_on_commit", &self.sync_on_commit)
            .finish_non_exhaustive()
    }
}

/// Outcome of reading the whole log.
#[derive(Debug, Default)]
pub struct Replay {
    /// Records in append order.
    pub records: Vec<LogRecord>,
    /// Bytes of an incomplete trailing record that were cut off.
    pub torn_bytes: u64,
}

impl CommitLog {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Appends and flushes one record, returning its offset.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the bytes could not be made durable. The
    /// log is left exactly as it was before the call.
    pub fn append(&self, record: &LogRecord) -> CoreResult<u64> {
        let frame = record.encode_frame()?;
        let mut backend = self.backend.lock();
        let before = backend.size()?;

        let result = backend.append(&frame).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            } else {
                backend.flush()?;
            }
            Ok(offset)
        });

        match result {
            Ok(offset) => {
                debug!(offset, bytes = frame.len(), "appended log record");
                Ok(offset)
            }
            Err(err) => {
                if backend.size().is_ok_and(|size| size > before) {
                    if let Err(rollback) = backend.truncate(before) {
                        warn!(error = %rollback, "failed to roll back partial log append");
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Current log size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every record from the start.
    ///
    /// An incomplete trailing record (a crash mid-append) ends the log and
    /// is truncated away. A damaged complete record is fatal.
    pub fn replay(&self) -> CoreResult<Replay> {
        let mut backend = self.backend.lock();
        let size = backend.size()?;
        let mut replay = Replay::default();
        let mut offset = 0u64;

        while offset < size {
            let remaining = size - offset;
            if remaining < HEADER_SIZE as u64 {
                break;
            }
            let header_bytes = backend.read_at(offset, HEADER_SIZE)?;
            let header = FrameHeader::parse(&header_bytes, offset)?;
            let frame_len = header.frame_len() as u64;
            if remaining < frame_len {
                break;
            }
            let frame = backend.read_at(offset, header.frame_len())?;
            let record = decode_frame(&frame, offset).map_err(|err| match err {
                CoreError::Codec { message } => CoreError::log_corruption(offset, message),
                other => other,
            })?;
            replay.records.push(record);
            offset += frame_len;
        }

        if offset < size {
            replay.torn_bytes = size - offset;
            warn!(
                offset,
                torn_bytes = replay.torn_bytes,
                "truncating incomplete record at end of commit log"
            );
            backend.truncate(offset)?;
        }
        Ok(replay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;
    use txgraph_storage::{InMemoryBackend, StorageError, StorageResult};

    fn schema(text: &str) -> LogRecord {
        LogRecord::Schema {
            text: text.to_string(),
        }
    }

    #[test]
    fn append_then_replay() {
        let backend = InMemoryBackend::new();
        let log = CommitLog::new(Box::new(backend.clone()), true);
        log.append(&schema("a: int .")).unwrap();
        log.append(&LogRecord::DropAll { at: Timestamp::new(4) })
            .unwrap();

        let reopened = CommitLog::new(Box::new(backend), true);
        let replay = reopened.replay().unwrap();
        assert_eq!(replay.records.len(), 2);
        assert_eq!(replay.records[0], schema("a: int ."));
        assert_eq!(replay.torn_bytes, 0);
    }

    #[test]
    fn torn_tail_is_cut_off() {
        let backend = InMemoryBackend::new();
        let log = CommitLog::new(Box::new(backend.clone()), false);
        log.append(&schema("a: int .")).unwrap();
        let good_len = log.size().unwrap();
        let frame = schema("b: int .").encode_frame().unwrap();

        let mut raw = backend.clone();
        raw.append(&frame[..frame.len() - 3]).unwrap();

        let replay = log.replay().unwrap();
        assert_eq!(replay.records.len(), 1);
        assert_eq!(replay.torn_bytes, frame.len() as u64 - 3);
        assert_eq!(log.size().unwrap(), good_len);

        log.append(&schema("c: int .")).unwrap();
        assert_eq!(log.replay().unwrap().records.len(), 2);
    }

    #[test]
    fn corruption_is_fatal() {
        let backend = InMemoryBackend::new();
        let log = CommitLog::new(Box::new(backend.clone()), false);
        log.append(&schema("a: int .")).unwrap();
        log.append(&schema("b: int .")).unwrap();
        backend.corrupt_byte(HEADER_SIZE + 1);

        let err = log.replay().unwrap_err();
        assert!(matches!(err, CoreError::LogCorruption { offset: 0, .. }), "{err}");
    }

    #[derive(Debug, Default)]
    struct FailingFlush {
        inner: InMemoryBackend,
    }

    impl StorageBackend for FailingFlush {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            Err(StorageError::WriteRejected("flush failed".into()))
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn sync(&mut self) -> StorageResult<()> {
            self.flush()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn failed_flush_rolls_back() {
        let inner = InMemoryBackend::new();
        let log = CommitLog::new(
            Box::new(FailingFlush {
                inner: inner.clone(),
            }),
            true,
        );
        let err = log.append(&schema("a: int .")).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(inner.snapshot().len(), 0);
    }
}
