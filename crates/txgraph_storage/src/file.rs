//! File backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Default file name of the commit log inside a data directory.
pub const LOG_FILE_NAME: &str = "commit.log";

/// A single append-only file.
///
/// `flush` hands buffered bytes to the OS; `sync` additionally fsyncs data
/// and metadata. The cached size is updated under the same lock as the
/// write so concurrent readers never observe a half-appended length.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    inner: Mutex<FileState>,
}

#[derive(Debug)]
struct FileState {
    file: File,
    size: u64,
}

impl FileBackend {
    /// Opens (creating if needed) the file at `path`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(FileState { file, size }),
        })
    }

    /// Opens `dir/commit.log`, creating `dir` when missing.
    pub fn open_in_dir(dir: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(dir)?;
        Self::open(&dir.join(LOG_FILE_NAME))
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.inner.lock();
        let size = state.size;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }
        state.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        state.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.inner.get_mut();
        let offset = state.size;
        if data.is_empty() {
            return Ok(offset);
        }
        state.file.seek(SeekFrom::End(0))?;
        state.file.write_all(data)?;
        state.size += data.len() as u64;
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.get_mut().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.inner.get_mut();
        if new_size > state.size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: state.size,
            });
        }
        state.file.set_len(new_size)?;
        state.file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_in_dir_creates_log_file() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("alpha").join("w");
        let backend = FileBackend::open_in_dir(&nested).unwrap();
        assert_eq!(backend.path(), nested.join(LOG_FILE_NAME));
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn append_read_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.bin");
        {
            let mut backend = FileBackend::open(&path).unwrap();
            assert_eq!(backend.append(b"first").unwrap(), 0);
            assert_eq!(backend.append(b"second").unwrap(), 5);
            backend.sync().unwrap();
        }
        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 11);
        assert_eq!(backend.read_at(5, 6).unwrap(), b"second");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("x")).unwrap();
        backend.append(b"abc").unwrap();
        assert!(matches!(
            backend.read_at(2, 2),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_discards_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t");
        let mut backend = FileBackend::open(&path).unwrap();
        backend.append(b"keep-drop").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.size().unwrap(), 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"keep");
        assert!(backend.truncate(10).is_err());
    }
}
