//! Durable commit log.
//!
//! Every state change that must survive a restart is appended here before
//! it becomes visible. Recovery replays the log from the beginning.

mod record;
mod writer;

pub use record::{decode_frame, FrameHeader, LogRecord, CRC_SIZE, HEADER_SIZE, LOG_MAGIC, LOG_VERSION};
pub use writer::{CommitLog, Replay};
