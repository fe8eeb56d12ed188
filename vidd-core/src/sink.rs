//! Frame sinks
//!
//! Downstream consumers of processed frames. A sink runs on the processor's
//! forwarder thread, never on the acquire loop, so a slow sink costs dropped
//! forward copies rather than compositor stalls.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::error::{Result, ResultExt, ViddError};
use crate::types::AcquiredFrame;

/// Consumer of forwarded frames
pub trait FrameSink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Take one frame
    fn accept(&self, frame: AcquiredFrame) -> Result<()>;

    /// Called once when the forwarder drains and exits
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sink that hands frames to another thread through a bounded channel
///
/// Frames are rejected rather than queued when the receiver falls behind.
pub struct ChannelSink {
    tx: Sender<AcquiredFrame>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it
    pub fn bounded(capacity: usize) -> (Self, Receiver<AcquiredFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn name(&self) -> &str {
        "channel"
    }

    fn accept(&self, frame: AcquiredFrame) -> Result<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ViddError::sink("receiver is behind")),
            Err(TrySendError::Disconnected(_)) => Err(ViddError::sink("receiver dropped")),
        }
    }
}

/// Sink that appends raw pixel payloads to a file
///
/// Frames without a CPU-visible payload are counted but not written.
pub struct RawFileSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    frames_written: AtomicU64,
    bytes_written: AtomicU64,
}

impl RawFileSink {
    /// Create (truncate) the output file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .map_err(ViddError::from)
            .context(format!("Failed to create {}", path.display()))?;
        info!("Writing raw frames to {}", path.display());
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            frames_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
        })
    }

    /// Output path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frames accepted so far
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Payload bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}

impl FrameSink for RawFileSink {
    fn name(&self) -> &str {
        "raw-file"
    }

    fn accept(&self, frame: AcquiredFrame) -> Result<()> {
        if let Some(ref pixels) = frame.pixels {
            self.writer.lock().write_all(pixels)?;
            self.bytes_written
                .fetch_add(pixels.len() as u64, Ordering::Relaxed);
        }
        self.frames_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.writer.lock().flush()?;
        debug!(
            "Flushed {} frames ({} bytes) to {}",
            self.frames_written(),
            self.bytes_written(),
            self.path.display()
        );
        Ok(())
    }
}
