//! File-tailing shipper: parse appended lines, batch them, deliver them,
//! and remember how far it got.

mod line;
mod offset;
mod transport;

pub use line::{LineRejected, SHIPPER_TAG, parse_line};
pub use offset::OffsetStore;
pub use transport::{BatchTransport, HttpBatchTransport, HttpTransportSettings, TransportError};

use crate::domain::LogRecord;
use serde::Serialize;
use std::io::{self, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum ShipperError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ShipperSettings {
    pub log_file: PathBuf,
    /// Defaults to `<log_file>.position`.
    pub position_file: Option<PathBuf>,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    /// Offset is saved at most once per this many processed lines.
    pub save_interval: u64,
    /// Sleep between polls when no new content is available.
    pub poll_interval: Duration,
    /// Lines delivered after a dropped batch before its offset hold is
    /// released. `None` keeps the hold for the rest of the run.
    pub max_replay_lines: Option<u64>,
}

impl ShipperSettings {
    pub fn new(log_file: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_file.into(),
            position_file: None,
            batch_size: 50,
            batch_timeout: Duration::from_secs(5),
            save_interval: 100,
            poll_interval: Duration::from_millis(100),
            max_replay_lines: None,
        }
    }
}

#[derive(Debug, Default)]
struct ShipperStats {
    processed: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    batches_sent: AtomicU64,
    position_saves: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShipperStatsSnapshot {
    pub lines_processed: u64,
    pub lines_sent: u64,
    pub lines_failed: u64,
    pub lines_skipped: u64,
    pub batches_sent: u64,
    pub position_saves: u64,
}

/// Per-run tailing state. Offsets are byte positions in the tailed file.
struct TailState {
    buffer: Vec<LogRecord>,
    /// Position right before the first buffered line.
    buffer_start: u64,
    /// Position right after the last consumed line.
    position: u64,
    /// Everything before this is delivered or was deliberately skipped.
    confirmed: u64,
    /// Start of the first dropped batch; saves never go past it while set.
    hold: Option<u64>,
    /// Lines delivered since `hold` was set.
    delivered_since_hold: u64,
    saved: u64,
    lines_since_save: u64,
    last_flush: Instant,
    partial: Vec<u8>,
}

impl TailState {
    fn new(offset: u64) -> Self {
        Self {
            buffer: Vec::new(),
            buffer_start: offset,
            position: offset,
            confirmed: offset,
            hold: None,
            delivered_since_hold: 0,
            saved: offset,
            lines_since_save: 0,
            last_flush: Instant::now(),
            partial: Vec::new(),
        }
    }

    /// End of the last complete line. A buffered fragment is not consumed yet.
    fn consumed(&self) -> u64 {
        self.position - self.partial.len() as u64
    }

    fn save_target(&self) -> u64 {
        self.hold
            .map_or(self.confirmed, |hold| hold.min(self.confirmed))
    }

    fn reset(&mut self) {
        *self = Self::new(0);
    }
}

pub struct Shipper {
    settings: ShipperSettings,
    transport: Arc<dyn BatchTransport>,
    offsets: OffsetStore,
    file_label: String,
    stats: ShipperStats,
}

impl Shipper {
    pub fn new(settings: ShipperSettings, transport: Arc<dyn BatchTransport>) -> Self {
        let offsets = settings
            .position_file
            .clone()
            .map_or_else(|| OffsetStore::beside(&settings.log_file), OffsetStore::new);
        let file_label = settings.log_file.display().to_string();
        Self {
            settings,
            transport,
            offsets,
            file_label,
            stats: ShipperStats::default(),
        }
    }

    pub fn offsets(&self) -> &OffsetStore {
        &self.offsets
    }

    pub fn stats(&self) -> ShipperStatsSnapshot {
        ShipperStatsSnapshot {
            lines_processed: self.stats.processed.load(Ordering::Relaxed),
            lines_sent: self.stats.sent.load(Ordering::Relaxed),
            lines_failed: self.stats.failed.load(Ordering::Relaxed),
            lines_skipped: self.stats.skipped.load(Ordering::Relaxed),
            batches_sent: self.stats.batches_sent.load(Ordering::Relaxed),
            position_saves: self.stats.position_saves.load(Ordering::Relaxed),
        }
    }

    fn io_error(&self, source: io::Error) -> ShipperError {
        ShipperError::Io {
            path: self.settings.log_file.clone(),
            source,
        }
    }

    /// Tail the file until `shutdown` fires, then flush and force-save the offset.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<ShipperStatsSnapshot, ShipperError> {
        let Some(file) = self.open_when_present(&shutdown).await? else {
            return Ok(self.stats());
        };

        let start = self.offsets.load().await;
        let length = file.metadata().await.map_err(|e| self.io_error(e))?.len();
        let start = if start > length {
            warn!(
                "Saved offset {} is past the end of {} ({} bytes), starting over",
                start, self.file_label, length
            );
            0
        } else {
            start
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(start))
            .await
            .map_err(|e| self.io_error(e))?;
        let mut state = TailState::new(start);
        info!("Shipping {} from offset {}", self.file_label, start);

        let mut line = Vec::new();
        while !shutdown.is_cancelled() {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| self.io_error(e))?;

            if read == 0 {
                self.on_idle(&mut reader, &mut state).await?;
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.poll_interval) => {}
                }
                continue;
            }

            state.position += read as u64;
            if line.last() != Some(&b'\n') {
                // Writer is mid-line; keep the fragment until the newline lands.
                state.partial.extend_from_slice(&line);
                continue;
            }
            let line_start = state.position - (state.partial.len() + read) as u64;
            let mut full = std::mem::take(&mut state.partial);
            full.extend_from_slice(&line);
            self.consume_line(&String::from_utf8_lossy(&full), line_start, &mut state)
                .await;
        }

        self.flush(&mut state).await;
        self.save_offset(&mut state, true).await;
        let stats = self.stats();
        info!(
            "Shipper stopped: processed={} sent={} failed={} skipped={} batches={} saves={}",
            stats.lines_processed,
            stats.lines_sent,
            stats.lines_failed,
            stats.lines_skipped,
            stats.batches_sent,
            stats.position_saves
        );
        Ok(stats)
    }

    async fn open_when_present(&self, shutdown: &CancellationToken) -> Result<Option<File>, ShipperError> {
        let mut warned = false;
        loop {
            match File::open(&self.settings.log_file).await {
                Ok(file) => return Ok(Some(file)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if !warned {
                        warn!("Waiting for {} to appear", self.file_label);
                        warned = true;
                    }
                }
                Err(e) => return Err(self.io_error(e)),
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    async fn consume_line(&self, text: &str, line_start: u64, state: &mut TailState) {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        state.lines_since_save += 1;

        let text = text.trim_end_matches(['\r', '\n']);
        match parse_line(text, &self.file_label) {
            Ok(record) => {
                if state.buffer.is_empty() {
                    state.buffer_start = line_start;
                }
                state.buffer.push(record);
            }
            Err(e) => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                debug!("Skipping line at offset {}: {}", line_start, e);
            }
        }
        if state.buffer.is_empty() {
            state.confirmed = state.consumed();
        }

        if state.buffer.len() >= self.settings.batch_size
            || state.last_flush.elapsed() >= self.settings.batch_timeout
        {
            self.flush(state).await;
        }
        if state.lines_since_save >= self.settings.save_interval {
            self.save_offset(state, false).await;
        }
    }

    /// Handle end of file: detect truncation and flush on timeout.
    async fn on_idle(&self, reader: &mut BufReader<File>, state: &mut TailState) -> Result<(), ShipperError> {
        let length = tokio::fs::metadata(&self.settings.log_file)
            .await
            .map_err(|e| self.io_error(e))?
            .len();
        if length < state.position {
            warn!(
                "{} was truncated ({} < {}), reading from the start",
                self.file_label, length, state.position
            );
            self.flush(state).await;
            reader
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|e| self.io_error(e))?;
            state.reset();
            self.save_offset(state, true).await;
            return Ok(());
        }

        if state.last_flush.elapsed() >= self.settings.batch_timeout {
            self.flush(state).await;
        }
        Ok(())
    }

    /// Deliver the buffer. A failed batch is dropped and counted.
    async fn flush(&self, state: &mut TailState) {
        state.last_flush = Instant::now();
        if state.buffer.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut state.buffer);

        match self.transport.send_batch(&batch).await {
            Ok(count) => {
                self.stats.sent.fetch_add(count as u64, Ordering::Relaxed);
                self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                state.confirmed = state.consumed();
                debug!("Shipped {} lines", count);
                self.release_hold(state, count as u64);
            }
            Err(e) => {
                self.stats
                    .failed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                if state.hold.is_none() {
                    state.hold = Some(state.buffer_start);
                    state.delivered_since_hold = 0;
                }
                state.confirmed = state.consumed();
                error!("Dropping batch of {} lines: {}", batch.len(), e);
            }
        }
    }

    fn release_hold(&self, state: &mut TailState, delivered: u64) {
        let (Some(hold), Some(limit)) = (state.hold, self.settings.max_replay_lines) else {
            return;
        };
        state.delivered_since_hold += delivered;
        if state.delivered_since_hold >= limit {
            warn!(
                "Releasing offset hold at {} after {} delivered lines; dropped lines before it will not be replayed",
                hold, state.delivered_since_hold
            );
            state.hold = None;
            state.delivered_since_hold = 0;
        }
    }

    async fn save_offset(&self, state: &mut TailState, force: bool) {
        let target = state.save_target();
        if !force && target <= state.saved {
            state.lines_since_save = 0;
            return;
        }
        match self.offsets.save(target).await {
            Ok(()) => {
                state.saved = target;
                state.lines_since_save = 0;
                self.stats.position_saves.fetch_add(1, Ordering::Relaxed);
                debug!("Saved offset {} for {}", target, self.file_label);
            }
            Err(e) => warn!("Failed to save offset to {}: {}", self.offsets.path().display(), e),
        }
    }
}
