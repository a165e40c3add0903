//! Event/Trajectory Sink (spec §4.10): per-day append-only JSONL event log
//! with a dead-letter queue for malformed or failed emissions.
//!
//! ```
//! use bridge_events::EventSink;
//! use bridge_types::EventRecord;
//! use tempfile::tempdir;
//!
//! let dir = tempdir().unwrap();
//! let mut sink = EventSink::new(dir.path());
//! sink.emit("engine", EventRecord::new("lock", "released", serde_json::json!({}))).unwrap();
//! ```

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bridge_types::EventRecord;
use chrono::{DateTime, Duration, Utc};

pub const DLQ_FILE: &str = "dead-letter.jsonl";

fn ensure_dir_0700(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating event dir {}", dir.display()))?;
    set_mode(dir, 0o700)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("setting permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Path of the day-file an event with timestamp `ts` belongs in.
pub fn day_file_path(event_dir: &Path, ts: DateTime<Utc>) -> PathBuf {
    event_dir.join(format!("events-{}.jsonl", ts.format("%Y-%m-%d")))
}

pub fn dlq_path(event_dir: &Path) -> PathBuf {
    event_dir.join(DLQ_FILE)
}

/// Append-only sink. Tracks the last-emitted timestamp per `emitter` label
/// so records from a single actor are totally ordered even if the system
/// clock doesn't advance between two calls within the same millisecond
/// (spec §5, "Events emitted by a single actor are totally ordered by
/// monotonic timestamp").
#[derive(Debug, Default)]
pub struct EventSink {
    event_dir: PathBuf,
    last_timestamp: HashMap<String, DateTime<Utc>>,
}

impl EventSink {
    pub fn new(event_dir: impl Into<PathBuf>) -> Self {
        Self {
            event_dir: event_dir.into(),
            last_timestamp: HashMap::new(),
        }
    }

    /// Emit a record from `emitter`, forcing its timestamp strictly after
    /// the emitter's previous record. On any I/O failure the record is
    /// instead appended to the dead-letter queue and the error is still
    /// surfaced to the caller.
    pub fn emit(&mut self, emitter: &str, mut record: EventRecord) -> Result<()> {
        let monotonic = match self.last_timestamp.get(emitter) {
            Some(prev) if record.timestamp <= *prev => *prev + Duration::milliseconds(1),
            _ => record.timestamp,
        };
        record.timestamp = monotonic;
        self.last_timestamp.insert(emitter.to_string(), monotonic);

        match self.write_record(&record) {
            Ok(()) => Ok(()),
            Err(e) => {
                let _ = self.write_to_dlq(&record);
                Err(e)
            }
        }
    }

    fn write_record(&self, record: &EventRecord) -> Result<()> {
        ensure_dir_0700(&self.event_dir)?;
        let path = day_file_path(&self.event_dir, record.timestamp);
        append_jsonl_line(&path, record)
    }

    fn write_to_dlq(&self, record: &EventRecord) -> Result<()> {
        ensure_dir_0700(&self.event_dir)?;
        append_jsonl_line(&dlq_path(&self.event_dir), record)
    }

    /// Read back all records for one day (test/audit helper).
    pub fn read_day(&self, date: DateTime<Utc>) -> Result<Vec<EventRecord>> {
        read_jsonl(&day_file_path(&self.event_dir, date))
    }

    /// Number of entries currently sitting in the dead-letter queue.
    pub fn dlq_depth(&self) -> usize {
        read_jsonl(&dlq_path(&self.event_dir))
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

fn append_jsonl_line(path: &Path, record: &EventRecord) -> Result<()> {
    let existed = path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    if !existed {
        set_mode(path, 0o600)?;
    }
    let mut writer = std::io::BufWriter::new(file);
    let line = serde_json::to_string(record).context("serializing event record")?;
    writeln!(writer, "{line}").context("writing event line")?;
    writer.flush().context("flushing event file")?;
    Ok(())
}

fn read_jsonl(path: &Path) -> Result<Vec<EventRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line.context("reading event line")?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line).context("parsing event line")?);
    }
    Ok(out)
}
