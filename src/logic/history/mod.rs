//! History Sink Boundary
//!
//! Publish-only audit trail of processed events. The orchestrator decides
//! whether to publish based on the active history control; this module owns
//! the audit record shape, the `HistorySink` trait and an append-only JSONL
//! implementation with size-based rotation.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::logic::detector::{ChainResult, Severity};
use crate::logic::event::RawEvent;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Maximum file size before rotation (50 MB)
const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Log file extension
const LOG_EXT: &str = ".jsonl";

// ============================================================================
// AUDIT RECORD
// ============================================================================

/// One persisted event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub event_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub event: RawEvent,
    pub chain_result: ChainResult,
    /// True when at least one policy rule matched
    pub incident: bool,
    pub severity: Severity,
    pub block_rule_ids: Vec<String>,
    pub notify_rule_ids: Vec<String>,
}

// ============================================================================
// TRAIT
// ============================================================================

/// External audit/replay store boundary
pub trait HistorySink: Send + Sync {
    fn publish(&self, record: &AuditRecord) -> Result<(), JobError>;
}

// ============================================================================
// JSONL SINK
// ============================================================================

/// Append-only JSONL sink, one record per line, flushed per record
pub struct JsonlHistorySink {
    inner: Mutex<JsonlWriter>,
}

struct JsonlWriter {
    writer: BufWriter<File>,
    current_file: PathBuf,
    current_size: u64,
    base_dir: PathBuf,
}

impl JsonlHistorySink {
    pub fn new(base_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir)?;
        let (current_file, file) = open_new_file(&base_dir)?;

        Ok(Self {
            inner: Mutex::new(JsonlWriter {
                writer: BufWriter::new(file),
                current_file,
                current_size: 0,
                base_dir,
            }),
        })
    }

    pub fn current_file(&self) -> PathBuf {
        self.inner.lock().current_file.clone()
    }
}

fn open_new_file(base_dir: &Path) -> std::io::Result<(PathBuf, File)> {
    let now = Utc::now();
    let filename = format!(
        "audit_{}_{:02}_{:02}_{:02}{:02}{:02}{}",
        now.year(),
        now.month(),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        LOG_EXT
    );
    let file_path = base_dir.join(&filename);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)?;

    log::info!("Opened audit log: {:?}", file_path);
    Ok((file_path, file))
}

impl JsonlWriter {
    fn append(&mut self, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let bytes = line.as_bytes();

        if self.current_size + bytes.len() as u64 > MAX_FILE_SIZE {
            self.rotate()?;
        }

        self.writer.write_all(bytes)?;
        self.writer.write_all(b"\n")?;
        self.current_size += bytes.len() as u64 + 1;

        // Flush for durability
        self.writer.flush()
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.writer.flush()?;

        let (new_path, new_file) = open_new_file(&self.base_dir)?;
        self.writer = BufWriter::new(new_file);

        log::info!("Rotated audit log from {:?} to {:?}", self.current_file, new_path);
        self.current_file = new_path;
        self.current_size = 0;

        Ok(())
    }
}

impl HistorySink for JsonlHistorySink {
    fn publish(&self, record: &AuditRecord) -> Result<(), JobError> {
        self.inner
            .lock()
            .append(record)
            .map_err(|e| JobError::History(e.to_string()))
    }
}

/// Read all audit records from a log file. Lines that fail to parse are
/// skipped with a warning so replay still yields the intact records.
pub fn read_records(file_path: &Path) -> std::io::Result<Vec<AuditRecord>> {
    use std::io::{BufRead, BufReader};

    let file = File::open(file_path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                log::warn!(
                    "Skipping corrupt audit record at {:?}:{}: {}",
                    file_path,
                    number + 1,
                    e
                );
            }
        }
    }
    if skipped > 0 {
        log::warn!("Skipped {} corrupt record(s) in {:?}", skipped, file_path);
    }

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::event::EventKind;
    use tempfile::TempDir;

    fn record(incident: bool) -> AuditRecord {
        AuditRecord {
            event_id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            event: RawEvent::new(EventKind::ProcessExec, "node-1"),
            chain_result: ChainResult::default(),
            incident,
            severity: Severity::None,
            block_rule_ids: vec![],
            notify_rule_ids: vec![],
        }
    }

    #[test]
    fn test_publish_and_read_back() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlHistorySink::new(dir.path()).unwrap();

        sink.publish(&record(false)).unwrap();
        sink.publish(&record(true)).unwrap();

        let records = read_records(&sink.current_file()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].incident);
        assert!(records[1].incident);
    }

    #[test]
    fn test_corrupt_line_does_not_lose_intact_records() {
        use std::io::Write;

        let dir = TempDir::new().unwrap();
        let sink = JsonlHistorySink::new(dir.path()).unwrap();

        sink.publish(&record(false)).unwrap();
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(sink.current_file())
                .unwrap();
            writeln!(file, "{{not json").unwrap();
        }
        sink.publish(&record(true)).unwrap();

        let records = read_records(&sink.current_file()).unwrap();
        assert_eq!(records.len(), 2);
        assert!(!records[0].incident);
        assert!(records[1].incident);
    }

    #[test]
    fn test_jsonl_format() {
        let dir = TempDir::new().unwrap();
        let sink = JsonlHistorySink::new(dir.path()).unwrap();

        for _ in 0..3 {
            sink.publish(&record(false)).unwrap();
        }

        let content = std::fs::read_to_string(sink.current_file()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            assert!(serde_json::from_str::<AuditRecord>(line).is_ok());
        }
    }
}
