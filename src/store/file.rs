//! CSV-file-backed stores. Each file starts with a header row and only ever
//! grows; every write opens the file in append mode.

use std::collections::HashSet;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::StoreError;

use super::csv::{encode_record, parse_records};
use super::model::{LEDGER_HEADER, LedgerEntry, PROCESSED_HEADER};
use super::traits::{Ledger, ProcessedSet};

/// Ledger stored as a CSV file.
pub struct CsvLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLedger {
    /// Open the ledger, creating it with a header row if absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        ensure_file(&path, &LEDGER_HEADER).await?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Ledger for CsvLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        append_line(&self.path, &encode_record(&entry.to_fields())).await
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        read_rows(&self.path)
            .await?
            .into_iter()
            .map(|(line, fields)| {
                LedgerEntry::from_fields(&fields)
                    .map_err(|reason| malformed(&self.path, line, reason))
            })
            .collect()
    }
}

/// Processed-message set stored as a single-column CSV file.
pub struct CsvProcessedSet {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvProcessedSet {
    /// Open the set, creating it with a header row if absent.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        ensure_file(&path, &PROCESSED_HEADER).await?;
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ProcessedSet for CsvProcessedSet {
    async fn load(&self) -> Result<HashSet<String>, StoreError> {
        Ok(read_rows(&self.path)
            .await?
            .into_iter()
            .filter_map(|(_, fields)| fields.into_iter().next())
            .filter(|uid| !uid.is_empty())
            .collect())
    }

    async fn insert(&self, uid: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        append_line(&self.path, &encode_record(&[uid])).await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn malformed(path: &Path, line: usize, reason: String) -> StoreError {
    StoreError::Malformed {
        path: path.display().to_string(),
        line,
        reason,
    }
}

/// Create `path` containing only `header` unless it already exists.
async fn ensure_file(path: &Path, header: &[&str]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(parent, e))?;
    }

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(mut file) => {
            file.write_all(encode_record(header).as_bytes())
                .await
                .map_err(|e| io_error(path, e))?;
            file.sync_all().await.map_err(|e| io_error(path, e))?;
            debug!(path = %path.display(), "Created store file");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Append one encoded record. A tail left without its terminator by an
/// interrupted write is closed off first, so the new record never joins it.
async fn append_line(path: &Path, line: &str) -> Result<(), StoreError> {
    let mut file = OpenOptions::new()
        .read(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| io_error(path, e))?;

    let len = file.metadata().await.map_err(|e| io_error(path, e))?.len();
    let torn = if len == 0 {
        false
    } else {
        file.seek(SeekFrom::End(-1))
            .await
            .map_err(|e| io_error(path, e))?;
        file.read_u8().await.map_err(|e| io_error(path, e))? != b'\n'
    };

    let mut buf = String::with_capacity(line.len() + 2);
    if torn {
        warn!(path = %path.display(), "Store file ended mid-record; terminating it");
        buf.push_str("\r\n");
    }
    buf.push_str(line);

    file.write_all(buf.as_bytes())
        .await
        .map_err(|e| io_error(path, e))?;
    file.sync_data().await.map_err(|e| io_error(path, e))
}

/// Data rows (header skipped) with the physical line each one starts on.
async fn read_rows(path: &Path) -> Result<Vec<(usize, Vec<String>)>, StoreError> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| io_error(path, e))?;
    let records =
        parse_records(&text).map_err(|failure| malformed(path, failure.line, failure.reason))?;
    Ok(records.into_iter().skip(1).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::Direction;

    fn entry(n: usize) -> LedgerEntry {
        LedgerEntry::new(
            Direction::Outbound,
            "ABCDEFABCDEF",
            "alice@example.com",
            format!("Subject, number {n}"),
        )
        .with_variant("A")
        .with_status("sg:202")
        .with_note("sent")
    }

    #[tokio::test]
    async fn ledger_created_with_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/mails_log.csv");
        let ledger = CsvLedger::open(&path).await.unwrap();

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "ts,direction,thread_id,to,subject,variant,status,note\r\n");
        assert!(ledger.entries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reopen_keeps_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mails_log.csv");
        CsvLedger::open(&path).await.unwrap().append(&entry(1)).await.unwrap();

        let reopened = CsvLedger::open(&path).await.unwrap();
        assert_eq!(reopened.entries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn ledger_is_append_only() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::open(dir.path().join("mails_log.csv")).await.unwrap();

        let mut written = Vec::new();
        for n in 0..5 {
            let before = std::fs::read(ledger.path()).unwrap();
            let e = entry(n);
            ledger.append(&e).await.unwrap();
            written.push(e);
            let after = std::fs::read(ledger.path()).unwrap();

            assert!(after.len() > before.len());
            assert_eq!(&after[..before.len()], &before[..]);
        }

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text.lines().count(), 1 + written.len());
        assert_eq!(ledger.entries().await.unwrap(), written);
    }

    #[tokio::test]
    async fn ledger_preserves_awkward_fields() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::open(dir.path().join("mails_log.csv")).await.unwrap();
        let e = entry(0).with_note("TransportError(\"boom\"),\nsecond line");
        ledger.append(&e).await.unwrap();
        assert_eq!(ledger.entries().await.unwrap(), vec![e]);
    }

    #[tokio::test]
    async fn ledger_reports_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mails_log.csv");
        let ledger = CsvLedger::open(&path).await.unwrap();
        append_line(&path, "not-a-timestamp,outbound\r\n").await.unwrap();

        let err = ledger.entries().await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 2, .. }));
    }

    #[tokio::test]
    async fn malformed_row_reports_physical_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mails_log.csv");
        let ledger = CsvLedger::open(&path).await.unwrap();
        ledger
            .append(&entry(0).with_note("first\nsecond\nthird"))
            .await
            .unwrap();
        append_line(&path, "garbage\r\n").await.unwrap();

        let err = ledger.entries().await.unwrap_err();
        assert!(matches!(err, StoreError::Malformed { line: 5, .. }));
    }

    #[tokio::test]
    async fn insert_after_torn_tail_starts_new_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbound_seen.csv");
        let set = CsvProcessedSet::open(&path).await.unwrap();
        set.insert("101").await.unwrap();

        // Interrupted write: record bytes landed, terminator did not.
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut raw, b"102").unwrap();
        drop(raw);

        set.insert("103").await.unwrap();
        let loaded = set.load().await.unwrap();
        assert_eq!(
            loaded,
            HashSet::from(["101".to_string(), "102".to_string(), "103".to_string()])
        );
    }

    #[tokio::test]
    async fn ledger_append_after_torn_tail_stays_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mails_log.csv");
        let ledger = CsvLedger::open(&path).await.unwrap();

        let first = entry(1);
        let unterminated = encode_record(&first.to_fields());
        let unterminated = unterminated.trim_end_matches("\r\n");
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        std::io::Write::write_all(&mut raw, unterminated.as_bytes()).unwrap();
        drop(raw);

        let second = entry(2);
        ledger.append(&second).await.unwrap();
        assert_eq!(ledger.entries().await.unwrap(), vec![first, second]);
    }

    #[tokio::test]
    async fn processed_set_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbound_seen.csv");
        let set = CsvProcessedSet::open(&path).await.unwrap();
        assert!(set.load().await.unwrap().is_empty());

        set.insert("101").await.unwrap();
        set.insert("102").await.unwrap();
        set.insert("101").await.unwrap();

        let reopened = CsvProcessedSet::open(&path).await.unwrap();
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("101") && loaded.contains("102"));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("msg_uid\r\n"));
    }
}
