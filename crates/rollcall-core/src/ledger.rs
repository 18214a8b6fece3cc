//! Attendance ledger: at most one `Name, Date, Time` row per person per day.
//!
//! The CSV store is read in full, checked, and rewritten in full on every new
//! record. The rewrite goes through a sibling temp file that is renamed over
//! the store. There is no inter-process locking; one process per store.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ledger CSV on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// One row of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(rename = "Name")]
    pub name: String,
    /// Serialized as `YYYY-MM-DD`.
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Serialized as `HH:MM:SS`.
    #[serde(rename = "Time")]
    pub time: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    Recorded(AttendanceRecord),
    AlreadyMarked,
}

/// Something that credits a person's attendance.
pub trait Ledger {
    fn mark(&mut self, name: &str) -> Result<MarkOutcome, LedgerError>;
}

/// CSV-file ledger.
#[derive(Debug, Clone)]
pub struct CsvLedger {
    path: PathBuf,
}

impl CsvLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All records; a missing or empty file is an empty store.
    pub fn records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_err(source)),
        };

        csv::Reader::from_reader(file)
            .deserialize()
            .collect::<Result<Vec<AttendanceRecord>, _>>()
            .map_err(|source| self.csv_err(source))
    }

    /// Records of a single day, in store order.
    pub fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut records = self.records()?;
        records.retain(|r| r.date == date);
        Ok(records)
    }

    /// Mark `name` as present at `now`, unless already marked on that date.
    pub fn mark_at(&self, name: &str, now: NaiveDateTime) -> Result<MarkOutcome, LedgerError> {
        let mut records = self.records()?;
        let date = now.date();

        if records.iter().any(|r| r.name == name && r.date == date) {
            tracing::info!(name, %date, "attendance already marked today");
            return Ok(MarkOutcome::AlreadyMarked);
        }

        let time = now.time().with_nanosecond(0).unwrap_or_else(|| now.time());
        let record = AttendanceRecord {
            name: name.to_string(),
            date,
            time,
        };
        records.push(record.clone());
        self.write_all(&records)?;

        tracing::info!(name, %date, %time, path = %self.path.display(), "attendance marked");
        Ok(MarkOutcome::Recorded(record))
    }

    fn write_all(&self, records: &[AttendanceRecord]) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| self.io_err(e))?;

        // The temp file is created owner-only; give it the store's mode.
        let permissions = match fs::metadata(&self.path) {
            Ok(meta) => Some(meta.permissions()),
            Err(_) => new_store_permissions(),
        };
        if let Some(permissions) = permissions {
            tmp.as_file()
                .set_permissions(permissions)
                .map_err(|e| self.io_err(e))?;
        }

        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());
            for record in records {
                writer.serialize(record).map_err(|e| self.csv_err(e))?;
            }
            writer.flush().map_err(|e| self.io_err(e))?;
        }

        tmp.persist(&self.path).map_err(|e| self.io_err(e.error))?;
        Ok(())
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> LedgerError {
        LedgerError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

/// Mode of a store created by the first mark.
#[cfg(unix)]
const NEW_STORE_MODE: u32 = 0o644;

#[cfg(unix)]
fn new_store_permissions() -> Option<fs::Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(fs::Permissions::from_mode(NEW_STORE_MODE))
}

#[cfg(not(unix))]
fn new_store_permissions() -> Option<fs::Permissions> {
    None
}

impl Ledger for CsvLedger {
    fn mark(&mut self, name: &str) -> Result<MarkOutcome, LedgerError> {
        self.mark_at(name, Local::now().naive_local())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            NaiveTime::parse_from_str(time, "%H:%M:%S%.f").unwrap(),
        )
    }

    #[test]
    fn test_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("attendance.csv"));
        assert!(ledger.records().unwrap().is_empty());
    }

    #[test]
    fn test_empty_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        fs::write(&path, "").unwrap();
        assert!(CsvLedger::new(&path).records().unwrap().is_empty());
    }

    #[test]
    fn test_mark_is_idempotent_per_day() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("attendance.csv"));

        let first = ledger.mark_at("ALICE", at("2024-03-01", "09:00:00")).unwrap();
        let second = ledger.mark_at("ALICE", at("2024-03-01", "17:30:00")).unwrap();

        assert!(matches!(first, MarkOutcome::Recorded(_)));
        assert_eq!(second, MarkOutcome::AlreadyMarked);
        assert_eq!(ledger.records().unwrap().len(), 1);
    }

    #[test]
    fn test_new_day_appends() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = CsvLedger::new(dir.path().join("attendance.csv"));

        ledger.mark_at("ALICE", at("2024-03-01", "09:00:00")).unwrap();
        ledger.mark_at("BOB", at("2024-03-01", "09:05:00")).unwrap();
        ledger.mark_at("ALICE", at("2024-03-02", "08:59:59")).unwrap();

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 3);
        let day_one = ledger
            .records_on(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .unwrap();
        assert_eq!(
            day_one.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["ALICE", "BOB"]
        );
    }

    #[test]
    fn test_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        let ledger = CsvLedger::new(&path);

        ledger.mark_at("ALICE", at("2024-03-01", "09:07:05.123456")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Name,Date,Time\nALICE,2024-03-01,09:07:05\n");
    }

    #[test]
    fn test_reads_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        fs::write(&path, "Name,Date,Time\nBOB,2024-03-01,10:00:00\n").unwrap();
        let ledger = CsvLedger::new(&path);

        assert_eq!(
            ledger.mark_at("BOB", at("2024-03-01", "11:00:00")).unwrap(),
            MarkOutcome::AlreadyMarked
        );
        assert!(matches!(
            ledger.mark_at("ALICE", at("2024-03-01", "11:00:00")).unwrap(),
            MarkOutcome::Recorded(_)
        ));
        assert_eq!(ledger.records().unwrap().len(), 2);
    }

    #[test]
    fn test_mark_uses_wall_clock() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = CsvLedger::new(dir.path().join("attendance.csv"));

        let outcome = ledger.mark("CAROL").unwrap();
        let MarkOutcome::Recorded(record) = outcome else {
            panic!("first mark must record");
        };
        assert_eq!(record.date, Local::now().date_naive());
        assert_eq!(ledger.mark("CAROL").unwrap(), MarkOutcome::AlreadyMarked);
    }

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).unwrap().permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_store_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        fs::write(&path, "Name,Date,Time\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let ledger = CsvLedger::new(&path);
        ledger.mark_at("ALICE", at("2024-03-01", "09:00:00")).unwrap();
        ledger.mark_at("BOB", at("2024-03-01", "09:01:00")).unwrap();

        assert_eq!(mode(&path), 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_store_is_world_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");

        CsvLedger::new(&path)
            .mark_at("ALICE", at("2024-03-01", "09:00:00"))
            .unwrap();

        assert_eq!(mode(&path), 0o644);
    }

    #[test]
    fn test_corrupt_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.csv");
        fs::write(&path, "Name,Date,Time\nBOB,not-a-date,10:00:00\n").unwrap();
        assert!(matches!(
            CsvLedger::new(&path).records(),
            Err(LedgerError::Csv { .. })
        ));
    }
}
