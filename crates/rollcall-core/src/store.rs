//! CSV-backed attendance and registration tables.
//!
//! Both tables share the schema `ID,Name,Date,Time`. Every write replaces
//! the whole file through a temporary file in the same directory, so a
//! reader never observes a half-written table. Writers first take a
//! non-blocking exclusive lock on `<table>.lock` and hold it across the whole
//! read-modify-write; the lock lives beside the table because the table's
//! inode changes on every write. If another process holds the lock, or the
//! table cannot be opened for writing, the write is refused as busy.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

const HEADER: [&str; 4] = ["ID", "Name", "Date", "Time"];

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} is busy; close it in any other program and try again")]
    Busy(PathBuf),
    #[error("{0} has not been created yet")]
    Missing(PathBuf),
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("replace table: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// One row of the attendance or registration table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Time", with = "hms")]
    pub time: NaiveTime,
}

impl AttendanceRow {
    pub fn new(id: impl Into<String>, name: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            date: at.date(),
            time: truncate_to_seconds(at.time()),
        }
    }
}

fn truncate_to_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// `HH:MM:SS` (24-hour) serde format for the `Time` column.
mod hms {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M:%S";

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&time.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Result of [`AttendanceStore::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// A row for this id and date already existed; nothing was written.
    AlreadyPresent,
}

/// Attendance table: at most one row per id per day.
#[derive(Debug, Clone)]
pub struct AttendanceStore {
    path: PathBuf,
}

impl AttendanceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the table with only its header if it does not exist yet.
    pub fn ensure_initialized(&self) -> Result<(), StoreError> {
        ensure_table(&self.path)
    }

    pub fn has_entry_today(&self, id: &str, date: NaiveDate) -> Result<bool, StoreError> {
        Ok(contains(&self.rows()?, id, date))
    }

    /// Add a row for `id` on `date` unless one is already recorded.
    pub fn append(
        &self,
        id: &str,
        name: &str,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<AppendOutcome, StoreError> {
        let _lock = TableLock::acquire(&self.path)?;
        create_if_missing(&self.path)?;

        let mut rows = read_rows(&open_for_write(&self.path)?)?;
        if contains(&rows, id, date) {
            return Ok(AppendOutcome::AlreadyPresent);
        }
        rows.push(AttendanceRow {
            id: id.to_string(),
            name: name.to_string(),
            date,
            time: truncate_to_seconds(time),
        });
        write_table(&self.path, &rows)?;
        Ok(AppendOutcome::Written)
    }

    /// All rows in file order. A table that does not exist yet is empty.
    pub fn rows(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        match File::open(&self.path) {
            Ok(file) => read_rows(&file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rows recorded on `date`.
    pub fn rows_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRow>, StoreError> {
        let mut rows = self.rows()?;
        rows.retain(|r| r.date == date);
        Ok(rows)
    }

    /// Write the full table to `dest`. Returns the number of rows exported.
    pub fn export_to(&self, dest: &Path) -> Result<usize, StoreError> {
        if !self.path.exists() {
            return Err(StoreError::Missing(self.path.clone()));
        }
        let rows = self.rows()?;
        write_table(dest, &rows)?;
        tracing::info!(dest = %dest.display(), rows = rows.len(), "attendance exported");
        Ok(rows.len())
    }
}

/// Log of completed registrations. Every registration is recorded.
#[derive(Debug, Clone)]
pub struct RegistrationLog {
    path: PathBuf,
}

impl RegistrationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, row: AttendanceRow) -> Result<(), StoreError> {
        let _lock = TableLock::acquire(&self.path)?;
        create_if_missing(&self.path)?;
        let mut rows = read_rows(&open_for_write(&self.path)?)?;
        rows.push(row);
        write_table(&self.path, &rows)
    }

    pub fn rows(&self) -> Result<Vec<AttendanceRow>, StoreError> {
        match File::open(&self.path) {
            Ok(file) => read_rows(&file),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

fn contains(rows: &[AttendanceRow], id: &str, date: NaiveDate) -> bool {
    rows.iter().any(|r| r.id == id && r.date == date)
}

fn ensure_table(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    let _lock = TableLock::acquire(path)?;
    create_if_missing(path)
}

/// Caller holds the table lock.
fn create_if_missing(path: &Path) -> Result<(), StoreError> {
    if path.exists() {
        return Ok(());
    }
    write_table(path, &[])?;
    tracing::info!(path = %path.display(), "created table");
    Ok(())
}

pub(crate) fn lock_path_for(table: &Path) -> PathBuf {
    let mut name = table.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive writer lock on a table's `.lock` file. Released on drop.
struct TableLock {
    _file: File,
}

impl TableLock {
    fn acquire(table: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = table.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path_for(table))
            .map_err(|e| busy_or_io(e, table))?;

        if let Err(e) = file.try_lock_exclusive() {
            let contended = e.kind() == io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            return Err(if contended {
                StoreError::Busy(table.to_path_buf())
            } else {
                StoreError::Io(e)
            });
        }
        Ok(Self { _file: file })
    }
}

/// Open the table itself read-write, so a table another program has made
/// unwritable is reported before any work is done.
fn open_for_write(path: &Path) -> Result<File, StoreError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| busy_or_io(e, path))
}

fn busy_or_io(e: io::Error, table: &Path) -> StoreError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => StoreError::Busy(table.to_path_buf()),
        _ => StoreError::Io(e),
    }
}

fn read_rows(file: &File) -> Result<Vec<AttendanceRow>, StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut rows = Vec::new();
    for row in reader.deserialize::<AttendanceRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Replace the table at `path` with `rows`, atomically.
fn write_table(path: &Path, rows: &[AttendanceRow]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| match e.error.kind() {
        io::ErrorKind::PermissionDenied => StoreError::Busy(path.to_path_buf()),
        _ => StoreError::Persist(e),
    })?;
    Ok(())
}
