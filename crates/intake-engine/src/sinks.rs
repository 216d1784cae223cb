//! In-memory and file-backed collaborator implementations.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions, create_dir_all, remove_file};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audit::AuditRecord;
use crate::model::WarehouseRow;
use crate::ports::{AuditError, AuditSink, LoadError, LoadId, WarehouseLoader};

/// Loader keeping every loaded row in memory, per table.
#[derive(Debug, Default)]
pub struct InMemoryWarehouse {
    tables: Mutex<BTreeMap<String, Vec<WarehouseRow>>>,
    staged: Mutex<BTreeMap<(LoadId, String), Vec<WarehouseRow>>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self, table: &str) -> Vec<WarehouseRow> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Loads staged but neither committed nor aborted.
    pub fn pending_loads(&self) -> usize {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn take_staged(&self, load: LoadId, table: &str) -> Vec<WarehouseRow> {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&(load, table.to_string()))
            .unwrap_or_default()
    }
}

impl WarehouseLoader for InMemoryWarehouse {
    fn stage(&self, load: LoadId, table: &str, rows: &[WarehouseRow]) -> Result<u64, LoadError> {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry((load, table.to_string()))
            .or_default()
            .extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    fn commit(&self, load: LoadId, table: &str) -> Result<u64, LoadError> {
        let rows = self.take_staged(load, table);
        let count = rows.len() as u64;
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(table.to_string())
            .or_default()
            .extend(rows);
        Ok(count)
    }

    fn abort(&self, load: LoadId, table: &str) -> Result<(), LoadError> {
        self.take_staged(load, table);
        Ok(())
    }
}

/// Loader appending rows to `<dir>/<table>.csv`.
///
/// Staged rows go to `<dir>/<table>.<load>.staged.csv` and are appended to
/// the table file on commit. Columns follow the order registered for the
/// table, or the sorted field names of the first staged row. The header is
/// written once per table file and `bytes_written` counts committed bytes.
#[derive(Debug)]
pub struct CsvFileLoader {
    dir: PathBuf,
    columns: Mutex<BTreeMap<String, Vec<String>>>,
    staged: Mutex<BTreeMap<(LoadId, String), u64>>,
    bytes_written: AtomicU64,
}

impl CsvFileLoader {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            columns: Mutex::new(BTreeMap::new()),
            staged: Mutex::new(BTreeMap::new()),
            bytes_written: AtomicU64::new(0),
        }
    }

    pub fn with_columns(self, table: &str, columns: Vec<String>) -> Self {
        self.columns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(table.to_string(), columns);
        self
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    pub fn staged_path(&self, load: LoadId, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.{load}.staged.csv"))
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn columns_for(&self, table: &str, rows: &[WarehouseRow]) -> Vec<String> {
        self.columns
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(table.to_string())
            .or_insert_with(|| {
                rows.first()
                    .map(|row| row.keys().cloned().collect())
                    .unwrap_or_default()
            })
            .clone()
    }

    fn take_staged(&self, load: LoadId, table: &str) -> u64 {
        self.staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&(load, table.to_string()))
            .unwrap_or(0)
    }

    fn append_staged(
        &self,
        path: &Path,
        columns: &[String],
        rows: &[WarehouseRow],
    ) -> Result<(), csv::Error> {
        create_dir_all(&self.dir)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(BufWriter::new(file));

        for row in rows {
            let record: Vec<String> = columns
                .iter()
                .map(|column| row.get(column).map(|value| value.to_csv()).unwrap_or_default())
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Append a staged file to the table file, returning the bytes written.
    fn publish(&self, table: &str, staged: &Path) -> Result<u64, csv::Error> {
        let columns = self.columns_for(table, &[]);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.table_path(table))?;
        let needs_header = file.metadata()?.len() == 0;

        let mut counting = CountingWriter::new(BufWriter::new(file));
        if needs_header {
            let mut header = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(&mut counting);
            header.write_record(&columns)?;
            header.flush()?;
        }
        io::copy(&mut File::open(staged)?, &mut counting)?;
        counting.flush()?;
        remove_file(staged)?;
        Ok(counting.bytes_written())
    }

    fn discard(&self, staged: &Path) -> io::Result<()> {
        match remove_file(staged) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

fn load_error(table: &str, err: csv::Error) -> LoadError {
    LoadError {
        table: table.to_string(),
        message: err.to_string(),
        retryable: err.is_io_error(),
    }
}

impl WarehouseLoader for CsvFileLoader {
    fn stage(&self, load: LoadId, table: &str, rows: &[WarehouseRow]) -> Result<u64, LoadError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let columns = self.columns_for(table, rows);
        self.append_staged(&self.staged_path(load, table), &columns, rows)
            .map_err(|err| load_error(table, err))?;
        *self
            .staged
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry((load, table.to_string()))
            .or_default() += rows.len() as u64;
        Ok(rows.len() as u64)
    }

    fn commit(&self, load: LoadId, table: &str) -> Result<u64, LoadError> {
        let rows = self.take_staged(load, table);
        if rows == 0 {
            return Ok(0);
        }
        let bytes = self
            .publish(table, &self.staged_path(load, table))
            .map_err(|err| load_error(table, err))?;
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
        Ok(rows)
    }

    fn abort(&self, load: LoadId, table: &str) -> Result<(), LoadError> {
        self.take_staged(load, table);
        self.discard(&self.staged_path(load, table))
            .map_err(|err| load_error(table, err.into()))
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Audit sink collecting records in memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record.clone());
        Ok(())
    }
}

/// Audit sink appending one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesAuditSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.append(record)
            .map_err(|err| AuditError(format!("{}: {err}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use intake_core::Value;
    use rust_decimal::Decimal;

    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("intake_sinks_{}", uuid::Uuid::new_v4()))
    }

    fn row(id: &str, qty: i64) -> WarehouseRow {
        BTreeMap::from([
            ("transaction_id".to_string(), Value::Text(id.to_string())),
            ("quantity".to_string(), Value::Number(Decimal::from(qty))),
            ("note".to_string(), Value::Null),
        ])
    }

    #[test]
    fn csv_loader_writes_header_once_in_registered_order() {
        let dir = temp_dir();
        let loader = CsvFileLoader::new(&dir).with_columns(
            "sales_reports",
            vec![
                "transaction_id".to_string(),
                "quantity".to_string(),
                "note".to_string(),
            ],
        );

        let load = LoadId::next();
        assert_eq!(loader.stage(load, "sales_reports", &[row("TXN-1", 3)]).expect("stage"), 1);
        assert_eq!(loader.stage(load, "sales_reports", &[row("TXN-2", 4)]).expect("stage"), 1);
        assert!(!loader.table_path("sales_reports").exists());
        assert_eq!(loader.bytes_written(), 0);

        assert_eq!(loader.commit(load, "sales_reports").expect("commit"), 2);
        assert!(!loader.staged_path(load, "sales_reports").exists());
        let next = LoadId::next();
        loader.stage(next, "sales_reports", &[row("TXN-3", 5)]).expect("stage");
        assert_eq!(loader.commit(next, "sales_reports").expect("commit"), 1);

        let written = std::fs::read_to_string(loader.table_path("sales_reports")).expect("read");
        assert_eq!(
            written,
            "transaction_id,quantity,note\nTXN-1,3,\nTXN-2,4,\nTXN-3,5,\n"
        );
        assert_eq!(loader.bytes_written(), written.len() as u64);
    }

    #[test]
    fn aborted_csv_load_leaves_no_trace() {
        let dir = temp_dir();
        let loader = CsvFileLoader::new(&dir);
        let load = LoadId::next();

        loader.stage(load, "sales_reports", &[row("TXN-1", 3)]).expect("stage");
        assert!(loader.staged_path(load, "sales_reports").exists());
        loader.abort(load, "sales_reports").expect("abort");

        assert!(!loader.staged_path(load, "sales_reports").exists());
        assert!(!loader.table_path("sales_reports").exists());
        assert_eq!(loader.commit(load, "sales_reports").expect("commit"), 0);
        assert_eq!(loader.bytes_written(), 0);
    }

    #[test]
    fn in_memory_rows_are_visible_only_after_commit() {
        let warehouse = InMemoryWarehouse::new();
        let kept = LoadId::next();
        let dropped = LoadId::next();

        warehouse.stage(kept, "sales_reports", &[row("TXN-1", 3)]).expect("stage");
        warehouse.stage(dropped, "sales_reports", &[row("TXN-2", 4)]).expect("stage");
        assert!(warehouse.rows("sales_reports").is_empty());
        assert_eq!(warehouse.pending_loads(), 2);

        warehouse.abort(dropped, "sales_reports").expect("abort");
        assert_eq!(warehouse.commit(kept, "sales_reports").expect("commit"), 1);
        assert_eq!(warehouse.rows("sales_reports"), vec![row("TXN-1", 3)]);
        assert_eq!(warehouse.pending_loads(), 0);
    }

    #[test]
    fn json_lines_audit_appends() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).expect("dir");
        let sink = JsonLinesAuditSink::new(&dir.join("audit.ndjson"));
        let record = AuditRecord {
            source_file: "Reports/Sales/day.csv".to_string(),
            table_name: "sales_reports".to_string(),
            record_type: Some(intake_core::RecordType::Sales),
            status: crate::model::FileStatus::Completed,
            total_rows: 2,
            valid_rows: 2,
            invalid_rows: 0,
            validation_errors: "{}".to_string(),
            processed_at: "2024-06-30T00:00:00Z".to_string(),
        };
        sink.record(&record).expect("record");
        sink.record(&record).expect("record");

        let contents = std::fs::read_to_string(sink.path()).expect("read");
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let parsed: AuditRecord = serde_json::from_str(lines[0]).expect("parse");
        assert_eq!(parsed, record);
    }
}
