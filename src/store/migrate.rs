//! Migration manager — versioned schema evolution and bulk import
//!
//! Migrations are ordered, versioned steps recorded in the
//! `schema_migrations` table. Applying the full set is idempotent: a step
//! whose version is already recorded is skipped, provided its checksum still
//! matches what was applied. A checksum that drifted means the migration text
//! was edited after the fact, which is reported as an error instead of being
//! silently re-run.
//!
//! Each step runs in its own transaction. A failing step rolls back alone;
//! the steps committed before it stay committed.

use crate::store::error::{StoreError, StoreResult};
use crate::store::query::{QueryBuilder, Table};
use crate::store::records::{CandleRecord, MetricRecord, Side, TradeRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;

/// One versioned schema change
#[derive(Debug, Clone)]
pub struct Migration {
    /// Ordering key, unique across the set
    pub version: u32,
    /// Human-readable name recorded in the metadata table
    pub name: String,
    /// SQL batch executed inside the step's transaction
    pub sql: String,
}

impl Migration {
    pub fn new(version: u32, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            sql: sql.into(),
        }
    }

    /// CRC32 of the SQL text, recorded at apply time
    pub fn checksum(&self) -> u32 {
        crc32fast::hash(self.sql.as_bytes())
    }
}

/// What `apply` did with one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped,
}

/// Applies versioned migrations and records them in `schema_migrations`
pub struct MigrationManager;

impl MigrationManager {
    /// Migrations shipped with this build, ascending by version
    pub fn builtin_migrations() -> Vec<Migration> {
        vec![Migration::new(
            1,
            "events severity index",
            "CREATE INDEX IF NOT EXISTS idx_events_severity ON events(severity, timestamp DESC);",
        )]
    }

    /// Versions already recorded in the store
    pub fn applied_versions(conn: &Connection) -> StoreResult<Vec<u32>> {
        let mut stmt =
            conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
        let versions = stmt
            .query_map([], |row| row.get::<_, u32>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    /// Apply one step: run its SQL and record it, or skip if already recorded
    pub fn apply(conn: &mut Connection, migration: &Migration) -> StoreResult<Outcome> {
        let recorded: Option<u32> = conn
            .query_row(
                "SELECT checksum FROM schema_migrations WHERE version = ?",
                params![migration.version],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        if let Some(recorded) = recorded {
            if recorded != migration.checksum() {
                return Err(StoreError::Migration {
                    name: migration.name.clone(),
                    reason: format!(
                        "version {} was applied with a different checksum; \
                         migration text must not change after release",
                        migration.version
                    ),
                });
            }
            tracing::debug!(
                version = migration.version,
                name = %migration.name,
                "migration already applied, skipping"
            );
            return Ok(Outcome::Skipped);
        }

        let tx = conn.transaction()?;
        tx.execute_batch(&migration.sql)
            .map_err(|e| StoreError::Migration {
                name: migration.name.clone(),
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, checksum, applied_at) \
             VALUES (?, ?, ?, ?)",
            params![
                migration.version,
                migration.name,
                migration.checksum(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            version = migration.version,
            name = %migration.name,
            "migration applied"
        );
        Ok(Outcome::Applied)
    }

    /// Apply a full set in ascending version order
    ///
    /// Returns the number of steps actually applied (skips excluded).
    pub fn apply_all(conn: &mut Connection, migrations: &[Migration]) -> StoreResult<usize> {
        let mut sorted: Vec<&Migration> = migrations.iter().collect();
        sorted.sort_by_key(|m| m.version);

        for pair in sorted.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(StoreError::Migration {
                    name: pair[1].name.clone(),
                    reason: format!("duplicate migration version {}", pair[1].version),
                });
            }
        }

        let mut applied = 0;
        for migration in sorted {
            if Self::apply(conn, migration)? == Outcome::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }
}

// ==================== Bulk import ====================

/// Import rows from a CSV file into one data table
///
/// Rows are inserted in chunks of `batch_size`, one transaction per chunk. A
/// malformed row fails its whole chunk and rolls the chunk back; chunks
/// committed before it stay committed. Returns the number of rows inserted.
///
/// The header row drives column mapping; required columns depend on the
/// target table (metrics: timestamp, metric_name, value; candles: timestamp,
/// symbol, open, high, low, close, volume; trades: timestamp, symbol, side,
/// price, quantity).
pub fn import_csv(
    conn: &mut Connection,
    path: &Path,
    table: Table,
    batch_size: usize,
) -> StoreResult<u64> {
    if batch_size == 0 {
        return Err(StoreError::Import("batch size must be positive".into()));
    }
    if table == Table::Events {
        return Err(StoreError::Import(
            "events are not an import target; use log_event".into(),
        ));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let columns = ColumnMap::from_headers(&headers, table)?;

    let mut total: u64 = 0;
    let mut chunk: Vec<csv::StringRecord> = Vec::with_capacity(batch_size);

    for (line, result) in reader.records().enumerate() {
        let row = result.map_err(|e| StoreError::Import(format!("line {}: {}", line + 2, e)))?;
        chunk.push(row);

        if chunk.len() == batch_size {
            total += insert_chunk(conn, &chunk, &columns, table)?;
            chunk.clear();
        }
    }

    if !chunk.is_empty() {
        total += insert_chunk(conn, &chunk, &columns, table)?;
    }

    tracing::info!(table = %table, rows = total, path = %path.display(), "bulk import complete");
    Ok(total)
}

fn insert_chunk(
    conn: &mut Connection,
    chunk: &[csv::StringRecord],
    columns: &ColumnMap,
    table: Table,
) -> StoreResult<u64> {
    let tx = conn.transaction()?;

    for row in chunk {
        let stmt = match table {
            Table::Metrics => QueryBuilder::insert_metric(&columns.metric(row)?)?,
            Table::Candles => QueryBuilder::insert_candle(&columns.candle(row)?)?,
            Table::Trades => QueryBuilder::insert_trade(&columns.trade(row)?)?,
            Table::Events => unreachable!("rejected before reading the file"),
        };
        tx.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
    }

    tx.commit()?;
    Ok(chunk.len() as u64)
}

/// Header-name to column-index mapping for one import target
struct ColumnMap {
    indices: std::collections::HashMap<String, usize>,
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, table: Table) -> StoreResult<Self> {
        let indices = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.to_lowercase(), i))
            .collect::<std::collections::HashMap<_, _>>();

        let required: &[&str] = match table {
            Table::Metrics => &["timestamp", "metric_name", "value"],
            Table::Candles => &[
                "timestamp", "symbol", "open", "high", "low", "close", "volume",
            ],
            Table::Trades => &["timestamp", "symbol", "side", "price", "quantity"],
            Table::Events => &[],
        };

        for name in required {
            if !indices.contains_key(*name) {
                return Err(StoreError::Import(format!(
                    "missing required column '{}' for table '{}'",
                    name, table
                )));
            }
        }

        Ok(Self { indices })
    }

    fn field<'a>(&self, row: &'a csv::StringRecord, name: &str) -> StoreResult<&'a str> {
        self.indices
            .get(name)
            .and_then(|i| row.get(*i))
            .ok_or_else(|| StoreError::Import(format!("row is missing field '{}'", name)))
    }

    fn optional<'a>(&self, row: &'a csv::StringRecord, name: &str) -> Option<&'a str> {
        self.indices
            .get(name)
            .and_then(|i| row.get(*i))
            .filter(|s| !s.is_empty())
    }

    fn timestamp(&self, row: &csv::StringRecord) -> StoreResult<i64> {
        parse_timestamp(self.field(row, "timestamp")?)
    }

    fn number(&self, row: &csv::StringRecord, name: &str) -> StoreResult<f64> {
        let raw = self.field(row, name)?;
        raw.parse::<f64>()
            .map_err(|_| StoreError::Import(format!("field '{}' is not a number: '{}'", name, raw)))
    }

    fn integer(&self, row: &csv::StringRecord, name: &str) -> StoreResult<i64> {
        let raw = self.field(row, name)?;
        raw.parse::<i64>()
            .map_err(|_| StoreError::Import(format!("field '{}' is not an integer: '{}'", name, raw)))
    }

    fn metric(&self, row: &csv::StringRecord) -> StoreResult<MetricRecord> {
        let mut record = MetricRecord::new(self.field(row, "metric_name")?, self.number(row, "value")?)
            .with_timestamp(self.timestamp(row)?);
        if let Some(symbol) = self.optional(row, "symbol") {
            record = record.with_symbol(symbol);
        }
        Ok(record)
    }

    fn candle(&self, row: &csv::StringRecord) -> StoreResult<CandleRecord> {
        let mut record = CandleRecord::new(
            self.timestamp(row)?,
            self.field(row, "symbol")?,
            self.number(row, "open")?,
            self.number(row, "high")?,
            self.number(row, "low")?,
            self.number(row, "close")?,
            self.integer(row, "volume")?,
        );
        if let Some(count) = self.optional(row, "trade_count") {
            let count = count.parse::<i64>().map_err(|_| {
                StoreError::Import(format!("field 'trade_count' is not an integer: '{}'", count))
            })?;
            record = record.with_trade_count(count);
        }
        Ok(record)
    }

    fn trade(&self, row: &csv::StringRecord) -> StoreResult<TradeRecord> {
        let side_raw = self.field(row, "side")?;
        let side = Side::parse(side_raw)
            .ok_or_else(|| StoreError::Import(format!("unknown trade side '{}'", side_raw)))?;

        let mut record = TradeRecord::new(
            self.field(row, "symbol")?,
            side,
            self.number(row, "price")?,
            self.number(row, "quantity")?,
        )
        .with_timestamp(self.timestamp(row)?);

        if let Some(order_id) = self.optional(row, "order_id") {
            record = record.with_order_id(order_id);
        }
        if let Some(fee) = self.optional(row, "fee") {
            let fee = fee
                .parse::<f64>()
                .map_err(|_| StoreError::Import(format!("field 'fee' is not a number: '{}'", fee)))?;
            record = record.with_fee(fee);
        }
        Ok(record)
    }
}

/// Parse a timestamp field: Unix milliseconds, or a handful of common
/// date/datetime formats
fn parse_timestamp(raw: &str) -> StoreResult<i64> {
    if let Ok(millis) = raw.parse::<i64>() {
        return Ok(millis);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }

    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp_millis());
        }
    }

    Err(StoreError::Import(format!(
        "could not parse timestamp: '{}'",
        raw
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SchemaManager;
    use std::io::Write;
    use tempfile::tempdir;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaManager::create_all(&conn).unwrap();
        conn
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })
        .unwrap()
    }

    #[test]
    fn test_apply_records_metadata() {
        let mut conn = test_conn();
        let m = Migration::new(1, "noop", "SELECT 1;");

        assert_eq!(MigrationManager::apply(&mut conn, &m).unwrap(), Outcome::Applied);
        assert_eq!(MigrationManager::applied_versions(&conn).unwrap(), vec![1]);
    }

    #[test]
    fn test_reapply_is_idempotent() {
        let mut conn = test_conn();
        let migrations = MigrationManager::builtin_migrations();

        assert_eq!(
            MigrationManager::apply_all(&mut conn, &migrations).unwrap(),
            migrations.len()
        );
        // Second run applies nothing and leaves exactly one row per version
        assert_eq!(MigrationManager::apply_all(&mut conn, &migrations).unwrap(), 0);
        assert_eq!(
            count(&conn, "schema_migrations"),
            migrations.len() as i64
        );
    }

    #[test]
    fn test_checksum_drift_is_an_error() {
        let mut conn = test_conn();
        MigrationManager::apply(&mut conn, &Migration::new(1, "step", "SELECT 1;")).unwrap();

        let edited = Migration::new(1, "step", "SELECT 2;");
        let err = MigrationManager::apply(&mut conn, &edited).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let mut conn = test_conn();
        let migrations = vec![
            Migration::new(1, "a", "SELECT 1;"),
            Migration::new(1, "b", "SELECT 1;"),
        ];
        assert!(MigrationManager::apply_all(&mut conn, &migrations).is_err());
    }

    #[test]
    fn test_failed_step_rolls_back_alone() {
        let mut conn = test_conn();
        let migrations = vec![
            Migration::new(1, "good", "CREATE TABLE extra (x INTEGER);"),
            Migration::new(2, "bad", "CREATE TABLE broken (x NOSUCHTYPE MALFORMED ((;"),
        ];

        let err = MigrationManager::apply_all(&mut conn, &migrations).unwrap_err();
        assert!(matches!(err, StoreError::Migration { .. }));

        // Step 1 stays committed, step 2 left no metadata
        assert_eq!(MigrationManager::applied_versions(&conn).unwrap(), vec![1]);
        assert_eq!(count(&conn, "extra"), 0);
    }

    #[test]
    fn test_csv_import_metrics() {
        let mut conn = test_conn();
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "timestamp,metric_name,value,symbol").unwrap();
        for i in 0..10 {
            writeln!(file, "{},price,{}.0,BTC/USD", i * 1000, 100 + i).unwrap();
        }
        drop(file);

        let imported = import_csv(&mut conn, &path, Table::Metrics, 4).unwrap();
        assert_eq!(imported, 10);
        assert_eq!(count(&conn, "metrics"), 10);
    }

    #[test]
    fn test_csv_import_trades_with_optional_fields() {
        let mut conn = test_conn();
        let dir = tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        std::fs::write(
            &path,
            "timestamp,symbol,side,price,quantity,order_id,fee\n\
             1000,BTC/USD,buy,50000.0,0.5,ord-1,2.5\n\
             2000,BTC/USD,sell,50100.0,0.5,,\n",
        )
        .unwrap();

        assert_eq!(import_csv(&mut conn, &path, Table::Trades, 100).unwrap(), 2);
        let fee: Option<f64> = conn
            .query_row(
                "SELECT fee FROM trades WHERE timestamp = 2000",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(fee.is_none());
    }

    #[test]
    fn test_csv_failed_chunk_rolls_back_whole_chunk() {
        let mut conn = test_conn();
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.csv");

        // 5 rows, batch size 3: first chunk clean, second chunk has a bad value
        std::fs::write(
            &path,
            "timestamp,metric_name,value\n\
             1000,price,1.0\n\
             2000,price,2.0\n\
             3000,price,3.0\n\
             4000,price,4.0\n\
             5000,price,not_a_number\n",
        )
        .unwrap();

        let err = import_csv(&mut conn, &path, Table::Metrics, 3).unwrap_err();
        assert!(matches!(err, StoreError::Import(_)));

        // First chunk committed, second rolled back entirely
        assert_eq!(count(&conn, "metrics"), 3);
    }

    #[test]
    fn test_csv_missing_required_column() {
        let mut conn = test_conn();
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "timestamp,value\n1000,1.0\n").unwrap();

        let err = import_csv(&mut conn, &path, Table::Metrics, 10).unwrap_err();
        assert!(err.to_string().contains("metric_name"));
    }

    #[test]
    fn test_timestamp_formats() {
        assert_eq!(parse_timestamp("1000").unwrap(), 1000);
        assert_eq!(parse_timestamp("1970-01-01 00:00:01").unwrap(), 1000);
        assert_eq!(parse_timestamp("1970-01-02").unwrap(), 86_400_000);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
