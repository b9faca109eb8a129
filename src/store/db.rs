//! Database facade — the single entry point callers use
//!
//! Wraps the pool, schema manager, query builder, and migration manager
//! behind one handle. Lifecycle: `open()` then `initialize()`, after which
//! reads and writes may run concurrently from any thread. Every operation
//! before `initialize()` completes fails with `NotInitialized`.
//!
//! Batch inserts are all-or-nothing: every record is validated before the
//! transaction opens, so a malformed record rejects the whole batch and no
//! partial state becomes visible.

use crate::config::StoreConfig;
use crate::store::error::{StoreError, StoreResult};
use crate::store::migrate::{self, Migration, MigrationManager};
use crate::store::pool::{ConnectionPool, PoolConfig, PoolStats};
use crate::store::query::{QueryBuilder, Statement, Table};
use crate::store::records::{
    AggregateFunc, BucketInterval, CandleRecord, MetricRecord, PerformanceSummary, Severity, Side,
    SystemEvent, TradeRecord,
};
use crate::store::schema::SchemaManager;
use rusqlite::params_from_iter;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One aggregated time bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedPoint {
    /// Bucket start, Unix milliseconds, epoch-aligned
    pub bucket: i64,
    /// The reduced value for the bucket
    pub value: f64,
    /// Number of raw samples the bucket covers
    pub samples: u64,
}

/// Per-table row counts plus pool counters
#[derive(Debug, Clone)]
pub struct TableStats {
    pub tables: HashMap<String, u64>,
    pub pool: PoolStats,
}

/// Handle to one embedded store
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Database {
    pool: ConnectionPool,
    migrations: Vec<Migration>,
    import_batch_size: usize,
    initialized: AtomicBool,
}

impl Database {
    /// Open the store file and its connection pool. Does not touch the
    /// schema; call `initialize()` before reading or writing.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let pool = ConnectionPool::open(
            &config.path,
            PoolConfig {
                max_connections: config.max_connections,
                min_idle: config.min_idle,
                acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            },
        )?;

        Ok(Self {
            pool,
            migrations: MigrationManager::builtin_migrations(),
            import_batch_size: config.import_batch_size,
            initialized: AtomicBool::new(false),
        })
    }

    /// Create tables and indexes, verify the schema, and apply pending
    /// migrations. Idempotent; safe to call on every startup.
    pub fn initialize(&self) -> StoreResult<()> {
        let mut conn = self.pool.acquire()?;

        SchemaManager::create_all(&conn)?;
        SchemaManager::verify(&conn)?;
        let applied = MigrationManager::apply_all(&mut conn, &self.migrations)?;

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(
            path = %self.pool.db_path().display(),
            migrations_applied = applied,
            "store initialized"
        );
        Ok(())
    }

    fn ensure_initialized(&self) -> StoreResult<()> {
        if self.initialized.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::NotInitialized)
        }
    }

    // ==================== Writes ====================

    /// Insert one metric record
    pub fn insert_metric(&self, record: &MetricRecord) -> StoreResult<()> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::insert_metric(record)?;
        let conn = self.pool.acquire()?;
        conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(())
    }

    /// Insert a batch of metric records in one transaction
    ///
    /// All-or-nothing: validation runs before the transaction opens, so a
    /// malformed record rejects the entire batch.
    pub fn insert_metrics(&self, records: &[MetricRecord]) -> StoreResult<usize> {
        self.ensure_initialized()?;
        let statements = records
            .iter()
            .map(QueryBuilder::insert_metric)
            .collect::<StoreResult<Vec<_>>>()?;
        self.run_batch(&statements)
    }

    /// Insert one candle record
    pub fn insert_candle(&self, record: &CandleRecord) -> StoreResult<()> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::insert_candle(record)?;
        let conn = self.pool.acquire()?;
        conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(())
    }

    /// Insert a batch of candle records in one transaction
    pub fn insert_candles(&self, records: &[CandleRecord]) -> StoreResult<usize> {
        self.ensure_initialized()?;
        let statements = records
            .iter()
            .map(QueryBuilder::insert_candle)
            .collect::<StoreResult<Vec<_>>>()?;
        self.run_batch(&statements)
    }

    /// Insert one trade record
    pub fn insert_trade(&self, record: &TradeRecord) -> StoreResult<()> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::insert_trade(record)?;
        let conn = self.pool.acquire()?;
        conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(())
    }

    /// Insert a batch of trade records in one transaction
    pub fn insert_trades(&self, records: &[TradeRecord]) -> StoreResult<usize> {
        self.ensure_initialized()?;
        let statements = records
            .iter()
            .map(QueryBuilder::insert_trade)
            .collect::<StoreResult<Vec<_>>>()?;
        self.run_batch(&statements)
    }

    /// Log a system event, returning its store-assigned id
    pub fn log_event(&self, event: &SystemEvent) -> StoreResult<i64> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::insert_event(event)?;
        let conn = self.pool.acquire()?;
        conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    fn run_batch(&self, statements: &[Statement]) -> StoreResult<usize> {
        let mut conn = self.pool.acquire()?;
        let tx = conn.transaction()?;
        for stmt in statements {
            tx.execute(&stmt.sql, params_from_iter(stmt.params.iter()))?;
        }
        tx.commit()?;
        Ok(statements.len())
    }

    // ==================== Reads ====================

    /// Metric records matching the filters, newest first
    pub fn get_metrics(
        &self,
        name: &str,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<MetricRecord>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::select_metrics(name, symbol, since, limit)?;
        let conn = self.pool.acquire()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;

        let rows = prepared.query_map(params_from_iter(stmt.params.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (timestamp, name, value, symbol, labels) = row?;
            let labels = match labels {
                Some(blob) => serde_json::from_str(&blob)?,
                None => HashMap::new(),
            };
            records.push(MetricRecord {
                timestamp,
                name,
                value,
                symbol,
                labels,
            });
        }
        Ok(records)
    }

    /// Metric values reduced into epoch-aligned time buckets, oldest first
    pub fn get_aggregated_metrics(
        &self,
        name: &str,
        interval: BucketInterval,
        since: Option<i64>,
        func: AggregateFunc,
    ) -> StoreResult<Vec<AggregatedPoint>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::aggregate_metrics(name, interval, since, func)?;
        self.run_aggregation(&stmt)
    }

    /// Candles matching the filters, newest first
    pub fn get_candles(
        &self,
        symbol: &str,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<CandleRecord>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::select_candles(symbol, since, limit)?;
        let conn = self.pool.acquire()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;

        let rows = prepared.query_map(params_from_iter(stmt.params.iter()), |row| {
            Ok(CandleRecord {
                timestamp: row.get(0)?,
                symbol: row.get(1)?,
                open: row.get(2)?,
                high: row.get(3)?,
                low: row.get(4)?,
                close: row.get(5)?,
                volume: row.get(6)?,
                trade_count: row.get(7)?,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Candle close prices reduced into epoch-aligned buckets, oldest first
    pub fn get_aggregated_candles(
        &self,
        symbol: &str,
        interval: BucketInterval,
        since: Option<i64>,
        func: AggregateFunc,
    ) -> StoreResult<Vec<AggregatedPoint>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::aggregate_candles(symbol, interval, since, func)?;
        self.run_aggregation(&stmt)
    }

    /// Trades matching the filters, newest first
    pub fn get_trades(
        &self,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<TradeRecord>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::select_trades(symbol, since, limit)?;
        let conn = self.pool.acquire()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;

        let rows = prepared.query_map(params_from_iter(stmt.params.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (timestamp, symbol, side, price, quantity, order_id, fee) = row?;
            let side = Side::parse(&side).ok_or_else(|| {
                StoreError::InvalidRecord(format!("stored trade has unknown side '{}'", side))
            })?;
            records.push(TradeRecord {
                timestamp,
                symbol,
                side,
                price,
                quantity,
                order_id,
                fee,
            });
        }
        Ok(records)
    }

    /// System events matching the filters, newest first
    pub fn get_events(
        &self,
        severity: Option<Severity>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Vec<SystemEvent>> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::select_events(severity, since, limit)?;
        let conn = self.pool.acquire()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;

        let rows = prepared.query_map(params_from_iter(stmt.params.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut events = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, severity, message, details) = row?;
            let severity = Severity::parse(&severity).ok_or_else(|| {
                StoreError::InvalidRecord(format!("stored event has unknown severity '{}'", severity))
            })?;
            let details = match details {
                Some(blob) => Some(serde_json::from_str(&blob)?),
                None => None,
            };
            events.push(SystemEvent {
                id: Some(id),
                timestamp,
                event_type,
                severity,
                message,
                details,
            });
        }
        Ok(events)
    }

    /// Aggregate trade history into a performance summary, computed on demand
    pub fn performance_summary(
        &self,
        symbol: Option<&str>,
        since: Option<i64>,
    ) -> StoreResult<PerformanceSummary> {
        self.ensure_initialized()?;
        let stmt = QueryBuilder::trade_summary(symbol, since);
        let conn = self.pool.acquire()?;

        let row = conn.query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, Option<i64>>(5)?,
                row.get::<_, Option<i64>>(6)?,
            ))
        })?;

        Ok(PerformanceSummary {
            symbol: symbol.map(String::from),
            since,
            trade_count: row.0 as u64,
            buy_count: row.1 as u64,
            sell_count: row.2 as u64,
            total_quantity: row.3,
            total_notional: row.4,
            first_trade: row.5,
            last_trade: row.6,
        })
    }

    fn run_aggregation(&self, stmt: &Statement) -> StoreResult<Vec<AggregatedPoint>> {
        let conn = self.pool.acquire()?;
        let mut prepared = conn.prepare_cached(&stmt.sql)?;

        let rows = prepared.query_map(params_from_iter(stmt.params.iter()), |row| {
            Ok(AggregatedPoint {
                bucket: row.get(0)?,
                value: row.get(1)?,
                samples: row.get::<_, i64>(2)? as u64,
            })
        })?;

        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    // ==================== Maintenance ====================

    /// Row counts per data table plus pool counters
    pub fn get_table_stats(&self) -> StoreResult<TableStats> {
        self.ensure_initialized()?;
        let conn = self.pool.acquire()?;

        let mut tables = HashMap::new();
        for name in SchemaManager::data_tables() {
            // data_tables() is a closed set, never caller input
            let table = Table::parse(name).ok_or_else(|| {
                StoreError::InvalidQuery(format!("unknown data table '{}'", name))
            })?;
            let stmt = QueryBuilder::table_count(table);
            let count: i64 = conn.query_row(&stmt.sql, [], |row| row.get(0))?;
            tables.insert(name.to_string(), count as u64);
        }

        Ok(TableStats {
            tables,
            pool: self.pool.stats(),
        })
    }

    /// Compact and re-plan the store: checkpoint the WAL, refresh planner
    /// statistics, and reclaim free pages
    pub fn optimize(&self) -> StoreResult<()> {
        self.ensure_initialized()?;
        let conn = self.pool.acquire()?;

        conn.execute_batch(
            "
            PRAGMA wal_checkpoint(TRUNCATE);
            ANALYZE;
            VACUUM;
            ",
        )?;

        tracing::info!(path = %self.pool.db_path().display(), "store optimized");
        Ok(())
    }

    /// Bulk-import rows from a CSV file into one data table
    ///
    /// Chunked into per-transaction batches of the configured import batch
    /// size. Returns the number of rows inserted.
    pub fn import_csv(&self, path: &Path, table: Table) -> StoreResult<u64> {
        self.ensure_initialized()?;
        let mut conn = self.pool.acquire()?;
        migrate::import_csv(&mut conn, path, table, self.import_batch_size)
    }

    /// Current pool counters
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Path of the underlying store file
    pub fn path(&self) -> &Path {
        self.pool.db_path()
    }
}
