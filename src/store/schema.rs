//! Schema manager — canonical table layout, creation, and verification
//!
//! Owns the column-level contract of the store:
//!
//! - `metrics`:  timestamp, metric_name, value, symbol?, labels?
//! - `candles`:  timestamp, symbol, open, high, low, close, volume, trade_count?
//! - `trades`:   timestamp, symbol, side, price, quantity, order_id?, fee?
//! - `events`:   id (autoincrement), timestamp, event_type, severity, message, details?
//! - `schema_migrations`: version, name, checksum, applied_at
//!
//! # Index policy
//!
//! Query latency depends on these indexes; they are part of the performance
//! contract, not an implementation detail:
//!
//! - descending-timestamp index on every time-series table ("recent data"
//!   queries scan forward from the newest rows)
//! - composite (metric_name, symbol) on metrics for point filtering
//! - composite (symbol, timestamp DESC) on candles and trades

use crate::store::error::{StoreError, StoreResult};
use rusqlite::Connection;
use std::collections::HashSet;

/// Expected column within a table
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
}

/// Expected table definition
#[derive(Debug, Clone, Copy)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

const fn col(name: &'static str, sql_type: &'static str, not_null: bool) -> ColumnDef {
    ColumnDef {
        name,
        sql_type,
        not_null,
    }
}

/// Canonical table layout observed by the facade
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: "metrics",
        columns: &[
            col("timestamp", "INTEGER", true),
            col("metric_name", "TEXT", true),
            col("value", "REAL", true),
            col("symbol", "TEXT", false),
            col("labels", "TEXT", false),
        ],
    },
    TableDef {
        name: "candles",
        columns: &[
            col("timestamp", "INTEGER", true),
            col("symbol", "TEXT", true),
            col("open", "REAL", true),
            col("high", "REAL", true),
            col("low", "REAL", true),
            col("close", "REAL", true),
            col("volume", "INTEGER", true),
            col("trade_count", "INTEGER", false),
        ],
    },
    TableDef {
        name: "trades",
        columns: &[
            col("timestamp", "INTEGER", true),
            col("symbol", "TEXT", true),
            col("side", "TEXT", true),
            col("price", "REAL", true),
            col("quantity", "REAL", true),
            col("order_id", "TEXT", false),
            col("fee", "REAL", false),
        ],
    },
    TableDef {
        name: "events",
        columns: &[
            col("id", "INTEGER", false), // PRIMARY KEY AUTOINCREMENT
            col("timestamp", "INTEGER", true),
            col("event_type", "TEXT", true),
            col("severity", "TEXT", true),
            col("message", "TEXT", true),
            col("details", "TEXT", false),
        ],
    },
    TableDef {
        name: "schema_migrations",
        columns: &[
            col("version", "INTEGER", false), // PRIMARY KEY
            col("name", "TEXT", true),
            col("checksum", "INTEGER", true),
            col("applied_at", "TEXT", true),
        ],
    },
];

/// Creates and verifies the on-disk table layout
pub struct SchemaManager;

impl SchemaManager {
    /// Idempotently create every table and index; safe on every startup
    pub fn create_all(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metrics (
                timestamp   INTEGER NOT NULL,
                metric_name TEXT NOT NULL,
                value       REAL NOT NULL,
                symbol      TEXT,
                labels      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_metrics_ts ON metrics(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_metrics_name_symbol ON metrics(metric_name, symbol);

            CREATE TABLE IF NOT EXISTS candles (
                timestamp   INTEGER NOT NULL,
                symbol      TEXT NOT NULL,
                open        REAL NOT NULL,
                high        REAL NOT NULL,
                low         REAL NOT NULL,
                close       REAL NOT NULL,
                volume      INTEGER NOT NULL,
                trade_count INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_candles_ts ON candles(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_candles_symbol_ts ON candles(symbol, timestamp DESC);

            CREATE TABLE IF NOT EXISTS trades (
                timestamp INTEGER NOT NULL,
                symbol    TEXT NOT NULL,
                side      TEXT NOT NULL,
                price     REAL NOT NULL,
                quantity  REAL NOT NULL,
                order_id  TEXT,
                fee       REAL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_ts ON trades(timestamp DESC);
            CREATE INDEX IF NOT EXISTS idx_trades_symbol_ts ON trades(symbol, timestamp DESC);

            CREATE TABLE IF NOT EXISTS events (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                severity   TEXT NOT NULL,
                message    TEXT NOT NULL,
                details    TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_events_ts ON events(timestamp DESC);

            CREATE TABLE IF NOT EXISTS schema_migrations (
                version    INTEGER PRIMARY KEY,
                name       TEXT NOT NULL,
                checksum   INTEGER NOT NULL,
                applied_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    /// Compare the live store structure against the expected definition
    ///
    /// Fails with `SchemaMismatch` if a required table or column is missing.
    /// Extra tables or columns are tolerated (forward compatibility with
    /// migrations this build does not know about).
    pub fn verify(conn: &Connection) -> StoreResult<()> {
        for table in TABLES {
            let live_columns = Self::live_columns(conn, table.name)?;

            if live_columns.is_empty() {
                return Err(StoreError::SchemaMismatch(format!(
                    "table '{}' is missing",
                    table.name
                )));
            }

            for column in table.columns {
                if !live_columns.contains(column.name) {
                    return Err(StoreError::SchemaMismatch(format!(
                        "table '{}' is missing column '{}'",
                        table.name, column.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Column names of a live table, empty if the table does not exist
    fn live_columns(conn: &Connection, table: &str) -> StoreResult<HashSet<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(names)
    }

    /// Names of the time-series tables (excludes migration metadata)
    pub fn data_tables() -> Vec<&'static str> {
        TABLES
            .iter()
            .map(|t| t.name)
            .filter(|n| *n != "schema_migrations")
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_all_is_idempotent() {
        let conn = open_memory();
        SchemaManager::create_all(&conn).unwrap();
        SchemaManager::create_all(&conn).unwrap();
        SchemaManager::verify(&conn).unwrap();
    }

    #[test]
    fn test_verify_empty_store_fails() {
        let conn = open_memory();
        let err = SchemaManager::verify(&conn).unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
        assert!(err.to_string().contains("metrics"));
    }

    #[test]
    fn test_verify_detects_missing_column() {
        let conn = open_memory();
        SchemaManager::create_all(&conn).unwrap();

        // Simulate a store created by an older, incompatible build
        conn.execute_batch(
            "DROP TABLE trades;
             CREATE TABLE trades (timestamp INTEGER NOT NULL, symbol TEXT NOT NULL);",
        )
        .unwrap();

        let err = SchemaManager::verify(&conn).unwrap_err();
        match err {
            StoreError::SchemaMismatch(msg) => {
                assert!(msg.contains("trades"));
                assert!(msg.contains("side"));
            }
            other => panic!("expected SchemaMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_verify_tolerates_extra_columns() {
        let conn = open_memory();
        SchemaManager::create_all(&conn).unwrap();
        conn.execute("ALTER TABLE metrics ADD COLUMN extra TEXT", [])
            .unwrap();
        SchemaManager::verify(&conn).unwrap();
    }

    #[test]
    fn test_expected_indexes_exist() {
        let conn = open_memory();
        SchemaManager::create_all(&conn).unwrap();

        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index'")
            .unwrap();
        let indexes: HashSet<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for expected in [
            "idx_metrics_ts",
            "idx_metrics_name_symbol",
            "idx_candles_symbol_ts",
            "idx_trades_symbol_ts",
            "idx_events_ts",
        ] {
            assert!(indexes.contains(expected), "missing index {expected}");
        }
    }

    #[test]
    fn test_data_tables_excludes_metadata() {
        let tables = SchemaManager::data_tables();
        assert!(tables.contains(&"metrics"));
        assert!(!tables.contains(&"schema_migrations"));
    }
}
