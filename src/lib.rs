//! # Tickstore
//!
//! Embedded time-series storage for trading systems: metrics, OHLCV candles,
//! trade executions, and system events in a single pooled SQLite store.
//!
//! The storage layer is append-only. Producers hand typed records to the
//! [`store::Database`] facade; reads come back newest first or reduced into
//! epoch-aligned time buckets.
//!
//! # Example
//!
//! ```rust,no_run
//! use tickstore::config::Config;
//! use tickstore::store::{AggregateFunc, BucketInterval, Database, MetricRecord};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let db = Database::open(&config.store)?;
//!     db.initialize()?;
//!
//!     db.insert_metric(&MetricRecord::new("price", 50000.0).with_symbol("BTC/USD"))?;
//!
//!     let hourly = db.get_aggregated_metrics(
//!         "price",
//!         BucketInterval::Hour,
//!         None,
//!         AggregateFunc::Avg,
//!     )?;
//!     println!("{} hourly buckets", hourly.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod store;

// Re-export top-level types for convenience
pub use store::{
    AggregateFunc, AggregatedPoint, BucketInterval, CandleRecord, Database, MetricRecord,
    PerformanceSummary, PoolConfig, PoolStats, Severity, Side, StoreError, StoreResult,
    SystemEvent, TableStats, TradeRecord,
};

pub use config::{Config, ConfigError, LoggingConfig, StoreConfig};
