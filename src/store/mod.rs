//! Tickstore Storage Layer
//!
//! This module provides the embedded time-series storage functionality:
//!
//! - **records**: Core record models (MetricRecord, CandleRecord, TradeRecord, SystemEvent)
//! - **pool**: Bounded connection pool with scoped handles
//! - **schema**: Table layout, creation, and verification
//! - **query**: Parameterized statement construction
//! - **migrate**: Versioned migrations and bulk CSV import
//! - **db**: The facade callers use
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   Record → validate → QueryBuilder → pooled connection → transaction
//!
//! Read Path:
//!   Filters → QueryBuilder → pooled connection → typed records
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use tickstore::config::StoreConfig;
//! use tickstore::store::{Database, MetricRecord};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::default();
//!     let db = Database::open(&config)?;
//!     db.initialize()?;
//!
//!     let record = MetricRecord::new("price", 50000.0).with_symbol("BTC/USD");
//!     db.insert_metric(&record)?;
//!
//!     let recent = db.get_metrics("price", Some("BTC/USD"), None, 100)?;
//!     println!("{} samples", recent.len());
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
pub mod migrate;
pub mod pool;
pub mod query;
pub mod records;
pub mod schema;

pub use db::{AggregatedPoint, Database, TableStats};
pub use error::{StoreError, StoreResult};
pub use migrate::{import_csv, Migration, MigrationManager, Outcome};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use query::{parse_aggregate, QueryBuilder, Statement, Table};
pub use records::{
    AggregateFunc, BucketInterval, CandleRecord, MetricRecord, PerformanceSummary, Severity, Side,
    SystemEvent, TradeRecord,
};
pub use schema::SchemaManager;
