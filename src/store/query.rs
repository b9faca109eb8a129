//! Query builder — parameterized statements for every supported access pattern
//!
//! Every statement binds caller-supplied values as parameters; no user data is
//! ever interpolated into SQL text. The only identifiers spliced into SQL come
//! from closed enums (`AggregateFunc`, `Table`), so statements stay
//! injection-safe and type-checked at the binding layer.
//!
//! Builder outputs are immutable [`Statement`] values; executing the same read
//! statement twice is safe and side-effect-free.

use crate::store::error::{StoreError, StoreResult};
use crate::store::records::{
    AggregateFunc, BucketInterval, CandleRecord, MetricRecord, Severity, SystemEvent, TradeRecord,
};
use rusqlite::types::Value;

/// An immutable parameterized statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Whitelisted data tables for statistics and import targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Metrics,
    Candles,
    Trades,
    Events,
}

impl Table {
    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "metrics" => Some(Self::Metrics),
            "candles" => Some(Self::Candles),
            "trades" => Some(Self::Trades),
            "events" => Some(Self::Events),
            _ => None,
        }
    }

    /// SQL table name. Closed set: never built from caller input.
    pub(crate) fn sql_name(&self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Candles => "candles",
            Self::Trades => "trades",
            Self::Events => "events",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Parse an aggregation function name, rejecting unknown functions before
/// execution
pub fn parse_aggregate(s: &str) -> StoreResult<AggregateFunc> {
    AggregateFunc::parse(s)
        .ok_or_else(|| StoreError::InvalidQuery(format!("unknown aggregation function '{s}'")))
}

/// Constructs parameterized statements for the facade
pub struct QueryBuilder;

impl QueryBuilder {
    // ==================== Read statements ====================

    /// Matching metric records, newest first
    pub fn select_metrics(
        name: &str,
        symbol: Option<&str>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Statement> {
        if name.is_empty() {
            return Err(StoreError::InvalidQuery("metric name is empty".into()));
        }
        if limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }

        let mut sql = String::from(
            "SELECT timestamp, metric_name, value, symbol, labels FROM metrics \
             WHERE metric_name = ?",
        );
        let mut params: Vec<Value> = vec![Value::from(name.to_string())];

        if let Some(symbol) = symbol {
            sql.push_str(" AND symbol = ?");
            params.push(Value::from(symbol.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(Value::from(limit as i64));

        Ok(Statement::new(sql, params))
    }

    /// Metric values reduced into epoch-aligned fixed-width buckets
    ///
    /// Bucket starts are computed as `(timestamp / width) * width`, so a
    /// minute bucket always begins on the minute regardless of sample
    /// offsets. Rows carry (bucket_start, reduced_value, sample_count),
    /// oldest bucket first.
    pub fn aggregate_metrics(
        name: &str,
        interval: BucketInterval,
        since: Option<i64>,
        func: AggregateFunc,
    ) -> StoreResult<Statement> {
        if name.is_empty() {
            return Err(StoreError::InvalidQuery("metric name is empty".into()));
        }

        let width = interval.millis();
        let mut sql = format!(
            "SELECT (timestamp / ?) * ? AS bucket, {}(value) AS agg_value, COUNT(value) AS samples \
             FROM metrics WHERE metric_name = ?",
            func.sql_name()
        );
        let mut params: Vec<Value> = vec![
            Value::from(width),
            Value::from(width),
            Value::from(name.to_string()),
        ];

        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" GROUP BY bucket ORDER BY bucket ASC");

        Ok(Statement::new(sql, params))
    }

    /// Matching candles, newest first
    pub fn select_candles(
        symbol: &str,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Statement> {
        if symbol.is_empty() {
            return Err(StoreError::InvalidQuery("symbol is empty".into()));
        }
        if limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }

        let mut sql = String::from(
            "SELECT timestamp, symbol, open, high, low, close, volume, trade_count \
             FROM candles WHERE symbol = ?",
        );
        let mut params: Vec<Value> = vec![Value::from(symbol.to_string())];

        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(Value::from(limit as i64));

        Ok(Statement::new(sql, params))
    }

    /// Candle close prices reduced into epoch-aligned buckets
    pub fn aggregate_candles(
        symbol: &str,
        interval: BucketInterval,
        since: Option<i64>,
        func: AggregateFunc,
    ) -> StoreResult<Statement> {
        if symbol.is_empty() {
            return Err(StoreError::InvalidQuery("symbol is empty".into()));
        }

        let width = interval.millis();
        let mut sql = format!(
            "SELECT (timestamp / ?) * ? AS bucket, {}(close) AS agg_value, COUNT(close) AS samples \
             FROM candles WHERE symbol = ?",
            func.sql_name()
        );
        let mut params: Vec<Value> = vec![
            Value::from(width),
            Value::from(width),
            Value::from(symbol.to_string()),
        ];

        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" GROUP BY bucket ORDER BY bucket ASC");

        Ok(Statement::new(sql, params))
    }

    /// Matching trades, newest first
    pub fn select_trades(
        symbol: Option<&str>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Statement> {
        if limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }

        let mut sql = String::from(
            "SELECT timestamp, symbol, side, price, quantity, order_id, fee FROM trades WHERE 1 = 1",
        );
        let mut params: Vec<Value> = Vec::new();

        if let Some(symbol) = symbol {
            sql.push_str(" AND symbol = ?");
            params.push(Value::from(symbol.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(Value::from(limit as i64));

        Ok(Statement::new(sql, params))
    }

    /// Matching events, newest first
    pub fn select_events(
        severity: Option<Severity>,
        since: Option<i64>,
        limit: usize,
    ) -> StoreResult<Statement> {
        if limit == 0 {
            return Err(StoreError::InvalidQuery("limit must be positive".into()));
        }

        let mut sql = String::from(
            "SELECT id, timestamp, event_type, severity, message, details FROM events WHERE 1 = 1",
        );
        let mut params: Vec<Value> = Vec::new();

        if let Some(severity) = severity {
            sql.push_str(" AND severity = ?");
            params.push(Value::from(severity.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        sql.push_str(" ORDER BY timestamp DESC LIMIT ?");
        params.push(Value::from(limit as i64));

        Ok(Statement::new(sql, params))
    }

    /// Trade aggregates for a performance summary window
    pub fn trade_summary(symbol: Option<&str>, since: Option<i64>) -> Statement {
        let mut sql = String::from(
            "SELECT COUNT(*), \
                    COALESCE(SUM(CASE WHEN side = 'buy' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(CASE WHEN side = 'sell' THEN 1 ELSE 0 END), 0), \
                    COALESCE(SUM(quantity), 0), \
                    COALESCE(SUM(price * quantity), 0), \
                    MIN(timestamp), MAX(timestamp) \
             FROM trades WHERE 1 = 1",
        );
        let mut params: Vec<Value> = Vec::new();

        if let Some(symbol) = symbol {
            sql.push_str(" AND symbol = ?");
            params.push(Value::from(symbol.to_string()));
        }
        if let Some(since) = since {
            sql.push_str(" AND timestamp >= ?");
            params.push(Value::from(since));
        }

        Statement::new(sql, params)
    }

    /// Row count of a whitelisted table
    pub fn table_count(table: Table) -> Statement {
        Statement::new(format!("SELECT COUNT(*) FROM {}", table.sql_name()), vec![])
    }

    // ==================== Write statements ====================

    /// Point insert for a metric record
    pub fn insert_metric(record: &MetricRecord) -> StoreResult<Statement> {
        if !record.is_valid() {
            return Err(StoreError::InvalidRecord(format!(
                "metric '{}' has an empty name or non-finite value",
                record.name
            )));
        }

        let labels = if record.labels.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.labels)?)
        };

        Ok(Statement::new(
            "INSERT INTO metrics (timestamp, metric_name, value, symbol, labels) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                Value::from(record.timestamp),
                Value::from(record.name.clone()),
                Value::from(record.value),
                option_text(record.symbol.clone()),
                option_text(labels),
            ],
        ))
    }

    /// Point insert for a candle record
    pub fn insert_candle(record: &CandleRecord) -> StoreResult<Statement> {
        if !record.is_valid() {
            return Err(StoreError::InvalidRecord(format!(
                "candle '{}' has an empty symbol or non-finite price",
                record.symbol
            )));
        }

        Ok(Statement::new(
            "INSERT INTO candles (timestamp, symbol, open, high, low, close, volume, trade_count) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                Value::from(record.timestamp),
                Value::from(record.symbol.clone()),
                Value::from(record.open),
                Value::from(record.high),
                Value::from(record.low),
                Value::from(record.close),
                Value::from(record.volume),
                option_int(record.trade_count),
            ],
        ))
    }

    /// Point insert for a trade record
    pub fn insert_trade(record: &TradeRecord) -> StoreResult<Statement> {
        if !record.is_valid() {
            return Err(StoreError::InvalidRecord(format!(
                "trade '{}' has an empty symbol or non-finite price/quantity",
                record.symbol
            )));
        }

        Ok(Statement::new(
            "INSERT INTO trades (timestamp, symbol, side, price, quantity, order_id, fee) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            vec![
                Value::from(record.timestamp),
                Value::from(record.symbol.clone()),
                Value::from(record.side.to_string()),
                Value::from(record.price),
                Value::from(record.quantity),
                option_text(record.order_id.clone()),
                option_real(record.fee),
            ],
        ))
    }

    /// Point insert for a system event (id assigned by the store)
    pub fn insert_event(event: &SystemEvent) -> StoreResult<Statement> {
        if event.event_type.is_empty() {
            return Err(StoreError::InvalidRecord("event type is empty".into()));
        }

        let details = match &event.details {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        Ok(Statement::new(
            "INSERT INTO events (timestamp, event_type, severity, message, details) \
             VALUES (?, ?, ?, ?, ?)",
            vec![
                Value::from(event.timestamp),
                Value::from(event.event_type.clone()),
                Value::from(event.severity.to_string()),
                Value::from(event.message.clone()),
                option_text(details),
            ],
        ))
    }
}

fn option_text(v: Option<String>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

fn option_int(v: Option<i64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

fn option_real(v: Option<f64>) -> Value {
    v.map(Value::from).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::SchemaManager;
    use rusqlite::{params_from_iter, Connection};

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        SchemaManager::create_all(&conn).unwrap();
        conn
    }

    fn run(conn: &Connection, stmt: &Statement) {
        conn.execute(&stmt.sql, params_from_iter(stmt.params.iter()))
            .unwrap();
    }

    #[test]
    fn test_select_metrics_shape() {
        let stmt = QueryBuilder::select_metrics("price", Some("BTC/USD"), Some(1000), 10).unwrap();
        assert!(stmt.sql.contains("ORDER BY timestamp DESC"));
        assert_eq!(stmt.params.len(), 4);

        // optional filters dropped when absent
        let stmt = QueryBuilder::select_metrics("price", None, None, 10).unwrap();
        assert_eq!(stmt.params.len(), 2);
        assert!(!stmt.sql.contains("symbol"));
    }

    #[test]
    fn test_invalid_parameters_rejected_before_execution() {
        assert!(matches!(
            QueryBuilder::select_metrics("", None, None, 10),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            QueryBuilder::select_metrics("price", None, None, 0),
            Err(StoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            parse_aggregate("median"),
            Err(StoreError::InvalidQuery(_))
        ));
        assert_eq!(parse_aggregate("avg").unwrap(), AggregateFunc::Avg);
    }

    #[test]
    fn test_insert_then_select_round_trip() {
        let conn = test_conn();
        let record = MetricRecord::new("price", 50000.0)
            .with_timestamp(1000)
            .with_symbol("BTC/USD");
        run(&conn, &QueryBuilder::insert_metric(&record).unwrap());

        let stmt = QueryBuilder::select_metrics("price", Some("BTC/USD"), None, 10).unwrap();
        let value: f64 = conn
            .query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| {
                row.get(2)
            })
            .unwrap();
        assert_eq!(value, 50000.0);
    }

    #[test]
    fn test_read_statement_is_reexecutable() {
        let conn = test_conn();
        let record = MetricRecord::new("price", 1.0).with_timestamp(1);
        run(&conn, &QueryBuilder::insert_metric(&record).unwrap());

        let stmt = QueryBuilder::select_metrics("price", None, None, 10).unwrap();
        for _ in 0..3 {
            let n: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM ({})", stmt.sql),
                    params_from_iter(stmt.params.iter()),
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(n, 1);
        }
    }

    #[test]
    fn test_hostile_symbol_is_bound_not_interpolated() {
        let conn = test_conn();
        let hostile = "BTC'; DROP TABLE metrics; --";
        let record = MetricRecord::new("price", 1.0)
            .with_timestamp(1)
            .with_symbol(hostile);
        run(&conn, &QueryBuilder::insert_metric(&record).unwrap());

        let stmt = QueryBuilder::select_metrics("price", Some(hostile), None, 10).unwrap();
        let symbol: String = conn
            .query_row(&stmt.sql, params_from_iter(stmt.params.iter()), |row| {
                row.get(3)
            })
            .unwrap();
        assert_eq!(symbol, hostile);

        // table survived
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM metrics", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_aggregation_buckets_align_to_epoch() {
        let conn = test_conn();

        // Two samples inside the minute starting at 60_000, one in the next
        for (ts, value) in [(61_000, 10.0), (119_000, 20.0), (121_000, 30.0)] {
            let record = MetricRecord::new("load", value).with_timestamp(ts);
            run(&conn, &QueryBuilder::insert_metric(&record).unwrap());
        }

        let stmt =
            QueryBuilder::aggregate_metrics("load", BucketInterval::Minute, None, AggregateFunc::Avg)
                .unwrap();
        let mut prepared = conn.prepare(&stmt.sql).unwrap();
        let rows: Vec<(i64, f64, i64)> = prepared
            .query_map(params_from_iter(stmt.params.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(rows, vec![(60_000, 15.0, 2), (120_000, 30.0, 1)]);
    }

    #[test]
    fn test_aggregation_sum_matches_raw_scan() {
        let conn = test_conn();
        let values = [3.0, 1.5, 2.5, 8.0, 0.5];
        for (i, v) in values.iter().enumerate() {
            let record = MetricRecord::new("pnl", *v).with_timestamp(i as i64 * 40_000);
            run(&conn, &QueryBuilder::insert_metric(&record).unwrap());
        }

        let stmt =
            QueryBuilder::aggregate_metrics("pnl", BucketInterval::Minute, None, AggregateFunc::Sum)
                .unwrap();
        let mut prepared = conn.prepare(&stmt.sql).unwrap();
        let bucket_total: f64 = prepared
            .query_map(params_from_iter(stmt.params.iter()), |row| {
                row.get::<_, f64>(1)
            })
            .unwrap()
            .map(Result::unwrap)
            .sum();

        assert_eq!(bucket_total, values.iter().sum::<f64>());
    }

    #[test]
    fn test_invalid_record_rejected() {
        let bad = MetricRecord::new("", 1.0);
        assert!(matches!(
            QueryBuilder::insert_metric(&bad),
            Err(StoreError::InvalidRecord(_))
        ));

        let nan = MetricRecord::new("x", f64::NAN);
        assert!(matches!(
            QueryBuilder::insert_metric(&nan),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn test_table_count() {
        let conn = test_conn();
        let stmt = QueryBuilder::table_count(Table::Metrics);
        let n: i64 = conn.query_row(&stmt.sql, [], |row| row.get(0)).unwrap();
        assert_eq!(n, 0);
        assert_eq!(Table::parse("candles"), Some(Table::Candles));
        assert_eq!(Table::parse("sqlite_master"), None);
    }
}
