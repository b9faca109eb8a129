//! Record models for the tickstore storage layer
//!
//! This module defines the typed value objects producers hand to the store:
//! - `MetricRecord`: an operational metric sample with optional labels
//! - `CandleRecord`: an OHLCV price candle
//! - `TradeRecord`: a single trade execution
//! - `SystemEvent`: a logged system event with severity
//! - `PerformanceSummary`: a derived aggregate over trade history
//!
//! All records are append-only value types. Builder methods return enriched
//! copies so no partially-constructed record ever reaches the store.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Current wall-clock time as Unix milliseconds
pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A single operational metric sample
///
/// Timestamps are Unix milliseconds and are not required to be unique.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Metric name (e.g., "price", "order_latency_ms")
    pub name: String,
    /// The measured value
    pub value: f64,
    /// Optional instrument symbol (e.g., "BTC/USD")
    #[serde(default)]
    pub symbol: Option<String>,
    /// Open-ended labels, opaque to the store
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl MetricRecord {
    /// Create a minimal record with the current timestamp
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: now_millis(),
            name: name.into(),
            value,
            symbol: None,
            labels: HashMap::new(),
        }
    }

    /// Builder: set a specific timestamp
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder: attach an instrument symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    /// Builder: add a single label
    pub fn add_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Builder: merge a label map
    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels.extend(labels);
        self
    }

    /// A record is writable when its name is non-empty and its value is finite
    pub fn is_valid(&self) -> bool {
        !self.name.is_empty() && self.value.is_finite()
    }
}

/// An OHLCV price candle for one instrument and interval
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandleRecord {
    /// Unix timestamp in milliseconds (candle open time)
    pub timestamp: i64,
    /// Instrument symbol
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded volume over the candle
    pub volume: i64,
    /// Number of trades in the candle, when the feed provides it
    #[serde(default)]
    pub trade_count: Option<i64>,
}

impl CandleRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        timestamp: i64,
        symbol: impl Into<String>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
            trade_count: None,
        }
    }

    /// Builder: set the trade count
    pub fn with_trade_count(mut self, count: i64) -> Self {
        self.trade_count = Some(count);
        self
    }

    /// Check the OHLC ordering invariant: high >= max(open, close) and
    /// low <= min(open, close). The store does not enforce this; it is a
    /// producer-side aid.
    pub fn is_consistent(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }

    /// A candle is writable when its symbol is non-empty and every price is finite
    pub fn is_valid(&self) -> bool {
        !self.symbol.is_empty()
            && [self.open, self.high, self.low, self.close]
                .iter()
                .all(|p| p.is_finite())
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "buy" | "b" => Some(Self::Buy),
            "sell" | "s" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// A single trade execution, keyed by timestamp and symbol
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    /// Unix timestamp in milliseconds (execution time)
    pub timestamp: i64,
    /// Instrument symbol
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub quantity: f64,
    /// Originating order id, when known
    #[serde(default)]
    pub order_id: Option<String>,
    /// Execution fee, when known
    #[serde(default)]
    pub fee: Option<f64>,
}

impl TradeRecord {
    pub fn new(symbol: impl Into<String>, side: Side, price: f64, quantity: f64) -> Self {
        Self {
            timestamp: now_millis(),
            symbol: symbol.into(),
            side,
            price,
            quantity,
            order_id: None,
            fee: None,
        }
    }

    /// Builder: set a specific timestamp
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder: attach the originating order id
    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    /// Builder: set the execution fee
    pub fn with_fee(mut self, fee: f64) -> Self {
        self.fee = Some(fee);
        self
    }

    /// Signed notional value: price * quantity
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }

    /// A trade is writable when its symbol is non-empty and price/quantity are finite
    pub fn is_valid(&self) -> bool {
        !self.symbol.is_empty() && self.price.is_finite() && self.quantity.is_finite()
    }
}

/// Event severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" | "crit" => Some(Self::Critical),
            _ => None,
        }
    }

    /// All severities for iteration
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Info,
            Severity::Warning,
            Severity::Error,
            Severity::Critical,
        ]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A logged system event
///
/// The id is assigned by the store on insert; producer-side instances carry
/// `None`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    /// Auto-incrementing identity, assigned on insert
    #[serde(default)]
    pub id: Option<i64>,
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// Event type (e.g., "order_rejected", "feed_reconnect")
    pub event_type: String,
    pub severity: Severity,
    pub message: String,
    /// Optional structured payload, opaque to the store
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl SystemEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            timestamp: now_millis(),
            event_type: event_type.into(),
            severity,
            message: message.into(),
            details: None,
        }
    }

    /// Builder: set a specific timestamp
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Builder: attach a structured detail payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Derived aggregate over trade history — computed on demand, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceSummary {
    /// Symbol filter the summary was computed for, if any
    pub symbol: Option<String>,
    /// Start of the window (ms), if bounded
    pub since: Option<i64>,
    pub trade_count: u64,
    pub buy_count: u64,
    pub sell_count: u64,
    /// Sum of traded quantities
    pub total_quantity: f64,
    /// Sum of price * quantity across trades
    pub total_notional: f64,
    /// Timestamp of the earliest trade in the window
    pub first_trade: Option<i64>,
    /// Timestamp of the latest trade in the window
    pub last_trade: Option<i64>,
}

/// How to reduce the values within one time bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunc {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl AggregateFunc {
    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "avg" | "average" | "mean" => Some(Self::Avg),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "count" => Some(Self::Count),
            _ => None,
        }
    }

    /// SQL function name. Closed set: never built from caller input.
    pub(crate) fn sql_name(&self) -> &'static str {
        match self {
            Self::Avg => "AVG",
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }
}

impl std::fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Avg => write!(f, "avg"),
            Self::Sum => write!(f, "sum"),
            Self::Min => write!(f, "min"),
            Self::Max => write!(f, "max"),
            Self::Count => write!(f, "count"),
        }
    }
}

/// Fixed bucket widths for time-bucketed aggregation
///
/// Buckets are aligned to interval epochs (a minute bucket always starts on
/// the minute), so results are deterministic regardless of sample offsets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BucketInterval {
    Minute,
    Hour,
    Day,
}

impl BucketInterval {
    /// Parse from string, case-insensitive
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minute" | "min" | "m" => Some(Self::Minute),
            "hour" | "h" => Some(Self::Hour),
            "day" | "d" => Some(Self::Day),
            _ => None,
        }
    }

    /// Bucket width in milliseconds
    pub fn millis(&self) -> i64 {
        match self {
            Self::Minute => 60 * 1000,
            Self::Hour => 3600 * 1000,
            Self::Day => 24 * 3600 * 1000,
        }
    }

    /// Truncate a timestamp to the start of its bucket
    pub fn truncate(&self, timestamp: i64) -> i64 {
        let width = self.millis();
        (timestamp / width) * width
    }
}

impl std::fmt::Display for BucketInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
            Self::Day => write!(f, "day"),
        }
    }
}
