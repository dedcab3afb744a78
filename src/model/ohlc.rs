use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Product;

/// The three supported OHLC window sizes (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WindowSize {
    OneMinute,
    FiveMinute,
    FifteenMinute,
}

impl WindowSize {
    pub const ALL: [WindowSize; 3] = [
        WindowSize::OneMinute,
        WindowSize::FiveMinute,
        WindowSize::FifteenMinute,
    ];

    pub fn as_secs(self) -> i64 {
        match self {
            WindowSize::OneMinute => 60,
            WindowSize::FiveMinute => 300,
            WindowSize::FifteenMinute => 900,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcWindow {
    pub product: Product,
    pub window: WindowSize,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub t_start: DateTime<Utc>,
    pub t_end: DateTime<Utc>,

    /// Timestamp of the tick currently holding `open`. Needed to honor the
    /// §5 rule that `open` tracks the minimum-timestamp tick seen so far in
    /// the window, not literally the first tick processed (late arrivals can
    /// still become `open` if their timestamp is earlier).
    open_ts: DateTime<Utc>,
    /// Timestamp of the tick currently holding `close` (maximum seen so far).
    close_ts: DateTime<Utc>,
}

impl OhlcWindow {
    pub fn window_bounds(window: WindowSize, timestamp: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let w = window.as_secs();
        let epoch = timestamp.timestamp_millis();
        let w_ms = w * 1000;
        let start_ms = (epoch.div_euclid(w_ms)) * w_ms;
        let t_start = DateTime::<Utc>::from_timestamp_millis(start_ms).expect("valid window start");
        let t_end = t_start + chrono::Duration::seconds(w);
        (t_start, t_end)
    }

    pub fn new_from_tick(product: Product, window: WindowSize, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        let (t_start, t_end) = Self::window_bounds(window, timestamp);
        Self {
            product,
            window,
            open: price,
            high: price,
            low: price,
            close: price,
            t_start,
            t_end,
            open_ts: timestamp,
            close_ts: timestamp,
        }
    }

    /// Apply a tick whose timestamp falls within `[t_start, t_end)` to this
    /// window. Callers must check window membership first (spec: a tick at
    /// `timestamp == t_end` belongs to the *next* window).
    pub fn apply_tick(&mut self, price: Decimal, timestamp: DateTime<Utc>) {
        if timestamp < self.open_ts {
            self.open = price;
            self.open_ts = timestamp;
        }
        if timestamp >= self.close_ts {
            self.close = price;
            self.close_ts = timestamp;
        }
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
    }

    pub fn open_ts(&self) -> DateTime<Utc> {
        self.open_ts
    }

    pub fn close_ts(&self) -> DateTime<Utc> {
        self.close_ts
    }
}
