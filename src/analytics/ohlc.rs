use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::model::{OhlcWindow, Product, WindowSize};

/// Streaming OHLC update (§4.A). `existing` is the window currently cached
/// for `(product, window, t_start)`, if any, where `t_start` is derived from
/// `timestamp`. A tick exactly at a window boundary (`timestamp == t_end`)
/// belongs to the *next* window — `window_bounds` floors to the window
/// containing `timestamp`, so that case naturally produces the next window's
/// `t_start`, never the one ending at `timestamp`.
pub fn update_ohlc_window(
    existing: Option<OhlcWindow>,
    product: &Product,
    window: WindowSize,
    price: Decimal,
    timestamp: DateTime<Utc>,
) -> OhlcWindow {
    let (t_start, _) = OhlcWindow::window_bounds(window, timestamp);

    match existing {
        Some(mut w) if w.t_start == t_start => {
            w.apply_tick(price, timestamp);
            w
        }
        _ => OhlcWindow::new_from_tick(product.clone(), window, price, timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn first_tick_creates_window() {
        let w = update_ohlc_window(None, &"NIFTY".to_string(), WindowSize::OneMinute, dec!(100), ts(0));
        assert_eq!(w.open, dec!(100));
        assert_eq!(w.high, dec!(100));
        assert_eq!(w.low, dec!(100));
        assert_eq!(w.close, dec!(100));
    }

    #[test]
    fn subsequent_ticks_update_high_low_close_not_open() {
        let w = update_ohlc_window(None, &"NIFTY".to_string(), WindowSize::OneMinute, dec!(100), ts(0));
        let w = update_ohlc_window(Some(w), &"NIFTY".to_string(), WindowSize::OneMinute, dec!(105), ts(10));
        let w = update_ohlc_window(Some(w), &"NIFTY".to_string(), WindowSize::OneMinute, dec!(95), ts(20));
        assert_eq!(w.open, dec!(100));
        assert_eq!(w.high, dec!(105));
        assert_eq!(w.low, dec!(95));
        assert_eq!(w.close, dec!(95));
    }

    #[test]
    fn late_tick_with_earlier_timestamp_becomes_open() {
        let w = update_ohlc_window(None, &"NIFTY".to_string(), WindowSize::OneMinute, dec!(100), ts(30));
        let w = update_ohlc_window(Some(w), &"NIFTY".to_string(), WindowSize::OneMinute, dec!(90), ts(5));
        assert_eq!(w.open, dec!(90));
        assert_eq!(w.open_ts(), ts(5));
    }

    #[test]
    fn tick_at_boundary_belongs_to_next_window() {
        // window 0..60; tick at timestamp==60 belongs to window 60..120.
        let w = update_ohlc_window(None, &"NIFTY".to_string(), WindowSize::OneMinute, dec!(100), ts(60));
        assert_eq!(w.t_start, ts(60));
        assert_eq!(w.t_end, ts(120));
    }

    #[test]
    fn tick_outside_existing_window_starts_a_new_one() {
        let w = update_ohlc_window(None, &"NIFTY".to_string(), WindowSize::OneMinute, dec!(100), ts(0));
        let w2 = update_ohlc_window(Some(w), &"NIFTY".to_string(), WindowSize::OneMinute, dec!(200), ts(90));
        assert_eq!(w2.open, dec!(200));
        assert_eq!(w2.t_start, ts(60));
    }
}
