//! Shared predicates for pattern detectors

use crate::{
    metrics::{CandleMetrics, CandleSeries, ContextSpec, MarketContext},
    Bar, Direction, Multiple, OHLCVExt, Period, Trend,
};

/// A bar together with its precomputed metrics
#[derive(Debug, Clone, Copy)]
pub struct Candle<'a> {
    pub bar: &'a Bar,
    pub metrics: &'a CandleMetrics,
}

/// The `N` consecutive candles ending at `index`, `None` without enough history
pub fn candles<const N: usize>(series: &CandleSeries, index: usize) -> Option<[Candle<'_>; N]> {
    let start = (index + 1).checked_sub(N)?;
    if index >= series.len() {
        return None;
    }
    let (bars, metrics) = (series.bars(), series.metrics());
    Some(std::array::from_fn(|k| Candle {
        bar: &bars[start + k],
        metrics: &metrics[start + k],
    }))
}

/// Reversal trend gate on the lead candle: bullish needs a prior downtrend,
/// bearish a prior uptrend. Neutral or undefined never passes.
pub fn trend_admits(contexts: &[MarketContext], lead: usize, direction: Direction) -> bool {
    let Some(trend) = contexts.get(lead).and_then(|c| c.trend) else {
        return false;
    };
    match direction {
        Direction::Bullish => trend == Trend::Downtrend,
        Direction::Bearish => trend == Trend::Uptrend,
        Direction::Neutral => false,
    }
}

/// [`trend_admits`] when `enabled`, otherwise always true
#[inline]
pub fn trend_gate(enabled: bool, contexts: &[MarketContext], lead: usize, direction: Direction) -> bool {
    !enabled || trend_admits(contexts, lead, direction)
}

/// Context needed by a detector whose only gate is an optional trend check
pub fn trend_spec(enabled: bool, ma_period: Period) -> ContextSpec {
    ContextSpec {
        trend_period: enabled.then_some(ma_period),
        ..ContextSpec::default()
    }
}

/// `relative_volume >= min` when a minimum is set; an undefined relative
/// volume fails an active gate
pub fn volume_admits(contexts: &[MarketContext], index: usize, min: Option<Multiple>) -> bool {
    match min {
        None => true,
        Some(min) => contexts
            .get(index)
            .and_then(|c| c.relative_volume)
            .is_some_and(|rv| rv >= min.get()),
    }
}

/// Both open and close of `inner` lie strictly within the body of `outer`
pub fn body_strictly_inside(inner: &Bar, outer: &Bar) -> bool {
    outer.body_bottom() < inner.body_bottom() && inner.body_top() < outer.body_top()
}

/// Classify a two-candle color combination: red then green is bullish,
/// green then red bearish, anything else neutral
pub fn color_direction(first: &CandleMetrics, second: &CandleMetrics) -> Direction {
    match (first.is_red(), second.is_green) {
        (true, true) => Direction::Bullish,
        _ if first.is_green && second.is_red() => Direction::Bearish,
        _ => Direction::Neutral,
    }
}

/// `|a - b|` within `tolerance_pct` percent of their mean
pub fn near_equal(a: f64, b: f64, tolerance_pct: f64) -> bool {
    let mean = (a + b) / 2.0;
    (a - b).abs() <= mean.abs() * tolerance_pct / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    fn ts(i: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    #[test]
    fn test_candles_window() {
        let bars = (0..3)
            .map(|i| Bar::new(ts(i), 10.0 + i as f64, 12.0 + i as f64, 9.0, 11.0 + i as f64))
            .collect();
        let series = CandleSeries::new(bars).unwrap();

        assert!(candles::<3>(&series, 1).is_none());
        assert!(candles::<1>(&series, 3).is_none());
        let [a, b] = candles::<2>(&series, 2).unwrap();
        assert_eq!(a.bar.open, 11.0);
        assert_eq!(b.bar.open, 12.0);
    }

    #[test]
    fn test_body_strictly_inside() {
        let outer = Bar::new(ts(0), 10.0, 10.5, 7.5, 8.0);
        assert!(body_strictly_inside(&Bar::new(ts(1), 8.5, 9.8, 8.2, 9.5), &outer));
        // touching the edge is not strictly inside
        assert!(!body_strictly_inside(&Bar::new(ts(1), 8.0, 9.8, 7.9, 9.5), &outer));
    }

    #[test]
    fn test_trend_gate() {
        let contexts = [
            MarketContext::default(),
            MarketContext {
                trend: Some(Trend::Downtrend),
                ..Default::default()
            },
        ];
        assert!(!trend_admits(&contexts, 0, Direction::Bullish));
        assert!(trend_admits(&contexts, 1, Direction::Bullish));
        assert!(!trend_admits(&contexts, 1, Direction::Bearish));
        assert!(!trend_admits(&contexts, 1, Direction::Neutral));
    }

    #[test]
    fn test_volume_gate() {
        let contexts = [MarketContext {
            relative_volume: Some(1.2),
            ..Default::default()
        }];
        assert!(volume_admits(&contexts, 0, None));
        assert!(volume_admits(&contexts, 0, Some(Multiple::new_const(1.0))));
        assert!(!volume_admits(&contexts, 0, Some(Multiple::new_const(1.5))));
        assert!(!volume_admits(&[MarketContext::default()], 0, Some(Multiple::new_const(0.0))));
    }

    #[test]
    fn test_near_equal() {
        assert!(near_equal(100.0, 100.1, 0.2));
        assert!(!near_equal(100.0, 100.5, 0.2));
    }
}
