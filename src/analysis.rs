//! Detection output: matched bars with their trend label, and signal columns
//! built from externally supplied pattern dates.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::warn;

use crate::{
    metrics::{CandleSeries, DEFAULT_TREND_PERIOD},
    Direction, PatternDetector, PatternId, Result, SignalColumn, Trend, OHLCV,
};

/// One bar flagged by a detector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedBar {
    pub index: usize,
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// `None` while the moving average is warming up
    pub trend: Option<Trend>,
    pub direction: Direction,
}

/// Every match of one pattern over one series
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub pattern_id: PatternId,
    /// Flag column name, `is_<id>`
    pub column: String,
    pub total_bars: usize,
    pub matches: Vec<MatchedBar>,
}

impl DetectionReport {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Run `detector` over `bars` and collect the matched bars.
///
/// The trend label uses the detector's own moving-average period when it has
/// a trend gate, otherwise a 20-bar average. Short input yields an empty
/// report; malformed bars are an error.
pub fn analyze<D, T>(detector: &D, bars: &[T]) -> Result<DetectionReport>
where
    D: PatternDetector + ?Sized,
    T: OHLCV,
{
    let series = CandleSeries::from_bars(bars)?;
    Ok(analyze_series(detector, &series))
}

/// [`analyze`] over an already validated series
pub fn analyze_series<D>(detector: &D, series: &CandleSeries) -> DetectionReport
where
    D: PatternDetector + ?Sized,
{
    let signals = detector.detect(series);
    let period = detector
        .context_spec()
        .trend_period
        .unwrap_or(DEFAULT_TREND_PERIOD);
    let trend = series.trend_context(period);

    let matches = signals
        .flags()
        .iter()
        .enumerate()
        .filter_map(|(index, flag)| {
            let direction = (*flag)?;
            let bar = series.bar(index)?;
            Some(MatchedBar {
                index,
                timestamp: bar.timestamp,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                trend: trend.get(index).and_then(|p| p.trend),
                direction,
            })
        })
        .collect();

    DetectionReport {
        pattern_id: signals.pattern_id(),
        column: signals.name(),
        total_bars: series.len(),
        matches,
    }
}

/// Index of the bar whose timestamp is closest to `ts`. Ties go to the
/// earlier bar. `None` when `ts` lies outside the series.
fn nearest_index(series: &CandleSeries, ts: DateTime<FixedOffset>) -> Option<usize> {
    let bars = series.bars();
    let (first, last) = (bars.first()?, bars.last()?);
    if ts < first.timestamp || ts > last.timestamp {
        return None;
    }
    let after = bars.partition_point(|b| b.timestamp < ts);
    if after == 0 {
        return Some(0);
    }
    let before = after - 1;
    match bars.get(after) {
        Some(next) if next.timestamp - ts < ts - bars[before].timestamp => Some(after),
        _ => Some(before),
    }
}

/// Build a signal column from pattern dates found elsewhere, snapping each
/// date to the nearest bar. Dates outside the series are dropped.
pub fn mark_signals(
    series: &CandleSeries,
    pattern_id: PatternId,
    dates: &[DateTime<FixedOffset>],
) -> SignalColumn {
    let mut flags = vec![None; series.len()];
    for &date in dates {
        match nearest_index(series, date) {
            Some(i) => flags[i] = Some(Direction::Neutral),
            None => warn!(%date, pattern = %pattern_id, "pattern date outside bar series, skipped"),
        }
    }
    SignalColumn::new(pattern_id, 1, flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detectors::EngulfingDetector, Bar};
    use chrono::{Duration, TimeZone};

    fn ts(day: i64) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(5 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 9, 30, 0)
            .unwrap()
            + Duration::days(day)
    }

    fn engulfing_bars() -> Vec<Bar> {
        vec![
            Bar::new(ts(0), 10.0, 11.0, 9.0, 9.2),
            Bar::new(ts(1), 9.0, 12.0, 8.8, 11.0),
            Bar::new(ts(2), 11.0, 11.5, 10.5, 11.2),
        ]
    }

    #[test]
    fn test_analyze_reports_matched_bar() {
        let report = analyze(&EngulfingDetector::default(), &engulfing_bars()).unwrap();
        assert_eq!(report.column, "is_engulfing");
        assert_eq!(report.total_bars, 3);
        assert_eq!(report.len(), 1);

        let m = &report.matches[0];
        assert_eq!(m.index, 1);
        assert_eq!(m.timestamp, ts(1));
        assert_eq!((m.open, m.close), (9.0, 11.0));
        assert_eq!(m.direction, Direction::Bullish);
        // 20-bar average never fills on three bars
        assert_eq!(m.trend, None);
    }

    #[test]
    fn test_analyze_rejects_malformed_bars() {
        let mut bars = engulfing_bars();
        bars[2].high = 10.0;
        let err = analyze(&EngulfingDetector::default(), &bars).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidBar { index: 2, .. }));
    }

    #[test]
    fn test_mark_signals_snaps_to_nearest() {
        let series = CandleSeries::new(engulfing_bars()).unwrap();
        let dates = [ts(0) + Duration::hours(3), ts(2) - Duration::hours(2)];
        let column = mark_signals(&series, PatternId("doji"), &dates);
        assert_eq!(column.name(), "is_doji");
        assert!(column.is_set(0) && !column.is_set(1) && column.is_set(2));

        // exactly halfway snaps to the earlier bar
        let column = mark_signals(&series, PatternId("doji"), &[ts(1) + Duration::hours(12)]);
        assert!(column.is_set(1));
        assert_eq!(column.count(), 1);
    }

    #[test]
    fn test_mark_signals_drops_out_of_range_dates() {
        let series = CandleSeries::new(engulfing_bars()).unwrap();
        let column = mark_signals(
            &series,
            PatternId("doji"),
            &[ts(-1), ts(5), ts(1)],
        );
        assert_eq!(column.count(), 1);
        assert!(column.is_set(1));
    }
}
