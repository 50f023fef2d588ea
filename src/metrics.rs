//! Per-bar candle geometry and derived context.
//!
//! [`CandleSeries`] owns a validated private copy of the caller's bars plus
//! their [`CandleMetrics`]. Trend labels, relative volume and trailing body
//! averages are derived on demand for whatever period a detector asks for;
//! nothing is ever written back into the bars.

use serde::Serialize;

use crate::{Bar, Error, OHLCVExt, Period, Result, Trend, OHLCV};

/// Moving-average period for trend labels when a detector does not pick one
pub const DEFAULT_TREND_PERIOD: Period = Period::new_const(20);

// ============================================================
// CANDLE METRICS
// ============================================================

/// Geometric features of a single bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandleMetrics {
    /// `close - open`
    pub body: f64,
    pub body_size: f64,
    pub total_range: f64,
    pub upper_shadow: f64,
    pub lower_shadow: f64,
    pub is_green: bool,
}

impl CandleMetrics {
    pub fn of<T: OHLCV>(bar: &T) -> Self {
        Self {
            body: bar.body(),
            body_size: bar.body_size(),
            total_range: bar.total_range(),
            upper_shadow: bar.upper_shadow(),
            lower_shadow: bar.lower_shadow(),
            is_green: bar.is_green(),
        }
    }

    /// Zero-range bars never take part in pattern tests
    #[inline]
    pub fn is_eligible(&self) -> bool {
        self.total_range > 0.0
    }

    #[inline]
    pub fn is_red(&self) -> bool {
        self.body < 0.0
    }

    /// `body_size >= ratio * total_range`, false on a zero range
    #[inline]
    pub fn body_at_least(&self, ratio: f64) -> bool {
        self.is_eligible() && self.body_size >= ratio * self.total_range
    }

    /// Both shadows `<= ratio * total_range`, false on a zero range
    #[inline]
    pub fn shadows_within(&self, ratio: f64) -> bool {
        let limit = ratio * self.total_range;
        self.is_eligible() && self.upper_shadow <= limit && self.lower_shadow <= limit
    }
}

/// Compute [`CandleMetrics`] for every bar. Pure and total.
pub fn compute_metrics<T: OHLCV>(bars: &[T]) -> Vec<CandleMetrics> {
    bars.iter().map(CandleMetrics::of).collect()
}

// ============================================================
// TREND & ROLLING AVERAGES
// ============================================================

/// Moving average of close and the resulting trend label at one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TrendPoint {
    pub sma: Option<f64>,
    pub trend: Option<Trend>,
}

/// Rolling mean over `window` values ending at each index (inclusive).
/// `None` until the window fills, or when any value in it is missing.
pub fn rolling_mean(values: &[Option<f64>], window: Period) -> Vec<Option<f64>> {
    let w = window.get();
    (0..values.len())
        .map(|i| {
            if i + 1 < w {
                return None;
            }
            let slice = &values[i + 1 - w..=i];
            let sum = slice.iter().try_fold(0.0, |acc, v| v.map(|v| acc + v))?;
            Some(sum / w as f64)
        })
        .collect()
}

/// Simple moving average of close over `period` bars and the trend label:
/// uptrend when close is above its average, downtrend otherwise. Bars before
/// the window fills carry no trend.
pub fn add_trend_context<T: OHLCV>(bars: &[T], period: Period) -> Vec<TrendPoint> {
    let closes: Vec<Option<f64>> = bars.iter().map(|b| Some(b.close())).collect();
    rolling_mean(&closes, period)
        .into_iter()
        .zip(bars)
        .map(|(sma, bar)| TrendPoint {
            sma,
            trend: sma.map(|ma| {
                if bar.close() > ma {
                    Trend::Uptrend
                } else {
                    Trend::Downtrend
                }
            }),
        })
        .collect()
}

/// `volume / rolling_mean(volume, lookback)`. `None` while the window is
/// unfilled, when volume is missing, or when the average is zero.
pub fn relative_volume<T: OHLCV>(bars: &[T], lookback: Period) -> Vec<Option<f64>> {
    let volumes: Vec<Option<f64>> = bars.iter().map(|b| b.volume()).collect();
    rolling_mean(&volumes, lookback)
        .into_iter()
        .zip(&volumes)
        .map(|(avg, v)| match (avg, v) {
            (Some(avg), Some(v)) if avg > 0.0 => Some(v / avg),
            _ => None,
        })
        .collect()
}

// ============================================================
// MARKET CONTEXT
// ============================================================

/// Which derived context a detector needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextSpec {
    pub trend_period: Option<Period>,
    pub volume_lookback: Option<Period>,
    pub body_lookback: Option<Period>,
}

/// Derived context at a specific bar. Fields not requested are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketContext {
    pub sma: Option<f64>,
    pub trend: Option<Trend>,
    pub relative_volume: Option<f64>,
    /// Mean body size over the body lookback, current bar included
    pub avg_body: Option<f64>,
}

// ============================================================
// CANDLE SERIES
// ============================================================

/// Validated, immutable bar sequence with its candle metrics
#[derive(Debug, Clone, PartialEq)]
pub struct CandleSeries {
    bars: Vec<Bar>,
    metrics: Vec<CandleMetrics>,
}

impl CandleSeries {
    /// Validate bars (well-formed OHLC, strictly increasing timestamps) and
    /// compute their metrics
    pub fn new(bars: Vec<Bar>) -> Result<Self> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                Error::InvalidBar { reason, .. } => Error::InvalidBar { index: i, reason },
                other => other,
            })?;
        }
        if let Some(i) = bars
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(Error::InvalidBar {
                index: i + 1,
                reason: "timestamps must be strictly increasing",
            });
        }
        let metrics = compute_metrics(&bars);
        Ok(Self { bars, metrics })
    }

    /// Copy any OHLCV source into a new series
    pub fn from_bars<T: OHLCV>(bars: &[T]) -> Result<Self> {
        Self::new(bars.iter().map(Bar::from_ohlcv).collect())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn metrics(&self) -> &[CandleMetrics] {
        &self.metrics
    }

    #[inline]
    pub fn bar(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    #[inline]
    pub fn metric(&self, index: usize) -> Option<&CandleMetrics> {
        self.metrics.get(index)
    }

    pub fn trend_context(&self, period: Period) -> Vec<TrendPoint> {
        add_trend_context(&self.bars, period)
    }

    pub fn relative_volume(&self, lookback: Period) -> Vec<Option<f64>> {
        relative_volume(&self.bars, lookback)
    }

    /// Mean body size over `lookback` bars ending at each index
    pub fn trailing_avg_body(&self, lookback: Period) -> Vec<Option<f64>> {
        let bodies: Vec<Option<f64>> = self.metrics.iter().map(|m| Some(m.body_size)).collect();
        rolling_mean(&bodies, lookback)
    }

    /// Precompute the requested context for every bar
    pub fn contexts(&self, spec: &ContextSpec) -> Vec<MarketContext> {
        let mut contexts = vec![MarketContext::default(); self.len()];

        if let Some(period) = spec.trend_period {
            for (ctx, point) in contexts.iter_mut().zip(self.trend_context(period)) {
                ctx.sma = point.sma;
                ctx.trend = point.trend;
            }
        }
        if let Some(lookback) = spec.volume_lookback {
            for (ctx, rv) in contexts.iter_mut().zip(self.relative_volume(lookback)) {
                ctx.relative_volume = rv;
            }
        }
        if let Some(lookback) = spec.body_lookback {
            for (ctx, avg) in contexts.iter_mut().zip(self.trailing_avg_body(lookback)) {
                ctx.avg_body = avg;
            }
        }

        contexts
    }
}

// ============================================================
// TESTS
// ============================================================

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

    fn closes(values: &[f64]) -> Vec<Bar> {
        values
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(ts(i as i64), c, c + 1.0, c - 1.0, c).with_volume(100.0))
            .collect()
    }

    #[test]
    fn test_metrics_of_hammer_bar() {
        let m = CandleMetrics::of(&Bar::new(ts(0), 100.0, 101.0, 95.0, 100.5));
        assert!((m.body - 0.5).abs() < 1e-12);
        assert!((m.body_size - 0.5).abs() < 1e-12);
        assert!((m.total_range - 6.0).abs() < 1e-12);
        assert!((m.lower_shadow - 5.0).abs() < 1e-12);
        assert!((m.upper_shadow - 0.5).abs() < 1e-12);
        assert!(m.is_green);
        assert!(m.is_eligible());
    }

    #[test]
    fn test_zero_range_helpers_are_false() {
        let m = CandleMetrics::of(&Bar::new(ts(0), 10.0, 10.0, 10.0, 10.0));
        assert!(!m.is_eligible());
        assert!(!m.body_at_least(0.0));
        assert!(!m.shadows_within(1.0));
    }

    #[test]
    fn test_trend_warmup_is_undefined() {
        let bars = closes(&[10.0, 11.0, 12.0, 11.0, 9.0]);
        let trend = add_trend_context(&bars, Period::new(3).unwrap());

        assert_eq!(trend[0], TrendPoint::default());
        assert_eq!(trend[1], TrendPoint::default());
        assert_eq!(trend[2].sma, Some(11.0));
        assert_eq!(trend[2].trend, Some(Trend::Uptrend));
        // close below its average
        assert_eq!(trend[3].trend, Some(Trend::Downtrend));
        assert_eq!(trend[4].trend, Some(Trend::Downtrend));
    }

    #[test]
    fn test_relative_volume() {
        let mut bars = closes(&[10.0, 10.0, 10.0, 10.0]);
        bars[3].volume = Some(250.0);
        let rv = relative_volume(&bars, Period::new(2).unwrap());
        assert_eq!(rv[0], None);
        assert_eq!(rv[1], Some(1.0));
        assert!((rv[3].unwrap() - 250.0 / 175.0).abs() < 1e-12);

        bars[2].volume = None;
        let rv = relative_volume(&bars, Period::new(2).unwrap());
        assert_eq!(rv[2], None);
        assert_eq!(rv[3], None);
    }

    #[test]
    fn test_series_rejects_unordered_timestamps() {
        let mut bars = closes(&[10.0, 11.0, 12.0]);
        bars[2].timestamp = bars[1].timestamp;
        let err = CandleSeries::new(bars).unwrap_err();
        assert!(matches!(err, Error::InvalidBar { index: 2, .. }));
    }

    #[test]
    fn test_series_reports_bad_bar_index() {
        let mut bars = closes(&[10.0, 11.0, 12.0]);
        bars[1].high = 5.0;
        let err = CandleSeries::new(bars).unwrap_err();
        assert!(matches!(err, Error::InvalidBar { index: 1, .. }));
    }

    #[test]
    fn test_contexts_only_fill_requested_fields() {
        let series = CandleSeries::new(closes(&[10.0, 11.0, 12.0, 13.0])).unwrap();
        let spec = ContextSpec {
            trend_period: Some(Period::new(2).unwrap()),
            ..Default::default()
        };
        let contexts = series.contexts(&spec);
        assert_eq!(contexts.len(), 4);
        assert_eq!(contexts[3].trend, Some(Trend::Uptrend));
        assert!(contexts.iter().all(|c| c.relative_volume.is_none()));
        assert!(contexts.iter().all(|c| c.avg_body.is_none()));
    }

    #[test]
    fn test_empty_series() {
        let series = CandleSeries::new(Vec::new()).unwrap();
        assert!(series.is_empty());
        assert!(series.contexts(&ContextSpec::default()).is_empty());
    }
}
