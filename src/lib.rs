//! # candlelab
//!
//! Candlestick pattern detection and single-position backtest simulation.
//!
//! The pipeline is: raw bars → [`metrics::CandleSeries`] (per-bar geometry) →
//! a [`PatternDetector`] producing a [`SignalColumn`] → [`backtest::Simulator`]
//! producing a trade ledger → [`backtest::summarize`] producing a report.
//!
//! ## Quick Start
//!
//! ```rust
//! use candlelab::prelude::*;
//! use chrono::{FixedOffset, TimeZone};
//!
//! let tz = FixedOffset::east_opt(0).unwrap();
//! let bars = vec![
//!     Bar::new(tz.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(), 10.0, 11.0, 9.0, 9.2),
//!     Bar::new(tz.with_ymd_and_hms(2024, 1, 3, 14, 30, 0).unwrap(), 9.0, 12.0, 8.8, 11.0),
//! ];
//! let series = CandleSeries::new(bars).unwrap();
//!
//! let signals = EngulfingDetector::with_defaults().detect(&series);
//! assert_eq!(signals.direction(1), Some(Direction::Bullish));
//! ```

use chrono::{DateTime, FixedOffset};

pub mod analysis;
pub mod backtest;
pub mod data;
pub mod detectors;
pub mod metrics;
pub mod params;
pub mod registry;

pub mod prelude {
    pub use crate::{
        // Detection output
        analysis::{analyze, analyze_series, mark_signals, DetectionReport, MatchedBar},
        // Backtesting
        backtest::{
            run_pattern, summarize, BacktestConfig, BacktestParams, BacktestResult, Backtester,
            EquityPoint, ExitReason, PerformanceReport, PositionType, Simulator, Trade,
        },
        // Market data
        data::{BarCache, BarRequest, CachedProvider, InMemoryBarCache, MarketDataProvider},
        // Detectors
        detectors::*,
        // Metrics
        metrics::{
            add_trend_context, compute_metrics, CandleMetrics, CandleSeries, ContextSpec,
            MarketContext, TrendPoint,
        },
        // Parameters
        params::{
            param_bag, CandleColor, ParamBag, ParamMeta, ParamType, ParamValue,
            ParameterizedDetector, PatternBias,
        },
        // Registry
        registry::PatternRegistry,
        // Parallel
        analyze_parallel,
        backtest_parallel,
        // Core types
        Bar,
        BuiltinDetector,
        Direction,
        // Errors
        Error,
        ErrorKind,
        Multiple,
        OHLCVExt,
        PatternCategory,
        PatternDetector,
        PatternId,
        PatternMatch,
        PatternMetadata,
        Period,
        Ratio,
        Result,
        SignalColumn,
        SymbolFailure,
        SymbolOutcome,
        Trend,
        OHLCV,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by detection, simulation and configuration
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Pattern '{requested}' not found. Available patterns: {known:?}")]
    UnknownPattern {
        requested: String,
        known: Vec<String>,
    },

    #[error("No {pattern} signals found in the data, nothing to backtest")]
    NoSignalsForBacktest { pattern: String },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("Market data unavailable for {symbol}: {reason}")]
    DataSource { symbol: String, reason: String },
}

/// Coarse classification of [`Error`] for the calling layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    InsufficientData,
    UnknownPattern,
    NoSignals,
    InvalidData,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidValue(_)
            | Error::OutOfRange { .. }
            | Error::InvalidParameter { .. }
            | Error::Config(_) => ErrorKind::InvalidParameter,
            Error::InsufficientData { .. } => ErrorKind::InsufficientData,
            Error::UnknownPattern { .. } => ErrorKind::UnknownPattern,
            Error::NoSignalsForBacktest { .. } => ErrorKind::NoSignals,
            Error::InvalidBar { .. } | Error::DataSource { .. } => ErrorKind::InvalidData,
        }
    }

    pub(crate) fn invalid_param(name: impl Into<String>, reason: impl ToString) -> Self {
        Error::InvalidParameter {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

// ============================================================
// VALIDATED TYPES
// ============================================================

fn check_finite(value: f64, msg: &'static str) -> Result<()> {
    if value.is_nan() || value.is_infinite() {
        return Err(Error::InvalidValue(msg));
    }
    Ok(())
}

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        check_finite(value, "Ratio cannot be NaN or infinite")?;
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Non-negative multiplier, may exceed 1.0 (e.g. a shadow twice the body)
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Multiple(f64);

impl Multiple {
    pub fn new(value: f64) -> Result<Self> {
        check_finite(value, "Multiple cannot be NaN or infinite")?;
        if value < 0.0 {
            return Err(Error::OutOfRange {
                field: "Multiple",
                value,
                min: 0.0,
                max: f64::MAX,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Multiple {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Multiple {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Multiple::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// BARS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn timestamp(&self) -> DateTime<FixedOffset>;
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;

    fn volume(&self) -> Option<f64> {
        None
    }
}

/// One OHLCV observation, timestamped in exchange-local time
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<FixedOffset>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl Bar {
    pub fn new(timestamp: DateTime<FixedOffset>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume = Some(volume);
        self
    }

    pub(crate) fn from_ohlcv<T: OHLCV>(bar: &T) -> Self {
        Self {
            timestamp: bar.timestamp(),
            open: bar.open(),
            high: bar.high(),
            low: bar.low(),
            close: bar.close(),
            volume: bar.volume(),
        }
    }
}

impl OHLCV for Bar {
    fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> Option<f64> {
        self.volume
    }
}

/// Extension trait with candle geometry computed from OHLC
pub trait OHLCVExt: OHLCV {
    /// Signed body, `close - open`
    #[inline]
    fn body(&self) -> f64 {
        self.close() - self.open()
    }

    #[inline]
    fn body_size(&self) -> f64 {
        self.body().abs()
    }

    #[inline]
    fn total_range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn body_top(&self) -> f64 {
        self.open().max(self.close())
    }

    #[inline]
    fn body_bottom(&self) -> f64 {
        self.open().min(self.close())
    }

    /// Midpoint of the body
    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
    }

    #[inline]
    fn upper_shadow(&self) -> f64 {
        self.high() - self.body_top()
    }

    #[inline]
    fn lower_shadow(&self) -> f64 {
        self.body_bottom() - self.low()
    }

    #[inline]
    fn is_green(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_red(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range is zero
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.total_range();
        (range > 0.0).then(|| self.body_size() / range)
    }

    #[inline]
    fn upper_shadow_ratio(&self) -> Option<f64> {
        let range = self.total_range();
        (range > 0.0).then(|| self.upper_shadow() / range)
    }

    #[inline]
    fn lower_shadow_ratio(&self) -> Option<f64> {
        let range = self.total_range();
        (range > 0.0).then(|| self.lower_shadow() / range)
    }

    /// Validate OHLC consistency
    fn validate(&self) -> Result<()> {
        let invalid = |reason| Err(Error::InvalidBar { index: 0, reason });
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return invalid("NaN in OHLC");
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return invalid("Infinite value in OHLC");
        }
        if prices.iter().any(|p| *p <= 0.0) {
            return invalid("non-positive price");
        }
        if self.high() < self.low() {
            return invalid("high < low");
        }
        if self.high() < self.body_top() || self.low() > self.body_bottom() {
            return invalid("open/close outside high/low");
        }
        if let Some(v) = self.volume() {
            if v.is_nan() || v < 0.0 {
                return invalid("negative or NaN volume");
            }
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// DIRECTION & TREND
// ============================================================

/// Direction/bias of a detected pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Neutral,
    Bearish,
}

impl Direction {
    #[inline]
    pub fn is_bullish(self) -> bool {
        matches!(self, Direction::Bullish)
    }

    #[inline]
    pub fn is_bearish(self) -> bool {
        matches!(self, Direction::Bearish)
    }
}

/// Trend label of a bar relative to its moving average
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

impl Trend {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Trend::Uptrend)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Trend::Downtrend)
    }
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Uptrend => write!(f, "uptrend"),
            Trend::Downtrend => write!(f, "downtrend"),
        }
    }
}

// ============================================================
// PATTERN MATCH & SIGNAL COLUMN
// ============================================================

/// Unique identifier for a pattern type (e.g. `"hammer"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct PatternId(pub &'static str);

impl PatternId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Name of the flag column this pattern produces, e.g. `is_hammer`
    pub fn column_name(&self) -> String {
        format!("is_{}", self.0)
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// One flagged formation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub direction: Direction,
    pub start_index: usize,
    pub end_index: usize,
}

/// Tri-state flag column produced by one detector run: `None` where the
/// pattern is absent, otherwise its classified direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalColumn {
    pattern_id: PatternId,
    span: usize,
    flags: Vec<Option<Direction>>,
}

impl SignalColumn {
    pub fn new(pattern_id: PatternId, span: usize, flags: Vec<Option<Direction>>) -> Self {
        Self {
            pattern_id,
            span: span.max(1),
            flags,
        }
    }

    /// Build a column from plain booleans, flagged bars classified neutral
    pub fn from_bools(pattern_id: PatternId, flags: impl IntoIterator<Item = bool>) -> Self {
        let flags = flags
            .into_iter()
            .map(|set| set.then_some(Direction::Neutral))
            .collect();
        Self::new(pattern_id, 1, flags)
    }

    #[inline]
    pub fn pattern_id(&self) -> PatternId {
        self.pattern_id
    }

    pub fn name(&self) -> String {
        self.pattern_id.column_name()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    #[inline]
    pub fn is_set(&self, index: usize) -> bool {
        self.direction(index).is_some()
    }

    #[inline]
    pub fn direction(&self, index: usize) -> Option<Direction> {
        self.flags.get(index).copied().flatten()
    }

    pub fn flags(&self) -> &[Option<Direction>] {
        &self.flags
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|f| f.is_some()).count()
    }

    pub fn matches(&self) -> impl Iterator<Item = PatternMatch> + '_ {
        self.flags.iter().enumerate().filter_map(move |(i, f)| {
            f.map(|direction| PatternMatch {
                pattern_id: self.pattern_id,
                direction,
                start_index: (i + 1).saturating_sub(self.span),
                end_index: i,
            })
        })
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

use metrics::{CandleSeries, ContextSpec, MarketContext};

/// Category of pattern by number of bars
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternCategory {
    SingleBar,
    TwoBar,
    ThreeBar,
}

/// Descriptive metadata about a pattern
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatternMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub category: PatternCategory,
    /// `None` for patterns that can fire in either direction
    pub typical_direction: Option<Direction>,
}

/// Stateless predicate over a candle series.
///
/// Implementors decide a single bar through [`detect_at`](Self::detect_at);
/// the provided [`detect`](Self::detect) runs it over every bar, skipping the
/// warm-up bars of multi-bar patterns and any zero-range bar.
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;

    /// Number of bars the formation spans
    fn min_bars(&self) -> usize;

    /// Derived context (trend, volume, body averages) this detector reads
    fn context_spec(&self) -> ContextSpec {
        ContextSpec::default()
    }

    /// Classify the formation ending at `index`, `None` if absent.
    /// `contexts` holds one entry per bar, built from [`context_spec`](Self::context_spec).
    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction>;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: self.id().0,
            description: "",
            category: match self.min_bars() {
                1 => PatternCategory::SingleBar,
                2 => PatternCategory::TwoBar,
                _ => PatternCategory::ThreeBar,
            },
            typical_direction: None,
        }
    }

    fn detect(&self, series: &CandleSeries) -> SignalColumn {
        let span = self.min_bars().max(1);
        let contexts = series.contexts(&self.context_spec());
        let flags = (0..series.len())
            .map(|i| {
                if i + 1 < span {
                    return None;
                }
                if !series.metric(i).is_some_and(|m| m.is_eligible()) {
                    return None;
                }
                self.detect_at(series, i, &contexts)
            })
            .collect();
        SignalColumn::new(self.id(), span, flags)
    }
}

impl<D: PatternDetector + ?Sized> PatternDetector for Box<D> {
    fn id(&self) -> PatternId {
        (**self).id()
    }

    fn min_bars(&self) -> usize {
        (**self).min_bars()
    }

    fn context_spec(&self) -> ContextSpec {
        (**self).context_spec()
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        (**self).detect_at(series, index, contexts)
    }

    fn validate_config(&self) -> Result<()> {
        (**self).validate_config()
    }

    fn metadata(&self) -> PatternMetadata {
        (**self).metadata()
    }

    fn detect(&self, series: &CandleSeries) -> SignalColumn {
        (**self).detect(series)
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate the BuiltinDetector tagged union without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors with their parameters, one variant per pattern.
        ///
        /// Serialized with a `pattern` tag holding the snake_case pattern id, so a
        /// configuration reads `{ pattern = "hammer", body_size_ratio = 0.25 }`.
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(tag = "pattern", rename_all = "snake_case")]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            /// Every builtin pattern with default parameters
            pub fn all_defaults() -> Vec<Self> {
                vec![$(Self::$variant(<$detector>::default())),*]
            }
        }

        impl PatternDetector for BuiltinDetector {
            #[inline]
            fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => d.id()),*
                }
            }

            #[inline]
            fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => d.min_bars()),*
                }
            }

            fn context_spec(&self) -> ContextSpec {
                match self {
                    $(Self::$variant(d) => d.context_spec()),*
                }
            }

            #[inline]
            fn detect_at(
                &self,
                series: &CandleSeries,
                index: usize,
                contexts: &[MarketContext],
            ) -> Option<Direction> {
                match self {
                    $(Self::$variant(d) => d.detect_at(series, index, contexts)),*
                }
            }

            fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => d.validate_config()),*
                }
            }

            fn metadata(&self) -> PatternMetadata {
                match self {
                    $(Self::$variant(d) => d.metadata()),*
                }
            }
        }

        $(impl From<$detector> for BuiltinDetector {
            fn from(d: $detector) -> Self {
                Self::$variant(d)
            }
        })*
    };
}

define_builtin_detectors! {
    // Single bar
    Hammer(HammerDetector),
    ShootingStar(ShootingStarDetector),
    Doji(DojiDetector),
    Marubozu(MarubozuDetector),
    ElephantBar(ElephantBarDetector),

    // Two bar
    Engulfing(EngulfingDetector),
    Harami(HaramiDetector),
    PiercingLine(PiercingLineDetector),
    DarkCloudCover(DarkCloudCoverDetector),
    TweezerTop(TweezerTopDetector),
    TweezerBottom(TweezerBottomDetector),
    Kicker(KickerDetector),
    CounterAttack(CounterAttackDetector),

    // Three bar
    ThreeWhiteSoldiers(ThreeWhiteSoldiersDetector),
    ThreeBlackCrows(ThreeBlackCrowsDetector),
    MorningStar(MorningStarDetector),
    EveningStar(EveningStarDetector),
    ThreeInsideUp(ThreeInsideUpDetector),
    ThreeInsideDown(ThreeInsideDownDetector),
}

// ============================================================
// PARALLEL RUNS
// ============================================================

use rayon::prelude::*;

/// Output of one instrument's run
#[derive(Debug)]
pub struct SymbolOutcome<T> {
    pub symbol: String,
    pub output: T,
}

/// Error from one instrument's run
#[derive(Debug)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: Error,
}

fn partition_outcomes<T>(
    results: Vec<std::result::Result<SymbolOutcome<T>, SymbolFailure>>,
) -> (Vec<SymbolOutcome<T>>, Vec<SymbolFailure>) {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => failures.push(e),
        }
    }

    (successes, failures)
}

fn run_symbol<T>(symbol: &str, result: Result<T>) -> std::result::Result<SymbolOutcome<T>, SymbolFailure> {
    result
        .map(|output| SymbolOutcome {
            symbol: symbol.to_string(),
            output,
        })
        .map_err(|error| SymbolFailure {
            symbol: symbol.to_string(),
            error,
        })
}

/// Run one detector over many independent instruments in parallel
pub fn analyze_parallel<'a, D, T, I>(
    detector: &D,
    instruments: I,
) -> (Vec<SymbolOutcome<analysis::DetectionReport>>, Vec<SymbolFailure>)
where
    D: PatternDetector + ?Sized,
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| run_symbol(symbol, analysis::analyze(detector, bars)))
        .collect();

    partition_outcomes(results)
}

/// Backtest many independent instruments in parallel. Each run is sequential.
pub fn backtest_parallel<'a, D, T, I>(
    backtester: &backtest::Backtester<D>,
    instruments: I,
) -> (Vec<SymbolOutcome<backtest::BacktestResult>>, Vec<SymbolFailure>)
where
    D: PatternDetector,
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            let result = CandleSeries::from_bars(bars).and_then(|s| backtester.run(&s));
            run_symbol(symbol, result)
        })
        .collect();

    partition_outcomes(results)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(i: i64) -> DateTime<FixedOffset> {
        let tz = FixedOffset::east_opt(-5 * 3600).unwrap();
        tz.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap() + Duration::hours(i)
    }

    fn make_downtrend_bars() -> Vec<Bar> {
        (0..20)
            .map(|i| {
                let base = 100.0 - i as f64 * 2.0;
                Bar::new(ts(i), base, base + 1.0, base - 1.0, base - 0.5)
            })
            .collect()
    }

    fn make_uptrend_bars() -> Vec<Bar> {
        (0..20)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                Bar::new(ts(i), base, base + 1.0, base - 1.0, base + 0.5)
            })
            .collect()
    }

    #[test]
    fn test_ratio_validation() {
        assert!(Ratio::new(0.0).is_ok());
        assert!(Ratio::new(1.0).is_ok());
        assert!(Ratio::new(0.5).is_ok());
        assert!(Ratio::new(-0.1).is_err());
        assert!(Ratio::new(1.1).is_err());
        assert!(Ratio::new(f64::NAN).is_err());
        assert!(Ratio::new(f64::INFINITY).is_err());
    }

    #[test]
    fn test_multiple_validation() {
        assert!(Multiple::new(0.0).is_ok());
        assert!(Multiple::new(2.5).is_ok());
        assert!(Multiple::new(-0.5).is_err());
        assert!(Multiple::new(f64::NAN).is_err());
    }

    #[test]
    fn test_period_validation() {
        assert!(Period::new(1).is_ok());
        assert!(Period::new(100).is_ok());
        assert!(Period::new(0).is_err());
    }

    #[test]
    fn test_ohlcv_ext() {
        let bar = Bar::new(ts(0), 100.0, 110.0, 90.0, 105.0);
        assert_eq!(bar.body(), 5.0);
        assert_eq!(bar.body_size(), 5.0);
        assert_eq!(bar.total_range(), 20.0);
        assert_eq!(bar.upper_shadow(), 5.0);
        assert_eq!(bar.lower_shadow(), 10.0);
        assert!(bar.is_green());
        assert!(!bar.is_red());
        assert!((bar.body_ratio().unwrap() - 0.25).abs() < 0.001);

        let red = Bar::new(ts(0), 105.0, 110.0, 90.0, 100.0);
        assert_eq!(red.body(), -5.0);
        assert_eq!(red.body_size(), 5.0);
    }

    #[test]
    fn test_zero_range_ratios_are_none() {
        let flat = Bar::new(ts(0), 50.0, 50.0, 50.0, 50.0);
        assert!(flat.body_ratio().is_none());
        assert!(flat.upper_shadow_ratio().is_none());
        assert!(flat.lower_shadow_ratio().is_none());
        assert!(flat.validate().is_ok());
    }

    #[test]
    fn test_bar_validation() {
        assert!(Bar::new(ts(0), 10.0, 9.0, 11.0, 10.0).validate().is_err());
        assert!(Bar::new(ts(0), 12.0, 11.0, 9.0, 10.0).validate().is_err());
        assert!(Bar::new(ts(0), f64::NAN, 11.0, 9.0, 10.0).validate().is_err());
        assert!(Bar::new(ts(0), 10.0, 11.0, 9.0, 10.0)
            .with_volume(-1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_error_kinds() {
        let err = Error::UnknownPattern {
            requested: "nope".into(),
            known: vec!["hammer".into()],
        };
        assert_eq!(err.kind(), ErrorKind::UnknownPattern);
        assert!(err.to_string().contains("nope"));
        assert!(err.to_string().contains("hammer"));
        assert_eq!(
            Error::invalid_param("ma_period", "must be > 0").kind(),
            ErrorKind::InvalidParameter
        );
    }

    #[test]
    fn test_signal_column_matches() {
        let column = SignalColumn::new(
            PatternId("engulfing"),
            2,
            vec![None, Some(Direction::Bullish), None, Some(Direction::Bearish)],
        );
        assert_eq!(column.name(), "is_engulfing");
        assert_eq!(column.count(), 2);
        let matches: Vec<_> = column.matches().collect();
        assert_eq!(matches[0].start_index, 0);
        assert_eq!(matches[0].end_index, 1);
        assert_eq!(matches[1].direction, Direction::Bearish);
        assert!(!column.is_set(99));
    }

    #[test]
    fn test_all_defaults_count() {
        let all = BuiltinDetector::all_defaults();
        assert_eq!(all.len(), 19);
        for d in &all {
            assert!(d.validate_config().is_ok(), "{} defaults invalid", d.id());
        }
    }

    #[test]
    fn test_builtin_detector_tagged_serde() {
        let detector: BuiltinDetector =
            serde_json::from_str(r#"{"pattern":"hammer","body_size_ratio":0.25}"#).unwrap();
        match &detector {
            BuiltinDetector::Hammer(h) => {
                assert_eq!(h.body_size_ratio.get(), 0.25);
                assert_eq!(h.lower_shadow_ratio.get(), 2.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        let json = serde_json::to_string(&detector).unwrap();
        assert!(json.contains(r#""pattern":"hammer""#));
    }

    #[test]
    fn test_detect_skips_warmup_bars() {
        let series = CandleSeries::new(make_downtrend_bars()).unwrap();
        let column = BuiltinDetector::from(ThreeBlackCrowsDetector::with_defaults()).detect(&series);
        assert_eq!(column.len(), series.len());
        assert!(!column.is_set(0));
        assert!(!column.is_set(1));
    }

    #[test]
    fn test_analyze_parallel() {
        let detector = BuiltinDetector::from(DojiDetector::with_defaults());
        let bars1 = make_downtrend_bars();
        let bars2 = make_uptrend_bars();
        let broken = vec![Bar::new(ts(0), 10.0, 9.0, 11.0, 10.0)];

        let instruments: Vec<(&str, &[Bar])> =
            vec![("AAPL", &bars1[..]), ("GOOGL", &bars2[..]), ("BAD", &broken[..])];

        let (results, errors) = analyze_parallel(&detector, instruments);
        assert_eq!(results.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].symbol, "BAD");
        assert_eq!(errors[0].error.kind(), ErrorKind::InvalidData);
    }
}
