//! Two-bar candlestick pattern detectors
//!
//! Engulfing, Harami, Piercing Line, Dark Cloud Cover, Tweezer Top/Bottom,
//! Kicker, Counter-Attack. The lead candle for trend gating is the first bar.

use serde::{Deserialize, Serialize};

use super::helpers::{
    body_strictly_inside, candles, color_direction, near_equal, trend_gate, trend_spec,
};
use crate::{
    metrics::{CandleSeries, ContextSpec, MarketContext},
    params::{
        get_choice, get_flag, get_multiple, get_period, get_ratio, validate_bag, ParamBag,
        ParamMeta, ParameterizedDetector, PatternBias,
    },
    Direction, Multiple, OHLCVExt, PatternCategory, PatternDetector, PatternId, PatternMetadata,
    Period, Ratio, Result,
};

impl_with_defaults!(
    EngulfingDetector,
    HaramiDetector,
    PiercingLineDetector,
    DarkCloudCoverDetector,
    TweezerTopDetector,
    TweezerBottomDetector,
    KickerDetector,
    CounterAttackDetector,
);

const DEFAULT_MA_PERIOD: Period = Period::new_const(20);

fn two_bar_metadata(
    name: &'static str,
    description: &'static str,
    typical_direction: Option<Direction>,
) -> PatternMetadata {
    PatternMetadata {
        name,
        description,
        category: PatternCategory::TwoBar,
        typical_direction,
    }
}

// ============================================================
// ENGULFING / HARAMI
// ============================================================

/// Engulfing - second body strictly contains the first, opposite colors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngulfingDetector {
    /// Engulfing body >= ratio * its range
    pub body_size_ratio: Ratio,
    pub engulfing_type: PatternBias,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for EngulfingDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            engulfing_type: PatternBias::Both,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for EngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId("engulfing")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let (p, c) = (prev.bar, curr.bar);
        if !curr.metrics.body_at_least(self.body_size_ratio.get()) {
            return None;
        }

        let direction = if p.is_red() && c.is_green() && c.open < p.close && c.close > p.open {
            Direction::Bullish
        } else if p.is_green() && c.is_red() && c.open > p.close && c.close < p.open {
            Direction::Bearish
        } else {
            return None;
        };

        (self.engulfing_type.admits(direction)
            && trend_gate(self.require_trend, contexts, index - 1, direction))
        .then_some(direction)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Engulfing",
            "Second body fully engulfs the first body of opposite color; reversal",
            None,
        )
    }
}

/// Harami - second body strictly inside a large first body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HaramiDetector {
    /// First body >= ratio * its range
    pub body_size_ratio: Ratio,
    /// `both` also admits same-colored (neutral) harami
    pub harami_type: PatternBias,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for HaramiDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            harami_type: PatternBias::Both,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for HaramiDetector {
    fn id(&self) -> PatternId {
        PatternId("harami")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        if !prev.metrics.body_at_least(self.body_size_ratio.get())
            || !body_strictly_inside(curr.bar, prev.bar)
        {
            return None;
        }

        let direction = color_direction(prev.metrics, curr.metrics);
        (self.harami_type.admits(direction)
            && trend_gate(self.require_trend, contexts, index - 1, direction))
        .then_some(direction)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Harami",
            "Small second body contained within a large first body; loss of momentum",
            None,
        )
    }
}

// ============================================================
// PIERCING LINE / DARK CLOUD COVER
// ============================================================

/// Piercing Line - green candle opens below the prior low and closes deep
/// into the prior red body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PiercingLineDetector {
    /// Both bodies >= ratio * range
    pub body_size_ratio: Ratio,
    /// Fraction of the first body recovered, measured from its close
    pub penetration_ratio: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for PiercingLineDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            penetration_ratio: Ratio::new_const(0.5),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for PiercingLineDetector {
    fn id(&self) -> PatternId {
        PatternId("piercing_line")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let (p, c) = (prev.bar, curr.bar);
        let ratio = self.body_size_ratio.get();
        if !(p.is_red() && c.is_green())
            || !prev.metrics.body_at_least(ratio)
            || !curr.metrics.body_at_least(ratio)
        {
            return None;
        }

        let penetration = (c.close - p.close) / p.body_size();
        let matched = c.open < p.low
            && c.close > p.body_mid()
            && penetration >= self.penetration_ratio.get()
            && trend_gate(self.require_trend, contexts, index - 1, Direction::Bullish);
        matched.then_some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Piercing Line",
            "Gap down then a close above the midpoint of the prior red body",
            Some(Direction::Bullish),
        )
    }
}

/// Dark Cloud Cover - red candle opens above the prior high and closes deep
/// into the prior green body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DarkCloudCoverDetector {
    /// First body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Second body >= ratio * range
    pub confirm_body_ratio: Ratio,
    /// Each shadow of both candles <= ratio * range
    pub max_shadow_ratio: Ratio,
    /// Fraction of the first body given back, measured from its close
    pub penetration_ratio: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for DarkCloudCoverDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            confirm_body_ratio: Ratio::new_const(0.3),
            max_shadow_ratio: Ratio::new_const(0.3),
            penetration_ratio: Ratio::new_const(0.5),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for DarkCloudCoverDetector {
    fn id(&self) -> PatternId {
        PatternId("dark_cloud_cover")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let (p, c) = (prev.bar, curr.bar);
        let shadows = self.max_shadow_ratio.get();
        if !(p.is_green() && c.is_red())
            || !prev.metrics.body_at_least(self.body_size_ratio.get())
            || !prev.metrics.shadows_within(shadows)
            || !curr.metrics.body_at_least(self.confirm_body_ratio.get())
            || !curr.metrics.shadows_within(shadows)
        {
            return None;
        }

        let penetration = (p.close - c.close) / p.body_size();
        let matched = c.open > p.high
            && c.close < p.body_mid()
            && penetration >= self.penetration_ratio.get()
            && trend_gate(self.require_trend, contexts, index - 1, Direction::Bearish);
        matched.then_some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Dark Cloud Cover",
            "Gap up then a close below the midpoint of the prior green body",
            Some(Direction::Bearish),
        )
    }
}

// ============================================================
// TWEEZERS
// ============================================================

/// Tweezer Top - green then red with near-equal highs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweezerTopDetector {
    /// Both bodies >= ratio * range
    pub body_size_ratio: Ratio,
    /// Allowed difference between highs, in percent of their mean
    pub tolerance_pct: Multiple,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for TweezerTopDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            tolerance_pct: Multiple::new_const(0.2),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for TweezerTopDetector {
    fn id(&self) -> PatternId {
        PatternId("tweezer_top")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let ratio = self.body_size_ratio.get();
        let matched = prev.bar.is_green()
            && curr.bar.is_red()
            && prev.metrics.body_at_least(ratio)
            && curr.metrics.body_at_least(ratio)
            && near_equal(prev.bar.high, curr.bar.high, self.tolerance_pct.get())
            && trend_gate(self.require_trend, contexts, index - 1, Direction::Bearish);
        matched.then_some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Tweezer Top",
            "Two candles of opposite color rejected at the same high",
            Some(Direction::Bearish),
        )
    }
}

/// Tweezer Bottom - red then green with near-equal lows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweezerBottomDetector {
    /// Both bodies >= ratio * range
    pub body_size_ratio: Ratio,
    /// Allowed difference between lows, in percent of their mean
    pub tolerance_pct: Multiple,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for TweezerBottomDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            tolerance_pct: Multiple::new_const(0.2),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for TweezerBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("tweezer_bottom")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let ratio = self.body_size_ratio.get();
        let matched = prev.bar.is_red()
            && curr.bar.is_green()
            && prev.metrics.body_at_least(ratio)
            && curr.metrics.body_at_least(ratio)
            && near_equal(prev.bar.low, curr.bar.low, self.tolerance_pct.get())
            && trend_gate(self.require_trend, contexts, index - 1, Direction::Bullish);
        matched.then_some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Tweezer Bottom",
            "Two candles of opposite color supported at the same low",
            Some(Direction::Bullish),
        )
    }
}

// ============================================================
// KICKER / COUNTER-ATTACK
// ============================================================

/// Kicker - second candle gaps clear of the first body and runs away from it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KickerDetector {
    /// Both bodies >= ratio * range
    pub body_size_ratio: Ratio,
    /// Minimum gap between the bodies, in percent of the first close
    pub gap_pct: Multiple,
    pub kicker_type: PatternBias,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for KickerDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            gap_pct: Multiple::new_const(0.5),
            kicker_type: PatternBias::Both,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for KickerDetector {
    fn id(&self) -> PatternId {
        PatternId("kicker")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let (p, c) = (prev.bar, curr.bar);
        let ratio = self.body_size_ratio.get();
        if !prev.metrics.body_at_least(ratio) || !curr.metrics.body_at_least(ratio) {
            return None;
        }

        let (direction, gap) = if c.is_green() && c.open > p.body_top() {
            (Direction::Bullish, c.open - p.body_top())
        } else if c.is_red() && c.open < p.body_bottom() {
            (Direction::Bearish, p.body_bottom() - c.open)
        } else {
            return None;
        };

        let matched = gap / p.close * 100.0 >= self.gap_pct.get()
            && self.kicker_type.admits(direction)
            && trend_gate(self.require_trend, contexts, index - 1, direction);
        matched.then_some(direction)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Kicker",
            "Sharp gap with no body overlap followed by continuation away from it",
            None,
        )
    }
}

/// Counter-Attack - gap against the first candle then a close back at its close
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CounterAttackDetector {
    /// First body >= ratio * range
    pub body_size_ratio: Ratio,
    /// `|close2 - close1| <= tolerance * close1`
    pub close_tolerance: Ratio,
    pub counter_attack_type: PatternBias,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for CounterAttackDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            close_tolerance: Ratio::new_const(0.02),
            counter_attack_type: PatternBias::Both,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for CounterAttackDetector {
    fn id(&self) -> PatternId {
        PatternId("counter_attack")
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn context_spec(&self) -> ContextSpec {
        trend_spec(self.require_trend, self.ma_period)
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [prev, curr] = candles::<2>(series, index)?;
        let (p, c) = (prev.bar, curr.bar);
        if !prev.metrics.body_at_least(self.body_size_ratio.get()) {
            return None;
        }

        let direction = if p.is_red() && c.is_green() && c.open < p.close {
            Direction::Bullish
        } else if p.is_green() && c.is_red() && c.open > p.close {
            Direction::Bearish
        } else {
            return None;
        };

        let matched = (c.close - p.close).abs() <= p.close * self.close_tolerance.get()
            && self.counter_attack_type.admits(direction)
            && trend_gate(self.require_trend, contexts, index - 1, direction);
        matched.then_some(direction)
    }

    fn metadata(&self) -> PatternMetadata {
        two_bar_metadata(
            "Counter-Attack",
            "Gap against the prior candle that closes back at the prior close",
            None,
        )
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

const TREND_FLAG: ParamMeta =
    ParamMeta::flag("require_trend", false, "Require a prior trend opposite to the signal");
const MA_PERIOD: ParamMeta =
    ParamMeta::period("ma_period", 20.0, (5.0, 100.0, 5.0), "Moving average period for the trend gate");

static ENGULFING_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min engulfing body as fraction of range"),
    ParamMeta::choice("engulfing_type", "both", PatternBias::OPTIONS, "Direction filter"),
    TREND_FLAG,
    MA_PERIOD,
];

static HARAMI_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.8, 0.1), "Min first body as fraction of range"),
    ParamMeta::choice("harami_type", "both", PatternBias::OPTIONS, "Direction filter"),
    TREND_FLAG,
    MA_PERIOD,
];

static PIERCING_LINE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min body of both candles as fraction of range"),
    ParamMeta::ratio("penetration_ratio", 0.5, (0.3, 0.9, 0.1), "Min fraction of the first body recovered"),
    TREND_FLAG,
    MA_PERIOD,
];

static DARK_CLOUD_COVER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.6, (0.3, 0.9, 0.1), "Min first body as fraction of range"),
    ParamMeta::ratio("confirm_body_ratio", 0.3, (0.1, 0.7, 0.1), "Min second body as fraction of range"),
    ParamMeta::ratio("max_shadow_ratio", 0.3, (0.1, 0.5, 0.05), "Max shadow as fraction of range"),
    ParamMeta::ratio("penetration_ratio", 0.5, (0.3, 0.9, 0.1), "Min fraction of the first body given back"),
    TREND_FLAG,
    MA_PERIOD,
];

static TWEEZER_TOP_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min body of both candles as fraction of range"),
    ParamMeta::multiple("tolerance_pct", 0.2, (0.05, 1.0, 0.05), "Max difference between highs, percent"),
    TREND_FLAG,
    MA_PERIOD,
];

static TWEEZER_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min body of both candles as fraction of range"),
    ParamMeta::multiple("tolerance_pct", 0.2, (0.05, 1.0, 0.05), "Max difference between lows, percent"),
    TREND_FLAG,
    MA_PERIOD,
];

static KICKER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min body of both candles as fraction of range"),
    ParamMeta::multiple("gap_pct", 0.5, (0.1, 3.0, 0.1), "Min body gap, percent of the first close"),
    ParamMeta::choice("kicker_type", "both", PatternBias::OPTIONS, "Direction filter"),
    TREND_FLAG,
    MA_PERIOD,
];

static COUNTER_ATTACK_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.7, 0.1), "Min first body as fraction of range"),
    ParamMeta::ratio("close_tolerance", 0.02, (0.005, 0.05, 0.005), "Max close difference, fraction of the first close"),
    ParamMeta::choice("counter_attack_type", "both", PatternBias::OPTIONS, "Direction filter"),
    TREND_FLAG,
    MA_PERIOD,
];

impl ParameterizedDetector for EngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            engulfing_type: get_choice(params, "engulfing_type", d.engulfing_type)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "engulfing"
    }
}

impl ParameterizedDetector for HaramiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HARAMI_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            harami_type: get_choice(params, "harami_type", d.harami_type)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "harami"
    }
}

impl ParameterizedDetector for PiercingLineDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIERCING_LINE_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            penetration_ratio: get_ratio(params, "penetration_ratio", d.penetration_ratio.get())?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "piercing_line"
    }
}

impl ParameterizedDetector for DarkCloudCoverDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DARK_CLOUD_COVER_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            confirm_body_ratio: get_ratio(params, "confirm_body_ratio", d.confirm_body_ratio.get())?,
            max_shadow_ratio: get_ratio(params, "max_shadow_ratio", d.max_shadow_ratio.get())?,
            penetration_ratio: get_ratio(params, "penetration_ratio", d.penetration_ratio.get())?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "dark_cloud_cover"
    }
}

impl ParameterizedDetector for TweezerTopDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TWEEZER_TOP_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            tolerance_pct: get_multiple(params, "tolerance_pct", d.tolerance_pct.get())?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "tweezer_top"
    }
}

impl ParameterizedDetector for TweezerBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        TWEEZER_BOTTOM_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            tolerance_pct: get_multiple(params, "tolerance_pct", d.tolerance_pct.get())?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "tweezer_bottom"
    }
}

impl ParameterizedDetector for KickerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        KICKER_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            gap_pct: get_multiple(params, "gap_pct", d.gap_pct.get())?,
            kicker_type: get_choice(params, "kicker_type", d.kicker_type)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "kicker"
    }
}

impl ParameterizedDetector for CounterAttackDetector {
    fn param_meta() -> &'static [ParamMeta] {
        COUNTER_ATTACK_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            close_tolerance: get_ratio(params, "close_tolerance", d.close_tolerance.get())?,
            counter_attack_type: get_choice(params, "counter_attack_type", d.counter_attack_type)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "counter_attack"
    }
}
