//! Single-bar candlestick pattern detectors
//!
//! Hammer, Shooting Star, Doji, Marubozu, Elephant Bar

use serde::{Deserialize, Serialize};

use super::helpers::{candles, trend_admits, volume_admits};
use crate::{
    metrics::{CandleSeries, ContextSpec, MarketContext},
    params::{
        get_choice, get_flag, get_multiple, get_optional_multiple, get_period, get_ratio,
        validate_bag, CandleColor, ParamBag, ParamMeta, ParameterizedDetector,
    },
    Direction, Error, Multiple, OHLCVExt, PatternCategory, PatternDetector, PatternId,
    PatternMetadata, Period, Ratio, Result,
};

impl_with_defaults!(
    HammerDetector,
    ShootingStarDetector,
    DojiDetector,
    MarubozuDetector,
    ElephantBarDetector,
);

fn gated_context(trend: Option<Period>, volume: Option<Period>) -> ContextSpec {
    ContextSpec {
        trend_period: trend,
        volume_lookback: volume,
        body_lookback: None,
    }
}

// ============================================================
// HAMMER / SHOOTING STAR
// ============================================================

/// Hammer - small body near the top of the range with a long lower shadow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HammerDetector {
    /// body_size < ratio * range
    pub body_size_ratio: Ratio,
    /// lower_shadow > ratio * body_size
    pub lower_shadow_ratio: Multiple,
    /// upper_shadow < ratio * range
    pub upper_shadow_ratio: Ratio,
    pub ma_period: Period,
    pub require_green: bool,
    pub require_downtrend: bool,
    pub min_relative_volume: Option<Multiple>,
    pub volume_lookback: Period,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            lower_shadow_ratio: Multiple::new_const(2.0),
            upper_shadow_ratio: Ratio::new_const(0.1),
            ma_period: Period::new_const(5),
            require_green: true,
            require_downtrend: false,
            min_relative_volume: None,
            volume_lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId("hammer")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn context_spec(&self) -> ContextSpec {
        gated_context(
            self.require_downtrend.then_some(self.ma_period),
            self.min_relative_volume.map(|_| self.volume_lookback),
        )
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [c] = candles::<1>(series, index)?;
        let m = c.metrics;

        let shape = m.body_size < self.body_size_ratio.get() * m.total_range
            && m.lower_shadow > self.lower_shadow_ratio.get() * m.body_size
            && m.upper_shadow < self.upper_shadow_ratio.get() * m.total_range;
        if !shape || (self.require_green && !m.is_green) {
            return None;
        }
        if !volume_admits(contexts, index, self.min_relative_volume) {
            return None;
        }
        if self.require_downtrend && !trend_admits(contexts, index, Direction::Bullish) {
            return None;
        }
        Some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Hammer",
            description: "Small body at the top of the range with a long lower shadow; \
                          buyers rejected lower prices",
            category: PatternCategory::SingleBar,
            typical_direction: Some(Direction::Bullish),
        }
    }
}

/// Shooting Star - mirror of the hammer with a long upper shadow
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShootingStarDetector {
    /// body_size < ratio * range
    pub body_size_ratio: Ratio,
    /// upper_shadow > ratio * body_size
    pub upper_shadow_ratio: Multiple,
    /// lower_shadow < ratio * range
    pub lower_shadow_ratio: Ratio,
    pub ma_period: Period,
    pub require_red: bool,
    pub require_uptrend: bool,
    pub min_relative_volume: Option<Multiple>,
    pub volume_lookback: Period,
}

impl Default for ShootingStarDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.3),
            upper_shadow_ratio: Multiple::new_const(2.0),
            lower_shadow_ratio: Ratio::new_const(0.1),
            ma_period: Period::new_const(5),
            require_red: true,
            require_uptrend: false,
            min_relative_volume: None,
            volume_lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for ShootingStarDetector {
    fn id(&self) -> PatternId {
        PatternId("shooting_star")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn context_spec(&self) -> ContextSpec {
        gated_context(
            self.require_uptrend.then_some(self.ma_period),
            self.min_relative_volume.map(|_| self.volume_lookback),
        )
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [c] = candles::<1>(series, index)?;
        let m = c.metrics;

        let shape = m.body_size < self.body_size_ratio.get() * m.total_range
            && m.upper_shadow > self.upper_shadow_ratio.get() * m.body_size
            && m.lower_shadow < self.lower_shadow_ratio.get() * m.total_range;
        if !shape || (self.require_red && !m.is_red()) {
            return None;
        }
        if !volume_admits(contexts, index, self.min_relative_volume) {
            return None;
        }
        if self.require_uptrend && !trend_admits(contexts, index, Direction::Bearish) {
            return None;
        }
        Some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Shooting Star",
            description: "Small body at the bottom of the range with a long upper shadow; \
                          sellers rejected higher prices",
            category: PatternCategory::SingleBar,
            typical_direction: Some(Direction::Bearish),
        }
    }
}

// ============================================================
// DOJI
// ============================================================

/// Doji - tiny body centered in the range with balanced shadows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DojiDetector {
    /// body_size < ratio * range
    pub body_size_ratio: Ratio,
    /// Centering tolerance; the shadow balance tolerance is
    /// `(0.5 - shadow_balance_ratio) * 0.4` of the range. Valid in 0.3..=0.5.
    pub shadow_balance_ratio: Ratio,
    pub require_high_volume: bool,
    pub min_relative_volume: Multiple,
    pub volume_lookback: Period,
}

impl Default for DojiDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.1),
            shadow_balance_ratio: Ratio::new_const(0.4),
            require_high_volume: false,
            min_relative_volume: Multiple::new_const(1.5),
            volume_lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for DojiDetector {
    fn id(&self) -> PatternId {
        PatternId("doji")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn context_spec(&self) -> ContextSpec {
        gated_context(None, self.require_high_volume.then_some(self.volume_lookback))
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [c] = candles::<1>(series, index)?;
        let (bar, m) = (c.bar, c.metrics);
        if !m.is_eligible() {
            return None;
        }
        let range = m.total_range;
        let balance = self.shadow_balance_ratio.get();

        let small_body = m.body_size < self.body_size_ratio.get() * range;
        let range_mid = (bar.high + bar.low) / 2.0;
        let centered = (bar.body_mid() - range_mid).abs() / range < balance;
        let balanced = (m.upper_shadow - m.lower_shadow).abs() / range <= (0.5 - balance) * 0.4;
        if !(small_body && centered && balanced) {
            return None;
        }
        if self.require_high_volume
            && !volume_admits(contexts, index, Some(self.min_relative_volume))
        {
            return None;
        }
        Some(Direction::Neutral)
    }

    fn validate_config(&self) -> Result<()> {
        let value = self.shadow_balance_ratio.get();
        if !(0.3..=0.5).contains(&value) {
            return Err(Error::OutOfRange {
                field: "shadow_balance_ratio",
                value,
                min: 0.3,
                max: 0.5,
            });
        }
        Ok(())
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Doji",
            description: "Open and close nearly equal with balanced shadows; indecision",
            category: PatternCategory::SingleBar,
            typical_direction: Some(Direction::Neutral),
        }
    }
}

// ============================================================
// MARUBOZU / ELEPHANT BAR
// ============================================================

fn body_direction(body: f64) -> Direction {
    if body > 0.0 {
        Direction::Bullish
    } else if body < 0.0 {
        Direction::Bearish
    } else {
        Direction::Neutral
    }
}

/// Marubozu - negligible shadows relative to the bar's own range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarubozuDetector {
    /// Each shadow <= ratio * range
    pub max_shadow_ratio: Ratio,
    pub candle_color: CandleColor,
    pub min_relative_volume: Option<Multiple>,
    pub volume_lookback: Period,
}

impl Default for MarubozuDetector {
    fn default() -> Self {
        Self {
            max_shadow_ratio: Ratio::new_const(0.05),
            candle_color: CandleColor::Both,
            min_relative_volume: None,
            volume_lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for MarubozuDetector {
    fn id(&self) -> PatternId {
        PatternId("marubozu")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn context_spec(&self) -> ContextSpec {
        gated_context(None, self.min_relative_volume.map(|_| self.volume_lookback))
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [c] = candles::<1>(series, index)?;
        let m = c.metrics;

        let matched = m.shadows_within(self.max_shadow_ratio.get())
            && self.candle_color.admits(m.body)
            && volume_admits(contexts, index, self.min_relative_volume);
        matched.then(|| body_direction(m.body))
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Marubozu",
            description: "Full body with negligible shadows; strong directional conviction",
            category: PatternCategory::SingleBar,
            typical_direction: None,
        }
    }
}

/// Elephant Bar - body much larger than the trailing average body
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElephantBarDetector {
    /// body_size > ratio * trailing average body
    pub body_size_ratio: Multiple,
    /// Bars in the trailing body average, current bar included
    pub lookback: Period,
    /// Each shadow < ratio * range
    pub shadow_ratio: Ratio,
    pub candle_color: CandleColor,
    pub min_relative_volume: Option<Multiple>,
    pub volume_lookback: Period,
}

impl Default for ElephantBarDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Multiple::new_const(2.0),
            lookback: Period::new_const(20),
            shadow_ratio: Ratio::new_const(0.1),
            candle_color: CandleColor::Both,
            min_relative_volume: None,
            volume_lookback: Period::new_const(20),
        }
    }
}

impl PatternDetector for ElephantBarDetector {
    fn id(&self) -> PatternId {
        PatternId("elephant_bar")
    }

    fn min_bars(&self) -> usize {
        1
    }

    fn context_spec(&self) -> ContextSpec {
        ContextSpec {
            trend_period: None,
            volume_lookback: self.min_relative_volume.map(|_| self.volume_lookback),
            body_lookback: Some(self.lookback),
        }
    }

    fn detect_at(
        &self,
        series: &CandleSeries,
        index: usize,
        contexts: &[MarketContext],
    ) -> Option<Direction> {
        let [c] = candles::<1>(series, index)?;
        let m = c.metrics;
        let avg_body = contexts.get(index)?.avg_body.filter(|avg| *avg > 0.0)?;

        let shadow_limit = self.shadow_ratio.get() * m.total_range;
        let matched = m.body_size > self.body_size_ratio.get() * avg_body
            && m.upper_shadow < shadow_limit
            && m.lower_shadow < shadow_limit
            && self.candle_color.admits(m.body)
            && volume_admits(contexts, index, self.min_relative_volume);
        matched.then(|| body_direction(m.body))
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Elephant Bar",
            description: "Unusually large body compared to recent bars; momentum surge",
            category: PatternCategory::SingleBar,
            typical_direction: None,
        }
    }
}

// ============================================================
// PARAMETERIZED DETECTOR IMPLEMENTATIONS
// ============================================================

static HAMMER_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.5, 0.05), "Max body size as fraction of range"),
    ParamMeta::multiple("lower_shadow_ratio", 2.0, (1.0, 4.0, 0.5), "Min lower shadow as multiple of body"),
    ParamMeta::ratio("upper_shadow_ratio", 0.1, (0.0, 0.3, 0.05), "Max upper shadow as fraction of range"),
    ParamMeta::period("ma_period", 5.0, (2.0, 50.0, 1.0), "Moving average period for the trend gate"),
    ParamMeta::flag("require_green", true, "Only accept green candles"),
    ParamMeta::flag("require_downtrend", false, "Only accept bars in a downtrend"),
    ParamMeta::optional_multiple("min_relative_volume", (0.0, 5.0, 0.25), "Min volume relative to its average"),
    ParamMeta::period("volume_lookback", 20.0, (5.0, 100.0, 5.0), "Bars in the volume average"),
];

static SHOOTING_STAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.3, (0.1, 0.5, 0.05), "Max body size as fraction of range"),
    ParamMeta::multiple("upper_shadow_ratio", 2.0, (1.0, 4.0, 0.5), "Min upper shadow as multiple of body"),
    ParamMeta::ratio("lower_shadow_ratio", 0.1, (0.0, 0.3, 0.05), "Max lower shadow as fraction of range"),
    ParamMeta::period("ma_period", 5.0, (2.0, 50.0, 1.0), "Moving average period for the trend gate"),
    ParamMeta::flag("require_red", true, "Only accept red candles"),
    ParamMeta::flag("require_uptrend", false, "Only accept bars in an uptrend"),
    ParamMeta::optional_multiple("min_relative_volume", (0.0, 5.0, 0.25), "Min volume relative to its average"),
    ParamMeta::period("volume_lookback", 20.0, (5.0, 100.0, 5.0), "Bars in the volume average"),
];

static DOJI_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("body_size_ratio", 0.1, (0.05, 0.2, 0.05), "Max body size as fraction of range"),
    ParamMeta::ratio("shadow_balance_ratio", 0.4, (0.3, 0.5, 0.05), "Centering and shadow balance tolerance"),
    ParamMeta::flag("require_high_volume", false, "Require above-average volume"),
    ParamMeta::multiple("min_relative_volume", 1.5, (1.0, 3.0, 0.25), "Min relative volume when required"),
    ParamMeta::period("volume_lookback", 20.0, (5.0, 100.0, 5.0), "Bars in the volume average"),
];

static MARUBOZU_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("max_shadow_ratio", 0.05, (0.0, 0.15, 0.01), "Max shadow as fraction of range"),
    ParamMeta::choice("candle_color", "both", CandleColor::OPTIONS, "Candle color filter"),
    ParamMeta::optional_multiple("min_relative_volume", (0.0, 5.0, 0.25), "Min volume relative to its average"),
    ParamMeta::period("volume_lookback", 20.0, (5.0, 100.0, 5.0), "Bars in the volume average"),
];

static ELEPHANT_BAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::multiple("body_size_ratio", 2.0, (1.2, 4.0, 0.2), "Min body as multiple of the trailing average"),
    ParamMeta::period("lookback", 20.0, (5.0, 50.0, 5.0), "Bars in the trailing body average"),
    ParamMeta::ratio("shadow_ratio", 0.1, (0.0, 0.3, 0.05), "Max shadow as fraction of range"),
    ParamMeta::choice("candle_color", "both", CandleColor::OPTIONS, "Candle color filter"),
    ParamMeta::optional_multiple("min_relative_volume", (0.0, 5.0, 0.25), "Min volume relative to its average"),
    ParamMeta::period("volume_lookback", 20.0, (5.0, 100.0, 5.0), "Bars in the volume average"),
];

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            lower_shadow_ratio: get_multiple(params, "lower_shadow_ratio", d.lower_shadow_ratio.get())?,
            upper_shadow_ratio: get_ratio(params, "upper_shadow_ratio", d.upper_shadow_ratio.get())?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
            require_green: get_flag(params, "require_green", d.require_green)?,
            require_downtrend: get_flag(params, "require_downtrend", d.require_downtrend)?,
            min_relative_volume: get_optional_multiple(params, "min_relative_volume", None)?,
            volume_lookback: get_period(params, "volume_lookback", d.volume_lookback.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "hammer"
    }
}

impl ParameterizedDetector for ShootingStarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        SHOOTING_STAR_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            upper_shadow_ratio: get_multiple(params, "upper_shadow_ratio", d.upper_shadow_ratio.get())?,
            lower_shadow_ratio: get_ratio(params, "lower_shadow_ratio", d.lower_shadow_ratio.get())?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
            require_red: get_flag(params, "require_red", d.require_red)?,
            require_uptrend: get_flag(params, "require_uptrend", d.require_uptrend)?,
            min_relative_volume: get_optional_multiple(params, "min_relative_volume", None)?,
            volume_lookback: get_period(params, "volume_lookback", d.volume_lookback.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "shooting_star"
    }
}

impl ParameterizedDetector for DojiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        DOJI_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(DOJI_PARAMS, params)?;
        let d = Self::default();
        let detector = Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            shadow_balance_ratio: get_ratio(params, "shadow_balance_ratio", d.shadow_balance_ratio.get())?,
            require_high_volume: get_flag(params, "require_high_volume", d.require_high_volume)?,
            min_relative_volume: get_multiple(params, "min_relative_volume", d.min_relative_volume.get())?,
            volume_lookback: get_period(params, "volume_lookback", d.volume_lookback.get())?,
        };
        detector.validate_config()?;
        Ok(detector)
    }

    fn pattern_id_str() -> &'static str {
        "doji"
    }
}

impl ParameterizedDetector for MarubozuDetector {
    fn param_meta() -> &'static [ParamMeta] {
        MARUBOZU_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            max_shadow_ratio: get_ratio(params, "max_shadow_ratio", d.max_shadow_ratio.get())?,
            candle_color: get_choice(params, "candle_color", d.candle_color)?,
            min_relative_volume: get_optional_multiple(params, "min_relative_volume", None)?,
            volume_lookback: get_period(params, "volume_lookback", d.volume_lookback.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "marubozu"
    }
}

impl ParameterizedDetector for ElephantBarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ELEPHANT_BAR_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_multiple(params, "body_size_ratio", d.body_size_ratio.get())?,
            lookback: get_period(params, "lookback", d.lookback.get())?,
            shadow_ratio: get_ratio(params, "shadow_ratio", d.shadow_ratio.get())?,
            candle_color: get_choice(params, "candle_color", d.candle_color)?,
            min_relative_volume: get_optional_multiple(params, "min_relative_volume", None)?,
            volume_lookback: get_period(params, "volume_lookback", d.volume_lookback.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "elephant_bar"
    }
}
