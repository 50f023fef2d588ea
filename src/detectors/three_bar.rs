//! Three-bar candlestick pattern detectors
//!
//! Three White Soldiers, Three Black Crows, Morning Star, Evening Star,
//! Three Inside Up, Three Inside Down

use serde::{Deserialize, Serialize};

use super::helpers::{body_strictly_inside, candles, trend_gate, trend_spec};
use crate::{
    metrics::{CandleSeries, ContextSpec, MarketContext},
    params::{
        get_flag, get_period, get_ratio, validate_bag, ParamBag, ParamMeta, ParameterizedDetector,
    },
    Direction, OHLCVExt, PatternCategory, PatternDetector, PatternId, PatternMetadata, Period,
    Ratio, Result,
};

impl_with_defaults!(
    ThreeWhiteSoldiersDetector,
    ThreeBlackCrowsDetector,
    MorningStarDetector,
    EveningStarDetector,
    ThreeInsideUpDetector,
    ThreeInsideDownDetector,
);

const DEFAULT_MA_PERIOD: Period = Period::new_const(20);

fn three_bar_metadata(
    name: &'static str,
    description: &'static str,
    direction: Direction,
) -> PatternMetadata {
    PatternMetadata {
        name,
        description,
        category: PatternCategory::ThreeBar,
        typical_direction: Some(direction),
    }
}

/// `low <= x <= high` for an unordered pair of bounds
#[inline]
fn within(x: f64, a: f64, b: f64) -> bool {
    a.min(b) <= x && x <= a.max(b)
}

// ============================================================
// THREE WHITE SOLDIERS / THREE BLACK CROWS
// ============================================================

/// Three White Soldiers - three long green candles stepping higher
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeWhiteSoldiersDetector {
    /// Each body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Each upper shadow <= ratio * range
    pub upper_shadow_ratio: Ratio,
    pub progressive_close: bool,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for ThreeWhiteSoldiersDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            upper_shadow_ratio: Ratio::new_const(0.2),
            progressive_close: true,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for ThreeWhiteSoldiersDetector {
    fn id(&self) -> PatternId {
        PatternId("three_white_soldiers")
    }

    fn min_bars(&self) -> usize {
        3
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
        let trio = candles::<3>(series, index)?;
        let shaped = trio.iter().all(|c| {
            c.bar.is_green()
                && c.metrics.body_at_least(self.body_size_ratio.get())
                && c.metrics.upper_shadow <= self.upper_shadow_ratio.get() * c.metrics.total_range
        });
        let [a, b, c] = trio.map(|c| c.bar);

        let matched = shaped
            && within(b.open, a.open, a.close)
            && within(c.open, b.open, b.close)
            && (!self.progressive_close || (a.close < b.close && b.close < c.close))
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bullish);
        matched.then_some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Three White Soldiers",
            "Three long green candles, each opening within the prior body and closing higher",
            Direction::Bullish,
        )
    }
}

/// Three Black Crows - three long red candles stepping lower
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeBlackCrowsDetector {
    /// Each body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Each lower shadow <= ratio * range
    pub lower_shadow_ratio: Ratio,
    pub progressive_close: bool,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for ThreeBlackCrowsDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            lower_shadow_ratio: Ratio::new_const(0.2),
            progressive_close: true,
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for ThreeBlackCrowsDetector {
    fn id(&self) -> PatternId {
        PatternId("three_black_crows")
    }

    fn min_bars(&self) -> usize {
        3
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
        let trio = candles::<3>(series, index)?;
        let shaped = trio.iter().all(|c| {
            c.bar.is_red()
                && c.metrics.body_at_least(self.body_size_ratio.get())
                && c.metrics.lower_shadow <= self.lower_shadow_ratio.get() * c.metrics.total_range
        });
        let [a, b, c] = trio.map(|c| c.bar);

        let matched = shaped
            && within(b.open, a.open, a.close)
            && within(c.open, b.open, b.close)
            && (!self.progressive_close || (a.close > b.close && b.close > c.close))
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bearish);
        matched.then_some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Three Black Crows",
            "Three long red candles, each opening within the prior body and closing lower",
            Direction::Bearish,
        )
    }
}

// ============================================================
// MORNING STAR / EVENING STAR
// ============================================================

/// Morning Star - long red, gapped small star, strong green recovery
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorningStarDetector {
    /// First and third body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Star body <= ratio * first body
    pub star_body_ratio: Ratio,
    /// Gap between first close and star body >= ratio * first body
    pub gap_ratio: Ratio,
    /// Third close recovers >= ratio * first body above the first close
    pub penetration_ratio: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for MorningStarDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            star_body_ratio: Ratio::new_const(0.3),
            gap_ratio: Ratio::new_const(0.1),
            penetration_ratio: Ratio::new_const(0.5),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for MorningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("morning_star")
    }

    fn min_bars(&self) -> usize {
        3
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
        let [first, star, third] = candles::<3>(series, index)?;
        let ratio = self.body_size_ratio.get();
        if !(first.bar.is_red() && third.bar.is_green())
            || !first.metrics.body_at_least(ratio)
            || !third.metrics.body_at_least(ratio)
        {
            return None;
        }

        let (a, b, c) = (first.bar, star.bar, third.bar);
        let first_body = a.body_size();
        let gap = a.close - b.body_top();
        let matched = b.body_size() <= self.star_body_ratio.get() * first_body
            && gap > 0.0
            && gap >= self.gap_ratio.get() * first_body
            && c.close - a.close >= self.penetration_ratio.get() * first_body
            && c.close > a.body_mid()
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bullish);
        matched.then_some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Morning Star",
            "Long red candle, a small gapped star, then a green candle closing deep into the first",
            Direction::Bullish,
        )
    }
}

/// Evening Star - long green, gapped small star, strong red decline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EveningStarDetector {
    /// First and third body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Star body <= ratio * first body
    pub star_body_ratio: Ratio,
    /// Gap between first close and star body >= ratio * first body
    pub gap_ratio: Ratio,
    /// Third close falls >= ratio * first body below the first close
    pub penetration_ratio: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for EveningStarDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            star_body_ratio: Ratio::new_const(0.3),
            gap_ratio: Ratio::new_const(0.1),
            penetration_ratio: Ratio::new_const(0.5),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for EveningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("evening_star")
    }

    fn min_bars(&self) -> usize {
        3
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
        let [first, star, third] = candles::<3>(series, index)?;
        let ratio = self.body_size_ratio.get();
        if !(first.bar.is_green() && third.bar.is_red())
            || !first.metrics.body_at_least(ratio)
            || !third.metrics.body_at_least(ratio)
        {
            return None;
        }

        let (a, b, c) = (first.bar, star.bar, third.bar);
        let first_body = a.body_size();
        let gap = b.body_bottom() - a.close;
        let matched = b.body_size() <= self.star_body_ratio.get() * first_body
            && gap > 0.0
            && gap >= self.gap_ratio.get() * first_body
            && a.close - c.close >= self.penetration_ratio.get() * first_body
            && c.close < a.body_mid()
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bearish);
        matched.then_some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Evening Star",
            "Long green candle, a small gapped star, then a red candle closing deep into the first",
            Direction::Bearish,
        )
    }
}

// ============================================================
// THREE INSIDE UP / DOWN
// ============================================================

/// Three Inside Up - bullish harami confirmed by a close above the first high
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeInsideUpDetector {
    /// First and third body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Second body <= ratio * first body
    pub harami_body_ratio: Ratio,
    /// Third body >= ratio * (high - open)
    pub confirmation_strength: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for ThreeInsideUpDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            harami_body_ratio: Ratio::new_const(0.5),
            confirmation_strength: Ratio::new_const(0.8),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for ThreeInsideUpDetector {
    fn id(&self) -> PatternId {
        PatternId("three_inside_up")
    }

    fn min_bars(&self) -> usize {
        3
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
        let [first, second, third] = candles::<3>(series, index)?;
        let (a, b, c) = (first.bar, second.bar, third.bar);
        let ratio = self.body_size_ratio.get();
        if !(a.is_red() && b.is_green() && c.is_green())
            || !first.metrics.body_at_least(ratio)
            || !third.metrics.body_at_least(ratio)
        {
            return None;
        }

        // green third candle: high >= close > open
        let strength = c.body_size() / (c.high - c.open);
        let matched = body_strictly_inside(b, a)
            && b.body_size() <= self.harami_body_ratio.get() * a.body_size()
            && c.close > a.high
            && strength >= self.confirmation_strength.get()
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bullish);
        matched.then_some(Direction::Bullish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Three Inside Up",
            "Bullish harami followed by a strong green candle closing above the first high",
            Direction::Bullish,
        )
    }
}

/// Three Inside Down - bearish harami confirmed by a close below the first low
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeInsideDownDetector {
    /// First and third body >= ratio * range
    pub body_size_ratio: Ratio,
    /// Second body <= ratio * first body
    pub harami_body_ratio: Ratio,
    /// Third body >= ratio * (open - low)
    pub confirmation_strength: Ratio,
    pub require_trend: bool,
    pub ma_period: Period,
}

impl Default for ThreeInsideDownDetector {
    fn default() -> Self {
        Self {
            body_size_ratio: Ratio::new_const(0.6),
            harami_body_ratio: Ratio::new_const(0.5),
            confirmation_strength: Ratio::new_const(0.8),
            require_trend: false,
            ma_period: DEFAULT_MA_PERIOD,
        }
    }
}

impl PatternDetector for ThreeInsideDownDetector {
    fn id(&self) -> PatternId {
        PatternId("three_inside_down")
    }

    fn min_bars(&self) -> usize {
        3
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
        let [first, second, third] = candles::<3>(series, index)?;
        let (a, b, c) = (first.bar, second.bar, third.bar);
        let ratio = self.body_size_ratio.get();
        if !(a.is_green() && b.is_red() && c.is_red())
            || !first.metrics.body_at_least(ratio)
            || !third.metrics.body_at_least(ratio)
        {
            return None;
        }

        let strength = c.body_size() / (c.open - c.low);
        let matched = body_strictly_inside(b, a)
            && b.body_size() <= self.harami_body_ratio.get() * a.body_size()
            && c.close < a.low
            && strength >= self.confirmation_strength.get()
            && trend_gate(self.require_trend, contexts, index - 2, Direction::Bearish);
        matched.then_some(Direction::Bearish)
    }

    fn metadata(&self) -> PatternMetadata {
        three_bar_metadata(
            "Three Inside Down",
            "Bearish harami followed by a strong red candle closing below the first low",
            Direction::Bearish,
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
const BODY_SIZE: ParamMeta =
    ParamMeta::ratio("body_size_ratio", 0.6, (0.3, 0.9, 0.1), "Min body of the long candles as fraction of range");

static THREE_WHITE_SOLDIERS_PARAMS: &[ParamMeta] = &[
    BODY_SIZE,
    ParamMeta::ratio("upper_shadow_ratio", 0.2, (0.05, 0.4, 0.05), "Max upper shadow as fraction of range"),
    ParamMeta::flag("progressive_close", true, "Require strictly rising closes"),
    TREND_FLAG,
    MA_PERIOD,
];

static THREE_BLACK_CROWS_PARAMS: &[ParamMeta] = &[
    BODY_SIZE,
    ParamMeta::ratio("lower_shadow_ratio", 0.2, (0.05, 0.4, 0.05), "Max lower shadow as fraction of range"),
    ParamMeta::flag("progressive_close", true, "Require strictly falling closes"),
    TREND_FLAG,
    MA_PERIOD,
];

static STAR_PARAMS: &[ParamMeta] = &[
    BODY_SIZE,
    ParamMeta::ratio("star_body_ratio", 0.3, (0.1, 0.5, 0.05), "Max star body as fraction of the first body"),
    ParamMeta::ratio("gap_ratio", 0.1, (0.0, 0.5, 0.05), "Min star gap as fraction of the first body"),
    ParamMeta::ratio("penetration_ratio", 0.5, (0.3, 0.9, 0.1), "Min third-candle penetration of the first body"),
    TREND_FLAG,
    MA_PERIOD,
];

static THREE_INSIDE_PARAMS: &[ParamMeta] = &[
    BODY_SIZE,
    ParamMeta::ratio("harami_body_ratio", 0.5, (0.2, 0.8, 0.1), "Max second body as fraction of the first"),
    ParamMeta::ratio("confirmation_strength", 0.8, (0.5, 1.0, 0.05), "Min third body relative to its extension"),
    TREND_FLAG,
    MA_PERIOD,
];

impl ParameterizedDetector for ThreeWhiteSoldiersDetector {
    fn param_meta() -> &'static [ParamMeta] {
        THREE_WHITE_SOLDIERS_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            upper_shadow_ratio: get_ratio(params, "upper_shadow_ratio", d.upper_shadow_ratio.get())?,
            progressive_close: get_flag(params, "progressive_close", d.progressive_close)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "three_white_soldiers"
    }
}

impl ParameterizedDetector for ThreeBlackCrowsDetector {
    fn param_meta() -> &'static [ParamMeta] {
        THREE_BLACK_CROWS_PARAMS
    }

    fn with_params(params: &ParamBag) -> Result<Self> {
        validate_bag(Self::param_meta(), params)?;
        let d = Self::default();
        Ok(Self {
            body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
            lower_shadow_ratio: get_ratio(params, "lower_shadow_ratio", d.lower_shadow_ratio.get())?,
            progressive_close: get_flag(params, "progressive_close", d.progressive_close)?,
            require_trend: get_flag(params, "require_trend", d.require_trend)?,
            ma_period: get_period(params, "ma_period", d.ma_period.get())?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "three_black_crows"
    }
}

/// Morning and evening star share a field set
macro_rules! impl_star_params {
    ($detector:ty, $id:literal) => {
        impl ParameterizedDetector for $detector {
            fn param_meta() -> &'static [ParamMeta] {
                STAR_PARAMS
            }

            fn with_params(params: &ParamBag) -> Result<Self> {
                validate_bag(Self::param_meta(), params)?;
                let d = Self::default();
                Ok(Self {
                    body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
                    star_body_ratio: get_ratio(params, "star_body_ratio", d.star_body_ratio.get())?,
                    gap_ratio: get_ratio(params, "gap_ratio", d.gap_ratio.get())?,
                    penetration_ratio: get_ratio(params, "penetration_ratio", d.penetration_ratio.get())?,
                    require_trend: get_flag(params, "require_trend", d.require_trend)?,
                    ma_period: get_period(params, "ma_period", d.ma_period.get())?,
                })
            }

            fn pattern_id_str() -> &'static str {
                $id
            }
        }
    };
}

impl_star_params!(MorningStarDetector, "morning_star");
impl_star_params!(EveningStarDetector, "evening_star");

macro_rules! impl_three_inside_params {
    ($detector:ty, $id:literal) => {
        impl ParameterizedDetector for $detector {
            fn param_meta() -> &'static [ParamMeta] {
                THREE_INSIDE_PARAMS
            }

            fn with_params(params: &ParamBag) -> Result<Self> {
                validate_bag(Self::param_meta(), params)?;
                let d = Self::default();
                Ok(Self {
                    body_size_ratio: get_ratio(params, "body_size_ratio", d.body_size_ratio.get())?,
                    harami_body_ratio: get_ratio(params, "harami_body_ratio", d.harami_body_ratio.get())?,
                    confirmation_strength: get_ratio(
                        params,
                        "confirmation_strength",
                        d.confirmation_strength.get(),
                    )?,
                    require_trend: get_flag(params, "require_trend", d.require_trend)?,
                    ma_period: get_period(params, "ma_period", d.ma_period.get())?,
                })
            }

            fn pattern_id_str() -> &'static str {
                $id
            }
        }
    };
}

impl_three_inside_params!(ThreeInsideUpDetector, "three_inside_up");
impl_three_inside_params!(ThreeInsideDownDetector, "three_inside_down");
