//! Backtest parameters and file configuration

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    params::{get_choice, get_period, ParamBag, ParamValue},
    BuiltinDetector, Error, PatternDetector, Period, Result,
};

/// Trade direction of every position in a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionType {
    #[default]
    Long,
    Short,
}

impl PositionType {
    pub const OPTIONS: &'static [&'static str] = &["long", "short"];

    /// +1 for long, -1 for short
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            PositionType::Long => 1.0,
            PositionType::Short => -1.0,
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "long"),
            PositionType::Short => write!(f, "short"),
        }
    }
}

impl FromStr for PositionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "long" => Ok(PositionType::Long),
            "short" => Ok(PositionType::Short),
            _ => Err(Error::InvalidValue("position_type must be 'long' or 'short'")),
        }
    }
}

/// Simulation settings. Percentages are fractions, costs are fixed dollars
/// per side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestParams {
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    /// Bars between a signal and the entry at that later bar's open
    pub entry_delay: Period,
    pub max_holding_periods: Period,
    pub initial_portfolio_size: f64,
    pub commission: f64,
    pub slippage: f64,
    pub position_type: PositionType,
}

impl Default for BacktestParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: 0.02,
            take_profit_pct: 0.04,
            entry_delay: Period::new_const(1),
            max_holding_periods: Period::new_const(20),
            initial_portfolio_size: 10_000.0,
            commission: 0.65,
            slippage: 0.1,
            position_type: PositionType::Long,
        }
    }
}

fn check_number(name: &'static str, value: f64, valid: bool, domain: &str) -> Result<()> {
    if !value.is_finite() || !valid {
        return Err(Error::invalid_param(name, format!("{value} must be {domain}")));
    }
    Ok(())
}

fn bag_number(params: &ParamBag, key: &'static str, default: f64) -> Result<f64> {
    match params.get(key) {
        None => Ok(default),
        Some(ParamValue::Number(v)) => Ok(*v),
        Some(other) => Err(Error::invalid_param(key, format!("expected a number, got {other:?}"))),
    }
}

impl BacktestParams {
    /// Check every field against its domain
    pub fn validate(&self) -> Result<()> {
        let p = self;
        check_number("stop_loss_pct", p.stop_loss_pct, p.stop_loss_pct > 0.0 && p.stop_loss_pct < 1.0, "in (0, 1)")?;
        check_number("take_profit_pct", p.take_profit_pct, p.take_profit_pct > 0.0, "> 0")?;
        if p.position_type == PositionType::Short && p.take_profit_pct >= 1.0 {
            return Err(Error::invalid_param("take_profit_pct", "must be < 1 for short positions"));
        }
        check_number(
            "initial_portfolio_size",
            p.initial_portfolio_size,
            p.initial_portfolio_size > 0.0,
            "> 0",
        )?;
        check_number("commission", p.commission, p.commission >= 0.0, ">= 0")?;
        check_number("slippage", p.slippage, p.slippage >= 0.0, ">= 0")?;
        Ok(())
    }

    /// Parse a request-layer bag. Missing keys take their defaults.
    pub fn from_bag(params: &ParamBag) -> Result<Self> {
        let d = Self::default();
        let parsed = Self {
            stop_loss_pct: bag_number(params, "stop_loss_pct", d.stop_loss_pct)?,
            take_profit_pct: bag_number(params, "take_profit_pct", d.take_profit_pct)?,
            entry_delay: get_period(params, "entry_delay", d.entry_delay.get())?,
            max_holding_periods: get_period(params, "max_holding_periods", d.max_holding_periods.get())?,
            initial_portfolio_size: bag_number(params, "initial_portfolio_size", d.initial_portfolio_size)?,
            commission: bag_number(params, "commission", d.commission)?,
            slippage: bag_number(params, "slippage", d.slippage)?,
            position_type: get_choice(params, "position_type", d.position_type)?,
        };
        parsed.validate()?;
        Ok(parsed)
    }
}

/// A backtest described in a TOML file:
///
/// ```toml
/// [backtest]
/// stop_loss_pct = 0.03
/// position_type = "short"
///
/// [pattern]
/// pattern = "shooting_star"
/// upper_shadow_ratio = 2.5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    #[serde(default)]
    pub backtest: BacktestParams,
    pub pattern: BuiltinDetector,
}

impl BacktestConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.backtest.validate()?;
        config.pattern.validate_config()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }
}
