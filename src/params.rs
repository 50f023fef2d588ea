//! Parameter metadata and request-side parameter bags
//!
//! Detectors carry statically typed fields. The calling layer, however, hands
//! over a loosely typed [`ParamBag`] (numbers, flags and strings keyed by
//! name). [`ParameterizedDetector::with_params`] parses such a bag exactly
//! once into a typed detector, filling absent keys from defaults and
//! rejecting wrong-typed or out-of-domain values as
//! [`Error::InvalidParameter`].
//!
//! # Example
//!
//! ```rust
//! use candlelab::prelude::*;
//!
//! let bag = param_bag([("body_size_ratio", ParamValue::from(0.25)), ("require_green", false.into())]);
//! let hammer = HammerDetector::with_params(&bag).unwrap();
//! assert_eq!(hammer.body_size_ratio.get(), 0.25);
//! assert!(!hammer.require_green);
//!
//! for param in HammerDetector::param_meta() {
//!     println!("{}: {:?}", param.name, param.param_type);
//! }
//! ```

use std::{collections::HashMap, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Direction, Error, Multiple, Period, Ratio, Result};

// ============================================================
// PARAMETER VALUES
// ============================================================

/// One loosely typed parameter value as supplied by a caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
  Flag(bool),
  Number(f64),
  Text(String),
}

impl From<f64> for ParamValue {
  fn from(v: f64) -> Self {
    ParamValue::Number(v)
  }
}

impl From<usize> for ParamValue {
  fn from(v: usize) -> Self {
    ParamValue::Number(v as f64)
  }
}

impl From<bool> for ParamValue {
  fn from(v: bool) -> Self {
    ParamValue::Flag(v)
  }
}

impl From<&str> for ParamValue {
  fn from(v: &str) -> Self {
    ParamValue::Text(v.to_string())
  }
}

/// Named bag of parameters for one pattern
pub type ParamBag = HashMap<String, ParamValue>;

/// Build a [`ParamBag`] from `(name, value)` pairs
pub fn param_bag<K, I>(pairs: I) -> ParamBag
where
  K: Into<String>,
  I: IntoIterator<Item = (K, ParamValue)>,
{
  pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Non-negative multiplier, may exceed 1.0
  Multiple,
  /// Positive integer bar count
  Period,
  /// Boolean gate
  Flag,
  /// One of a fixed set of strings
  Choice(&'static [&'static str]),
}

/// Default value of a parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
  Number(f64),
  Flag(bool),
  Choice(&'static str),
  /// Optional parameter, off unless supplied
  Unset,
}

/// Metadata for a single detector parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: ParamDefault,
  /// Range for numeric parameters: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default: ParamDefault::Number(default), range, description }
  }

  pub const fn multiple(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Multiple, default: ParamDefault::Number(default), range, description }
  }

  /// A multiple that is only applied when supplied
  pub const fn optional_multiple(
    name: &'static str,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Multiple, default: ParamDefault::Unset, range, description }
  }

  pub const fn period(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Period, default: ParamDefault::Number(default), range, description }
  }

  pub const fn flag(name: &'static str, default: bool, description: &'static str) -> Self {
    Self {
      name,
      param_type: ParamType::Flag,
      default: ParamDefault::Flag(default),
      range: (0.0, 1.0, 1.0),
      description,
    }
  }

  pub const fn choice(
    name: &'static str,
    default: &'static str,
    options: &'static [&'static str],
    description: &'static str,
  ) -> Self {
    Self {
      name,
      param_type: ParamType::Choice(options),
      default: ParamDefault::Choice(default),
      range: (0.0, 0.0, 0.0),
      description,
    }
  }

  /// Validate a supplied value against this parameter's type and range
  pub fn validate(&self, value: &ParamValue) -> Result<()> {
    let invalid = |reason: String| Error::invalid_param(self.name, reason);
    match (self.param_type, value) {
      (ParamType::Ratio | ParamType::Multiple | ParamType::Period, ParamValue::Number(v)) => {
        let (min, max, _) = self.range;
        if v.is_nan() || *v < min || *v > max {
          return Err(invalid(format!("{v} out of range [{min}, {max}]")));
        }
        if self.param_type == ParamType::Period && v.fract() != 0.0 {
          return Err(invalid("must be a positive integer".into()));
        }
        Ok(())
      },
      (ParamType::Flag, ParamValue::Flag(_)) => Ok(()),
      (ParamType::Choice(options), ParamValue::Text(s)) => {
        if options.contains(&s.as_str()) {
          Ok(())
        } else {
          Err(invalid(format!("'{s}' is not one of {options:?}")))
        }
      },
      (expected, got) => Err(invalid(format!("expected {expected:?}, got {got:?}"))),
    }
  }
}

/// Validate every supplied key that a schema knows about. Unknown keys are ignored.
pub fn validate_bag(schema: &[ParamMeta], params: &ParamBag) -> Result<()> {
  for meta in schema {
    if let Some(value) = params.get(meta.name) {
      meta.validate(value)?;
    }
  }
  Ok(())
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Trait for detectors that can be built from a [`ParamBag`]
pub trait ParameterizedDetector: Sized {
  /// Returns metadata for all configurable parameters
  fn param_meta() -> &'static [ParamMeta];

  /// Creates a detector from a parameter bag. Missing parameters use their defaults.
  fn with_params(params: &ParamBag) -> Result<Self>;

  /// Returns the pattern ID string
  fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

fn number(params: &ParamBag, key: &'static str) -> Result<Option<f64>> {
  match params.get(key) {
    None => Ok(None),
    Some(ParamValue::Number(v)) => Ok(Some(*v)),
    Some(other) => Err(Error::invalid_param(key, format!("expected a number, got {other:?}"))),
  }
}

/// Get a Ratio from params with default fallback
pub fn get_ratio(params: &ParamBag, key: &'static str, default: f64) -> Result<Ratio> {
  let value = number(params, key)?.unwrap_or(default);
  Ratio::new(value).map_err(|e| Error::invalid_param(key, e))
}

/// Get a Multiple from params with default fallback
pub fn get_multiple(params: &ParamBag, key: &'static str, default: f64) -> Result<Multiple> {
  let value = number(params, key)?.unwrap_or(default);
  Multiple::new(value).map_err(|e| Error::invalid_param(key, e))
}

/// Get an optional Multiple; absent keys fall back to `default`
pub fn get_optional_multiple(
  params: &ParamBag,
  key: &'static str,
  default: Option<f64>,
) -> Result<Option<Multiple>> {
  number(params, key)?
    .or(default)
    .map(|v| Multiple::new(v).map_err(|e| Error::invalid_param(key, e)))
    .transpose()
}

/// Get a Period from params with default fallback
pub fn get_period(params: &ParamBag, key: &'static str, default: usize) -> Result<Period> {
  let value = number(params, key)?.unwrap_or(default as f64);
  if value < 0.0 || value.fract() != 0.0 {
    return Err(Error::invalid_param(key, "must be a positive integer"));
  }
  Period::new(value as usize).map_err(|e| Error::invalid_param(key, e))
}

/// Get a boolean gate from params with default fallback
pub fn get_flag(params: &ParamBag, key: &'static str, default: bool) -> Result<bool> {
  match params.get(key) {
    None => Ok(default),
    Some(ParamValue::Flag(b)) => Ok(*b),
    Some(other) => Err(Error::invalid_param(key, format!("expected a boolean, got {other:?}"))),
  }
}

/// Get an enum-valued filter from params with default fallback
pub fn get_choice<T>(params: &ParamBag, key: &'static str, default: T) -> Result<T>
where
  T: FromStr<Err = Error>,
{
  match params.get(key) {
    None => Ok(default),
    Some(ParamValue::Text(s)) => s.parse().map_err(|e: Error| Error::invalid_param(key, e)),
    Some(other) => Err(Error::invalid_param(key, format!("expected a string, got {other:?}"))),
  }
}

// ============================================================
// SHARED FILTERS
// ============================================================

/// Candle-color filter for single-bar patterns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandleColor {
  #[default]
  Both,
  Green,
  Red,
}

impl CandleColor {
  pub const OPTIONS: &'static [&'static str] = &["both", "green", "red"];

  /// Whether a candle with signed `body` passes this filter
  #[inline]
  pub fn admits(self, body: f64) -> bool {
    match self {
      CandleColor::Both => true,
      CandleColor::Green => body > 0.0,
      CandleColor::Red => body < 0.0,
    }
  }
}

impl FromStr for CandleColor {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "both" => Ok(CandleColor::Both),
      "green" => Ok(CandleColor::Green),
      "red" => Ok(CandleColor::Red),
      _ => Err(Error::InvalidValue("candle color must be both, green or red")),
    }
  }
}

/// Direction filter for patterns that classify bullish/bearish variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternBias {
  #[default]
  Both,
  Bullish,
  Bearish,
}

impl PatternBias {
  pub const OPTIONS: &'static [&'static str] = &["both", "bullish", "bearish"];

  /// `Both` admits every classification, neutral included
  #[inline]
  pub fn admits(self, direction: Direction) -> bool {
    match self {
      PatternBias::Both => true,
      PatternBias::Bullish => direction == Direction::Bullish,
      PatternBias::Bearish => direction == Direction::Bearish,
    }
  }
}

impl FromStr for PatternBias {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "both" => Ok(PatternBias::Both),
      "bullish" => Ok(PatternBias::Bullish),
      "bearish" => Ok(PatternBias::Bearish),
      _ => Err(Error::InvalidValue("pattern type must be both, bullish or bearish")),
    }
  }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_param_meta_ratio() {
    let meta = ParamMeta::ratio("test_ratio", 0.5, (0.3, 0.7, 0.1), "Test ratio parameter");

    assert_eq!(meta.name, "test_ratio");
    assert_eq!(meta.param_type, ParamType::Ratio);
    assert_eq!(meta.default, ParamDefault::Number(0.5));
  }

  #[test]
  fn test_validate_numeric() {
    let meta = ParamMeta::period("test", 14.0, (10.0, 20.0, 2.0), "Test");

    assert!(meta.validate(&14.0.into()).is_ok());
    assert!(meta.validate(&8.0.into()).is_err());
    assert!(meta.validate(&14.5.into()).is_err());
    assert!(meta.validate(&true.into()).is_err());
  }

  #[test]
  fn test_validate_choice() {
    let meta = ParamMeta::choice("candle_color", "both", CandleColor::OPTIONS, "Test");

    assert!(meta.validate(&"red".into()).is_ok());
    let err = meta.validate(&"purple".into()).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { ref name, .. } if name == "candle_color"));
  }

  #[test]
  fn test_get_helpers() {
    let params = param_bag([
      ("ratio", ParamValue::from(0.8)),
      ("period", 20usize.into()),
      ("gate", false.into()),
      ("color", "green".into()),
    ]);

    assert!((get_ratio(&params, "ratio", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
    assert!((get_ratio(&params, "missing", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
    assert_eq!(get_period(&params, "period", 14).unwrap().get(), 20);
    assert_eq!(get_period(&params, "missing", 14).unwrap().get(), 14);
    assert!(!get_flag(&params, "gate", true).unwrap());
    assert_eq!(get_choice(&params, "color", CandleColor::Both).unwrap(), CandleColor::Green);
    assert_eq!(get_optional_multiple(&params, "missing", None).unwrap(), None);
  }

  #[test]
  fn test_get_helpers_reject_bad_values() {
    let params = param_bag([
      ("ratio", ParamValue::from(-0.1)),
      ("period", 0usize.into()),
      ("gate", "yes".into()),
      ("color", "purple".into()),
    ]);

    for err in [
      get_ratio(&params, "ratio", 0.5).unwrap_err(),
      get_period(&params, "period", 5).unwrap_err(),
      get_flag(&params, "gate", true).unwrap_err(),
      get_choice(&params, "color", CandleColor::Both).unwrap_err(),
    ] {
      assert!(matches!(err, Error::InvalidParameter { .. }), "{err:?}");
    }
  }

  #[test]
  fn test_filters() {
    assert!(CandleColor::Both.admits(0.0));
    assert!(CandleColor::Green.admits(1.0));
    assert!(!CandleColor::Green.admits(-1.0));
    assert!(!CandleColor::Red.admits(0.0));

    assert!(PatternBias::Both.admits(Direction::Neutral));
    assert!(!PatternBias::Bullish.admits(Direction::Neutral));
    assert!(PatternBias::Bearish.admits(Direction::Bearish));
  }

  #[test]
  fn test_param_value_deserialize_untagged() {
    let bag: ParamBag =
      serde_json::from_str(r#"{"ratio": 0.3, "gate": true, "kind": "bullish"}"#).unwrap();
    assert_eq!(bag["ratio"], ParamValue::Number(0.3));
    assert_eq!(bag["gate"], ParamValue::Flag(true));
    assert_eq!(bag["kind"], ParamValue::Text("bullish".into()));
  }
}
