//! Candlestick pattern detectors
//!
//! Every detector is a plain parameter struct implementing
//! [`PatternDetector`](crate::PatternDetector) and
//! [`ParameterizedDetector`](crate::params::ParameterizedDetector).
//!
//! # Pattern Categories
//!
//! - **Single-bar (5)**: Hammer, Shooting Star, Doji, Marubozu, Elephant Bar
//! - **Two-bar (8)**: Engulfing, Harami, Piercing Line, Dark Cloud Cover,
//!   Tweezer Top/Bottom, Kicker, Counter-Attack
//! - **Three-bar (6)**: Three White Soldiers/Black Crows, Morning/Evening Star,
//!   Three Inside Up/Down
//!
//! Trend gates are off by default. When enabled, the lead candle (first bar of
//! the formation) must sit in a downtrend for bullish variants and an uptrend
//! for bearish ones; an undefined trend never matches.

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
  ($($detector:ty),* $(,)?) => {
    $(impl $detector {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod single_bar;
pub mod three_bar;
pub mod two_bar;

// Re-export all detectors for convenience
pub use single_bar::*;
pub use three_bar::*;
pub use two_bar::*;
