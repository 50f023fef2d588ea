//! Single-position backtesting
//!
//! - [`params`]: [`BacktestParams`], [`PositionType`], TOML [`BacktestConfig`]
//! - [`simulator`]: walks bars and signals into a trade ledger and equity curve
//! - [`analyzer`]: win rate, profit factor, hourly and exit-reason breakdowns
//! - [`runner`]: [`Backtester`] ties a detector to the simulator

pub mod analyzer;
pub mod params;
pub mod runner;
pub mod simulator;

pub use analyzer::{
    exit_reason_breakdown, hourly_breakdown, max_drawdown, summarize, ExitBucket, HourlyBucket,
    PerformanceReport,
};
pub use params::{BacktestConfig, BacktestParams, PositionType};
pub use runner::{run_pattern, BacktestResult, Backtester};
pub use simulator::{EquityPoint, ExitReason, SimulationOutcome, Simulator, Trade};
