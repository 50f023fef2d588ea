//! Detector + simulator + analyzer composition

use serde::Serialize;
use tracing::{info, warn};

use super::{
    analyzer::{max_drawdown, summarize, PerformanceReport},
    params::BacktestParams,
    simulator::{EquityPoint, SimulationOutcome, Simulator, Trade},
};
use crate::{
    metrics::CandleSeries, params::ParamBag, registry::PatternRegistry, Error, PatternDetector,
    PatternId, Result,
};

/// Everything one backtest produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub pattern_id: PatternId,
    pub params: BacktestParams,
    pub signals: usize,
    pub initial_portfolio_value: f64,
    pub final_portfolio_value: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub report: PerformanceReport,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
}

impl BacktestResult {
    fn new(
        pattern_id: PatternId,
        params: BacktestParams,
        signals: usize,
        outcome: SimulationOutcome,
    ) -> Self {
        let report = summarize(&outcome.trades);
        let (max_drawdown, max_drawdown_pct) = max_drawdown(&outcome.equity_curve);
        Self {
            pattern_id,
            params,
            signals,
            initial_portfolio_value: outcome.initial_value,
            final_portfolio_value: outcome.final_value,
            total_commission: outcome.total_commission,
            total_slippage: outcome.total_slippage,
            max_drawdown,
            max_drawdown_pct,
            report,
            equity_curve: outcome.equity_curve,
            trades: outcome.trades,
        }
    }

    /// Final over initial value, minus one
    pub fn total_return(&self) -> f64 {
        self.final_portfolio_value / self.initial_portfolio_value - 1.0
    }
}

/// Runs one detector's signals through the simulator
#[derive(Debug, Clone)]
pub struct Backtester<D> {
    detector: D,
    simulator: Simulator,
}

impl<D: PatternDetector> Backtester<D> {
    pub fn new(detector: D, params: BacktestParams) -> Result<Self> {
        detector.validate_config()?;
        Ok(Self {
            detector,
            simulator: Simulator::new(params)?,
        })
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn params(&self) -> &BacktestParams {
        self.simulator.params()
    }

    /// Detect, simulate and summarize.
    ///
    /// An empty series is [`Error::InsufficientData`]; a series on which the
    /// detector never fires is [`Error::NoSignalsForBacktest`].
    pub fn run(&self, series: &CandleSeries) -> Result<BacktestResult> {
        if series.is_empty() {
            return Err(Error::InsufficientData { need: 1, got: 0 });
        }

        let pattern_id = self.detector.id();
        let signals = self.detector.detect(series);
        let signal_count = signals.count();
        if signal_count == 0 {
            warn!(pattern = %pattern_id, bars = series.len(), "no signals, backtest skipped");
            return Err(Error::NoSignalsForBacktest {
                pattern: pattern_id.to_string(),
            });
        }

        let outcome = self.simulator.run_column(series, &signals);
        let result = BacktestResult::new(pattern_id, *self.params(), signal_count, outcome);
        info!(
            pattern = %pattern_id,
            signals = signal_count,
            trades = result.report.total_trades,
            win_rate = result.report.win_rate,
            final_value = result.final_portfolio_value,
            "backtest complete"
        );
        Ok(result)
    }
}

/// Resolve `pattern` in `registry`, build it from `pattern_params` and backtest it
pub fn run_pattern(
    registry: &PatternRegistry,
    pattern: &str,
    pattern_params: &ParamBag,
    series: &CandleSeries,
    params: BacktestParams,
) -> Result<BacktestResult> {
    let detector = registry.build(pattern, pattern_params)?;
    Backtester::new(detector, params)?.run(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detectors::EngulfingDetector, Bar, ErrorKind};
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    fn ts(i: i64) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
            .unwrap()
            + Duration::days(i)
    }

    fn flat_series(n: i64) -> CandleSeries {
        let bars = (0..n).map(|i| Bar::new(ts(i), 100.0, 100.5, 99.5, 100.1)).collect();
        CandleSeries::new(bars).unwrap()
    }

    #[test]
    fn test_empty_series_is_insufficient_data() {
        let backtester = Backtester::new(EngulfingDetector::default(), BacktestParams::default()).unwrap();
        let err = backtester.run(&CandleSeries::new(Vec::new()).unwrap()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_no_signals_is_reported() {
        let backtester = Backtester::new(EngulfingDetector::default(), BacktestParams::default()).unwrap();
        let err = backtester.run(&flat_series(10)).unwrap_err();
        assert_eq!(
            err,
            Error::NoSignalsForBacktest {
                pattern: "engulfing".into()
            }
        );
    }

    #[test]
    fn test_run_pattern_unknown_id() {
        let registry = PatternRegistry::with_builtins();
        let err = run_pattern(
            &registry,
            "abandoned_baby",
            &ParamBag::new(),
            &flat_series(3),
            BacktestParams::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownPattern);
    }
}
