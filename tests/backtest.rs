//! Integration tests for the backtest pipeline: signals into the simulator,
//! ledger into the performance report.

use candlelab::prelude::*;
use chrono::{DateTime, Duration, FixedOffset, TimeZone};

fn ts(i: usize) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(2024, 7, 1, 9, 30, 0)
        .unwrap()
        + Duration::days(i as i64)
}

fn make_bars(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    ohlc.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Bar::new(ts(i), o, h, l, c))
        .collect()
}

fn series(ohlc: &[(f64, f64, f64, f64)]) -> CandleSeries {
    CandleSeries::new(make_bars(ohlc)).unwrap()
}

fn frictionless() -> BacktestParams {
    BacktestParams {
        commission: 0.0,
        slippage: 0.0,
        ..Default::default()
    }
}

const QUIET: (f64, f64, f64, f64) = (100.0, 100.5, 99.5, 100.0);

/// Five sideways bars, a hammer at index 5, then a rally through the target
fn hammer_rally() -> Vec<(f64, f64, f64, f64)> {
    let mut ohlc = vec![(100.0, 100.6, 99.9, 100.4); 5];
    ohlc.push((100.0, 101.0, 95.0, 100.5));
    ohlc.push((100.6, 101.2, 100.2, 101.0));
    ohlc.push((101.0, 105.0, 100.8, 104.8));
    ohlc
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================
// SIMULATOR TESTS
// ============================================================

#[test]
fn test_long_stop_loss() {
    let s = series(&[QUIET, QUIET, (99.5, 100.0, 97.0, 97.5)]);
    let out = Simulator::new(frictionless()).unwrap().run(&s, &[true]);

    assert_eq!(out.trades.len(), 1);
    let t = &out.trades[0];
    assert_eq!((t.entry_index, t.exit_index), (1, 2));
    assert_eq!(t.entry_price, 100.0);
    assert_eq!(t.exit_price, 98.0);
    assert_eq!(t.exit_reason, ExitReason::StopLoss);
    assert!(approx(t.profit_pct, -0.02));
    assert!(approx(t.profit_amount, -200.0));
    assert!(approx(out.final_value, 9_800.0));
    assert!(t.is_loss());
}

#[test]
fn test_open_position_closes_at_end_of_data() {
    let s = series(&[QUIET, QUIET, QUIET, (100.0, 100.5, 99.5, 100.3)]);
    let out = Simulator::new(frictionless()).unwrap().run(&s, &[false, true]);

    let t = &out.trades[0];
    assert_eq!(t.entry_index, 2);
    assert_eq!(t.exit_index, 3);
    assert_eq!(t.exit_reason, ExitReason::EndOfData);
    assert_eq!(t.exit_price, 100.3);
    assert_eq!(t.periods_held, 2);
}

#[test]
fn test_entry_delay() {
    let params = BacktestParams {
        entry_delay: Period::new(2).unwrap(),
        ..frictionless()
    };
    let s = series(&[QUIET; 5]);
    let out = Simulator::new(params).unwrap().run(&s, &[true]);
    assert_eq!(out.trades[0].entry_index, 2);
    assert_eq!(out.trades[0].entry_date, ts(2));
}

#[test]
fn test_short_position_mirrors_levels() {
    let short = BacktestParams {
        position_type: PositionType::Short,
        ..frictionless()
    };
    let simulator = Simulator::new(short).unwrap();

    let stopped = simulator.run(&series(&[QUIET, QUIET, (100.0, 103.0, 99.8, 102.5)]), &[true]);
    let t = &stopped.trades[0];
    assert_eq!(t.position_type, PositionType::Short);
    assert_eq!(t.exit_reason, ExitReason::StopLoss);
    assert!(approx(t.exit_price, 102.0));
    assert!(approx(t.profit_pct, -0.02));

    let covered = simulator.run(&series(&[QUIET, QUIET, (100.0, 100.2, 95.0, 95.5)]), &[true]);
    let t = &covered.trades[0];
    assert_eq!(t.exit_reason, ExitReason::TakeProfit);
    assert!(approx(t.exit_price, 96.0));
    assert!(approx(t.profit_pct, 0.04));
    assert!(approx(t.profit_amount, 400.0));
    assert!(t.is_win());
}

#[test]
fn test_compounding_between_trades() {
    // first trade stops out, the second is sized from what is left
    let s = series(&[
        QUIET,
        QUIET,
        (99.5, 100.0, 97.0, 97.5),
        QUIET,
        QUIET,
        QUIET,
    ]);
    let out = Simulator::new(frictionless()).unwrap().run(&s, &[true, false, false, true]);

    assert_eq!(out.trades.len(), 2);
    assert!(out.trades[1].entry_index > out.trades[0].exit_index);
    assert!(approx(out.trades[1].shares, 9_800.0 / 100.0));
    assert_eq!(out.equity_curve.len(), 3);
    assert!(approx(out.equity_curve[1].value, 9_800.0));
}

#[test]
fn test_mark_signals_feeds_simulator() {
    let s = series(&[QUIET; 6]);
    let dates = [
        ts(1) + Duration::hours(3),
        // before the first bar
        ts(0) - Duration::days(3),
    ];
    let column = mark_signals(&s, PatternId("external"), &dates);
    assert_eq!(column.count(), 1);
    assert!(column.is_set(1));

    let out = Simulator::new(frictionless()).unwrap().run_column(&s, &column);
    let t = &out.trades[0];
    assert_eq!(t.entry_index, 2);
    assert_eq!(t.exit_reason, ExitReason::EndOfData);
    assert_eq!(t.periods_held, 4);
}

// ============================================================
// BACKTESTER TESTS
// ============================================================

#[test]
fn test_hammer_backtest_end_to_end() {
    let backtester = Backtester::new(HammerDetector::with_defaults(), BacktestParams::default()).unwrap();
    let result = backtester.run(&series(&hammer_rally())).unwrap();

    assert_eq!(result.pattern_id, PatternId("hammer"));
    assert_eq!(result.signals, 1);
    assert_eq!(result.report.total_trades, 1);
    assert_eq!(result.report.winning_trades, 1);
    assert_eq!(result.report.win_rate, 1.0);
    assert_eq!(result.report.profit_factor, 0.0);

    let t = &result.trades[0];
    assert_eq!(t.entry_index, 6);
    assert_eq!(t.exit_index, 7);
    assert_eq!(t.exit_reason, ExitReason::TakeProfit);
    assert!(t.entry_price > 100.6);
    assert_eq!(t.commission, 1.3);
    assert!(approx(t.slippage_cost, 0.2));

    assert!(result.total_return() > 0.0);
    assert_eq!(result.max_drawdown, 0.0);
    assert!(approx(result.total_commission, 1.3));
}

#[test]
fn test_ledger_identity() {
    let backtester = Backtester::new(HammerDetector::with_defaults(), BacktestParams::default()).unwrap();
    let result = backtester.run(&series(&hammer_rally())).unwrap();

    let gross: f64 = result.trades.iter().map(|t| t.profit_amount).sum();
    let expected =
        result.initial_portfolio_value + gross - result.total_commission - result.total_slippage;
    assert!(approx(result.final_portfolio_value, expected));
    assert_eq!(
        result.equity_curve.last().map(|p| p.value),
        Some(result.final_portfolio_value)
    );
}

#[test]
fn test_report_buckets() {
    let backtester = Backtester::new(HammerDetector::with_defaults(), frictionless()).unwrap();
    let result = backtester.run(&series(&hammer_rally())).unwrap();

    let hourly = &result.report.hourly;
    assert_eq!(hourly.len(), 24);
    assert_eq!(hourly[9].trades, 1);
    assert_eq!(hourly.iter().map(|b| b.trades).sum::<usize>(), 1);

    assert_eq!(result.report.by_exit_reason.len(), 1);
    assert_eq!(result.report.by_exit_reason[0].reason, ExitReason::TakeProfit);
    assert!((result.report.total_profit_pct - 0.04).abs() < 1e-9);
}

#[test]
fn test_no_signals_error() {
    let backtester = Backtester::new(HammerDetector::with_defaults(), BacktestParams::default()).unwrap();
    let err = backtester.run(&series(&[QUIET; 10])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSignals);
}

#[test]
fn test_result_serializes_to_json() {
    let backtester = Backtester::new(HammerDetector::with_defaults(), BacktestParams::default()).unwrap();
    let result = backtester.run(&series(&hammer_rally())).unwrap();
    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"exit_reason\":\"take_profit\""));
    assert!(json.contains("\"position_type\":\"long\""));
    assert!(json.contains("\"pattern_id\":\"hammer\""));
}

#[test]
fn test_run_pattern_through_registry() {
    let registry = PatternRegistry::with_builtins();
    let result = run_pattern(
        &registry,
        "hammer",
        &ParamBag::new(),
        &series(&hammer_rally()),
        frictionless(),
    )
    .unwrap();
    assert_eq!(result.report.total_trades, 1);
    assert!(approx(result.final_portfolio_value, 10_400.0));
}

#[test]
fn test_backtest_from_toml_config() {
    let config = BacktestConfig::from_toml_str(
        r#"
            [backtest]
            commission = 0.0
            slippage = 0.0
            take_profit_pct = 0.02

            [pattern]
            pattern = "hammer"
            lower_shadow_ratio = 3.0
        "#,
    )
    .unwrap();
    let backtester = Backtester::new(config.pattern, config.backtest).unwrap();
    let result = backtester.run(&series(&hammer_rally())).unwrap();

    let t = &result.trades[0];
    assert_eq!(t.exit_index, 7);
    assert_eq!(t.exit_reason, ExitReason::TakeProfit);
    assert!(approx(t.exit_price, 100.6 * 1.02));
    assert!(approx(t.profit_pct, 0.02));
}

#[test]
fn test_parallel_backtests() {
    let rally = make_bars(&hammer_rally());
    let quiet = make_bars(&[QUIET; 10]);
    let instruments = vec![("RALLY", &rally[..]), ("QUIET", &quiet[..])];

    let backtester = Backtester::new(HammerDetector::with_defaults(), frictionless()).unwrap();
    let (ok, failed) = backtest_parallel(&backtester, instruments);

    assert_eq!(ok.len(), 1);
    assert_eq!(ok[0].symbol, "RALLY");
    assert_eq!(ok[0].output.report.total_trades, 1);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].symbol, "QUIET");
    assert_eq!(failed[0].error.kind(), ErrorKind::NoSignals);
}
