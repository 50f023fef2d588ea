//! Single-position trade simulator
//!
//! Walks the bars once. At most one position is open at any time; signals
//! that arrive while a position is open are ignored.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::params::{BacktestParams, PositionType};
use crate::{metrics::CandleSeries, Bar, Result, SignalColumn};

// ============================================================
// LEDGER TYPES
// ============================================================

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    MaxPeriods,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::MaxPeriods => "max_periods",
            ExitReason::EndOfData => "end_of_data",
        };
        f.write_str(s)
    }
}

/// One completed round trip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub position_type: PositionType,
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_date: DateTime<FixedOffset>,
    pub exit_date: DateTime<FixedOffset>,
    /// Entry fill including slippage
    pub entry_price: f64,
    /// Exit fill including slippage
    pub exit_price: f64,
    pub shares: f64,
    pub exit_reason: ExitReason,
    /// Signed return between the two fills, as a fraction
    pub profit_pct: f64,
    /// Gross price move on the position, before costs
    pub profit_amount: f64,
    /// Entry plus exit commission
    pub commission: f64,
    /// Entry plus exit slippage
    pub slippage_cost: f64,
    pub periods_held: usize,
}

impl Trade {
    /// Profit after commission and slippage
    pub fn net_profit(&self) -> f64 {
        self.profit_amount - self.commission - self.slippage_cost
    }

    #[inline]
    pub fn is_win(&self) -> bool {
        self.profit_pct > 0.0
    }

    #[inline]
    pub fn is_loss(&self) -> bool {
        self.profit_pct < 0.0
    }
}

/// Portfolio value snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<FixedOffset>,
    pub value: f64,
}

/// Ledger and equity curve of one simulation pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub trades: Vec<Trade>,
    /// Start point, then one point per closed trade
    pub equity_curve: Vec<EquityPoint>,
    pub initial_value: f64,
    pub final_value: f64,
    pub total_commission: f64,
    pub total_slippage: f64,
}

// ============================================================
// POSITION STATE
// ============================================================

#[derive(Debug, Clone, Copy)]
struct Position {
    side: PositionType,
    entry_index: usize,
    entry_date: DateTime<FixedOffset>,
    /// Bar open the entry was based on
    raw_entry: f64,
    entry_price: f64,
    stop_loss: f64,
    take_profit: f64,
    shares: f64,
    periods_held: usize,
    /// Portfolio value before any cost of this trade
    value_at_entry: f64,
}

impl Position {
    /// Adverse price adjustment that turns a fixed dollar cost into a per-share one
    #[inline]
    fn slip_per_share(&self, slippage: f64) -> f64 {
        slippage / self.shares
    }

    /// Exit level touched by `bar`, stop before target
    fn touched_exit(&self, bar: &Bar) -> Option<(ExitReason, f64)> {
        let (stop_hit, target_hit) = match self.side {
            PositionType::Long => (bar.low <= self.stop_loss, bar.high >= self.take_profit),
            PositionType::Short => (bar.high >= self.stop_loss, bar.low <= self.take_profit),
        };
        if stop_hit {
            Some((ExitReason::StopLoss, self.stop_loss))
        } else if target_hit {
            Some((ExitReason::TakeProfit, self.take_profit))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum State {
    Flat,
    Open(Position),
}

// ============================================================
// SIMULATOR
// ============================================================

/// Replays entry signals against bars under one [`BacktestParams`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Simulator {
    params: BacktestParams,
}

impl Simulator {
    pub fn new(params: BacktestParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &BacktestParams {
        &self.params
    }

    /// Simulate with a detector's flag column as entry signals
    pub fn run_column(&self, series: &CandleSeries, signals: &SignalColumn) -> SimulationOutcome {
        let flags: Vec<bool> = signals.flags().iter().map(Option::is_some).collect();
        self.run(series, &flags)
    }

    /// Simulate one pass. `signals[i]` requests an entry `entry_delay` bars
    /// after bar `i`; missing entries count as no signal.
    pub fn run(&self, series: &CandleSeries, signals: &[bool]) -> SimulationOutcome {
        let bars = series.bars();
        let initial = self.params.initial_portfolio_size;
        let delay = self.params.entry_delay.get();

        let mut outcome = SimulationOutcome {
            trades: Vec::new(),
            equity_curve: Vec::new(),
            initial_value: initial,
            final_value: initial,
            total_commission: 0.0,
            total_slippage: 0.0,
        };
        let Some(first) = bars.first() else {
            return outcome;
        };
        outcome.equity_curve.push(EquityPoint {
            timestamp: first.timestamp,
            value: initial,
        });

        let mut state = State::Flat;
        for (i, bar) in bars.iter().enumerate() {
            if let State::Flat = state {
                let signalled = i
                    .checked_sub(delay)
                    .and_then(|s| signals.get(s))
                    .copied()
                    .unwrap_or(false);
                if signalled && outcome.final_value <= 0.0 {
                    warn!(index = i, value = outcome.final_value, "portfolio exhausted, entry skipped");
                } else if signalled {
                    state = State::Open(self.open_position(i, bar, outcome.final_value));
                }
            }

            if let State::Open(mut position) = state {
                position.periods_held += 1;
                let exit = position.touched_exit(bar).or_else(|| {
                    (position.periods_held >= self.params.max_holding_periods.get())
                        .then_some((ExitReason::MaxPeriods, bar.close))
                });
                state = match exit {
                    Some((reason, price)) => {
                        self.close_position(&mut outcome, position, i, bar, price, reason);
                        State::Flat
                    },
                    None => State::Open(position),
                };
            }
        }

        if let (State::Open(position), Some(last)) = (state, bars.last()) {
            self.close_position(
                &mut outcome,
                position,
                bars.len() - 1,
                last,
                last.close,
                ExitReason::EndOfData,
            );
        }

        outcome
    }

    fn open_position(&self, index: usize, bar: &Bar, portfolio_value: f64) -> Position {
        let p = &self.params;
        let side = p.position_type;
        let shares = portfolio_value / bar.open;
        let mut position = Position {
            side,
            entry_index: index,
            entry_date: bar.timestamp,
            raw_entry: bar.open,
            entry_price: bar.open,
            stop_loss: 0.0,
            take_profit: 0.0,
            shares,
            periods_held: 0,
            value_at_entry: portfolio_value,
        };
        let fill = bar.open + side.sign() * position.slip_per_share(p.slippage);
        position.entry_price = fill;
        position.stop_loss = fill * (1.0 - side.sign() * p.stop_loss_pct);
        position.take_profit = fill * (1.0 + side.sign() * p.take_profit_pct);

        debug!(
            index,
            side = %side,
            price = fill,
            shares,
            stop_loss = position.stop_loss,
            take_profit = position.take_profit,
            "entered position"
        );
        position
    }

    fn close_position(
        &self,
        outcome: &mut SimulationOutcome,
        position: Position,
        index: usize,
        bar: &Bar,
        raw_exit: f64,
        reason: ExitReason,
    ) {
        let p = &self.params;
        let sign = position.side.sign();
        let exit_price = raw_exit - sign * position.slip_per_share(p.slippage);

        let profit_pct = sign * (exit_price - position.entry_price) / position.entry_price;
        let profit_amount = position.shares * sign * (raw_exit - position.raw_entry);
        let commission = 2.0 * p.commission;
        let slippage_cost = 2.0 * p.slippage;

        let trade = Trade {
            position_type: position.side,
            entry_index: position.entry_index,
            exit_index: index,
            entry_date: position.entry_date,
            exit_date: bar.timestamp,
            entry_price: position.entry_price,
            exit_price,
            shares: position.shares,
            exit_reason: reason,
            profit_pct,
            profit_amount,
            commission,
            slippage_cost,
            periods_held: position.periods_held,
        };

        let value = position.value_at_entry + trade.net_profit();
        debug!(
            index,
            reason = %reason,
            price = exit_price,
            profit_pct,
            value,
            "closed position"
        );

        outcome.total_commission += commission;
        outcome.total_slippage += slippage_cost;
        outcome.final_value = value;
        outcome.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            value,
        });
        outcome.trades.push(trade);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Period;
    use chrono::{Duration, TimeZone};

    fn ts(i: i64) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(4 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 6, 3, 9, 30, 0)
            .unwrap()
            + Duration::minutes(30 * i)
    }

    fn series(ohlc: &[(f64, f64, f64, f64)]) -> CandleSeries {
        let bars = ohlc
            .iter()
            .enumerate()
            .map(|(i, &(o, h, l, c))| Bar::new(ts(i as i64), o, h, l, c))
            .collect();
        CandleSeries::new(bars).unwrap()
    }

    fn frictionless() -> BacktestParams {
        BacktestParams {
            commission: 0.0,
            slippage: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_manages_entry_bar() {
        // entry bar itself dips through the stop
        let s = series(&[(100.0, 101.0, 99.0, 100.5), (100.0, 100.5, 97.0, 99.0)]);
        let out = Simulator::new(frictionless()).unwrap().run(&s, &[true, false]);
        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!((t.entry_index, t.exit_index), (1, 1));
        assert_eq!(t.exit_reason, ExitReason::StopLoss);
        assert_eq!(t.periods_held, 1);
    }

    #[test]
    fn test_stop_checked_before_target() {
        // one bar touches both levels
        let s = series(&[
            (100.0, 101.0, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 110.0, 90.0, 100.0),
        ]);
        let out = Simulator::new(frictionless()).unwrap().run(&s, &[true]);
        assert_eq!(out.trades[0].exit_reason, ExitReason::StopLoss);
        assert_eq!(out.trades[0].exit_price, 98.0);
    }

    #[test]
    fn test_max_periods_exit_at_close() {
        let params = BacktestParams {
            max_holding_periods: Period::new_const(2),
            ..frictionless()
        };
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 100.8, 99.8, 100.6),
            (100.6, 101.0, 100.0, 100.8),
        ]);
        let out = Simulator::new(params).unwrap().run(&s, &[true]);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::MaxPeriods);
        assert_eq!(t.exit_index, 2);
        assert_eq!(t.exit_price, 100.6);
        assert_eq!(t.periods_held, 2);
    }

    #[test]
    fn test_signals_ignored_while_open() {
        let s = series(&[
            (100.0, 100.5, 99.5, 100.0),
            (100.0, 100.5, 99.5, 100.2),
            (100.2, 100.8, 99.8, 100.6),
            (100.6, 101.0, 100.0, 100.8),
        ]);
        let out = Simulator::new(frictionless()).unwrap().run(&s, &[true, true, true, true]);
        assert_eq!(out.trades.len(), 1);
        assert_eq!(out.trades[0].exit_reason, ExitReason::EndOfData);
        assert_eq!(out.trades[0].exit_index, 3);
    }

    #[test]
    fn test_costs_reduce_equity() {
        let params = BacktestParams {
            commission: 1.0,
            slippage: 0.5,
            ..Default::default()
        };
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 100.5, 99.5, 100.0)]);
        let out = Simulator::new(params).unwrap().run(&s, &[true]);
        let t = &out.trades[0];
        assert_eq!(t.commission, 2.0);
        assert_eq!(t.slippage_cost, 1.0);
        assert!(t.entry_price > 100.0 && t.exit_price < 100.0);
        assert!((out.final_value - (10_000.0 - 3.0)).abs() < 1e-9);
        assert_eq!(out.equity_curve.len(), 2);
    }

    #[test]
    fn test_no_signals_leaves_equity_unchanged() {
        let s = series(&[(100.0, 100.5, 99.5, 100.0), (100.0, 100.5, 99.5, 100.0)]);
        let out = Simulator::new(BacktestParams::default()).unwrap().run(&s, &[]);
        assert!(out.trades.is_empty());
        assert_eq!(out.final_value, out.initial_value);
        assert_eq!(out.equity_curve.len(), 1);
        assert_eq!(out.equity_curve[0].timestamp, ts(0));
    }

    #[test]
    fn test_exhausted_portfolio_stays_flat() {
        // fixed costs eat the whole portfolio on the first round trip
        let params = BacktestParams {
            initial_portfolio_size: 1.0,
            commission: 0.5,
            slippage: 0.0,
            max_holding_periods: Period::new_const(1),
            ..Default::default()
        };
        let s = series(&[(100.0, 100.5, 99.5, 100.0); 6]);
        let out = Simulator::new(params).unwrap().run(&s, &[true, false, true, false, true]);

        assert_eq!(out.trades.len(), 1);
        let t = &out.trades[0];
        assert_eq!(t.exit_reason, ExitReason::MaxPeriods);
        assert!(t.shares > 0.0 && t.shares.is_finite());
        assert_eq!(out.final_value, 0.0);
        assert_eq!(out.total_commission, 1.0);
        assert_eq!(out.equity_curve.len(), 2);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = BacktestParams {
            stop_loss_pct: -0.1,
            ..Default::default()
        };
        assert!(Simulator::new(params).is_err());
    }
}
