//! Aggregate statistics over a trade ledger
//!
//! All percentages are fractions. Ratios with an empty denominator are 0.

use std::collections::BTreeMap;

use chrono::Timelike;
use serde::Serialize;

use super::simulator::{EquityPoint, ExitReason, Trade};

// ============================================================
// REPORT TYPES
// ============================================================

/// Summary of a trade ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// Gross winning `profit_pct` over gross losing; 0 without losses
    pub profit_factor: f64,
    /// Mean `profit_pct`
    pub average_profit: f64,
    /// Sum of `profit_pct`
    pub total_profit_pct: f64,
    /// Sum of gross `profit_amount`
    pub total_profit_amount: f64,
    pub average_periods_held: f64,
    pub hourly: Vec<HourlyBucket>,
    pub by_exit_reason: Vec<ExitBucket>,
}

/// Trades entered during one hour of the day (entry timestamp, local time)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HourlyBucket {
    pub hour: u32,
    pub trades: usize,
    pub total_profit: f64,
    pub win_rate: f64,
    pub average_profit: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExitBucket {
    pub reason: ExitReason,
    pub trades: usize,
    pub total_profit: f64,
    pub win_rate: f64,
}

#[inline]
fn ratio(num: f64, den: usize) -> f64 {
    if den > 0 {
        num / den as f64
    } else {
        0.0
    }
}

// ============================================================
// SUMMARIZE
// ============================================================

/// Aggregate a ledger. An empty ledger gives an all-zero report with 24 empty
/// hourly buckets.
pub fn summarize(trades: &[Trade]) -> PerformanceReport {
    let total_trades = trades.len();
    let winning_trades = trades.iter().filter(|t| t.is_win()).count();
    let losing_trades = trades.iter().filter(|t| t.is_loss()).count();

    let gross_win: f64 = trades.iter().filter(|t| t.is_win()).map(|t| t.profit_pct).sum();
    let gross_loss: f64 = trades
        .iter()
        .filter(|t| t.is_loss())
        .map(|t| t.profit_pct)
        .sum::<f64>()
        .abs();
    let profit_factor = if gross_loss > 0.0 {
        gross_win / gross_loss
    } else {
        0.0
    };

    let total_profit_pct: f64 = trades.iter().map(|t| t.profit_pct).sum();
    let periods: usize = trades.iter().map(|t| t.periods_held).sum();

    PerformanceReport {
        total_trades,
        winning_trades,
        losing_trades,
        win_rate: ratio(winning_trades as f64, total_trades),
        profit_factor,
        average_profit: ratio(total_profit_pct, total_trades),
        total_profit_pct,
        total_profit_amount: trades.iter().map(|t| t.profit_amount).sum(),
        average_periods_held: ratio(periods as f64, total_trades),
        hourly: hourly_breakdown(trades),
        by_exit_reason: exit_reason_breakdown(trades),
    }
}

/// Exactly 24 buckets, hour 0 first
pub fn hourly_breakdown(trades: &[Trade]) -> Vec<HourlyBucket> {
    let mut counts = [(0usize, 0usize, 0.0f64); 24];
    for t in trades {
        let slot = &mut counts[t.entry_date.hour() as usize];
        slot.0 += 1;
        slot.1 += usize::from(t.is_win());
        slot.2 += t.profit_pct;
    }

    counts
        .iter()
        .zip(0u32..)
        .map(|(&(n, wins, profit), hour)| HourlyBucket {
            hour,
            trades: n,
            total_profit: profit,
            win_rate: ratio(wins as f64, n),
            average_profit: ratio(profit, n),
        })
        .collect()
}

/// One bucket per exit reason that occurred
pub fn exit_reason_breakdown(trades: &[Trade]) -> Vec<ExitBucket> {
    let mut map: BTreeMap<ExitReason, (usize, usize, f64)> = BTreeMap::new();
    for t in trades {
        let entry = map.entry(t.exit_reason).or_default();
        entry.0 += 1;
        entry.1 += usize::from(t.is_win());
        entry.2 += t.profit_pct;
    }

    map.into_iter()
        .map(|(reason, (n, wins, profit))| ExitBucket {
            reason,
            trades: n,
            total_profit: profit,
            win_rate: ratio(wins as f64, n),
        })
        .collect()
}

/// Largest peak-to-trough decline of the curve, in dollars and as a fraction
/// of the peak
pub fn max_drawdown(curve: &[EquityPoint]) -> (f64, f64) {
    let Some(first) = curve.first() else {
        return (0.0, 0.0);
    };

    let mut peak = first.value;
    let mut max_dd = 0.0f64;
    let mut max_dd_pct = 0.0f64;
    for point in curve {
        peak = peak.max(point.value);
        let dd = peak - point.value;
        max_dd = max_dd.max(dd);
        if peak > 0.0 {
            max_dd_pct = max_dd_pct.max(dd / peak);
        }
    }
    (max_dd, max_dd_pct)
}
