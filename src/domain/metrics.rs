//! Performance summary over closed trades and the equity curve.

use super::backtest::EquityPoint;
use super::position::TradeRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    /// Sum of closed trade pnl before costs.
    pub gross_pnl: f64,
    /// Commission paid over the run, open positions included.
    pub commission: f64,
    pub net_pnl: f64,
    pub total_return: f64,
    pub final_equity: f64,
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_holding_hours: f64,
    /// Largest peak-to-trough decline, as a fraction of the peak.
    pub max_drawdown: f64,
    /// Mean over standard deviation of per-bar returns, not annualised.
    pub sharpe_ratio: f64,
}

impl Metrics {
    pub fn compute(
        trades: &[TradeRecord],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        commission: f64,
    ) -> Self {
        let final_equity = equity_curve.last().map_or(initial_capital, |p| p.equity);
        let total_return = ratio(final_equity - initial_capital, initial_capital);

        let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
        let losses: Vec<f64> = trades
            .iter()
            .map(|t| t.pnl)
            .filter(|p| *p < 0.0)
            .map(f64::abs)
            .collect();
        let gross_win: f64 = wins.iter().sum();
        let gross_loss: f64 = losses.iter().sum();

        let profit_factor = match (gross_win > 0.0, gross_loss > 0.0) {
            (_, true) => gross_win / gross_loss,
            (true, false) => f64::INFINITY,
            (false, false) => 0.0,
        };

        let held_hours: f64 = trades
            .iter()
            .map(|t| (t.exit_time - t.entry_time).num_minutes() as f64 / 60.0)
            .sum();
        let total_trades = trades.len();
        let gross_pnl: f64 = trades.iter().map(|t| t.pnl).sum();

        Metrics {
            gross_pnl,
            commission,
            net_pnl: gross_pnl - commission,
            total_return,
            final_equity,
            total_trades,
            trades_won: wins.len(),
            trades_lost: losses.len(),
            trades_breakeven: total_trades - wins.len() - losses.len(),
            win_rate: ratio(wins.len() as f64, total_trades as f64),
            profit_factor,
            avg_win: ratio(gross_win, wins.len() as f64),
            avg_loss: ratio(gross_loss, losses.len() as f64),
            largest_win: wins.iter().copied().fold(0.0, f64::max),
            largest_loss: losses.iter().copied().fold(0.0, f64::max),
            avg_holding_hours: ratio(held_hours, total_trades as f64),
            max_drawdown: compute_drawdown(equity_curve),
            sharpe_ratio: compute_sharpe(equity_curve),
        }
    }

    /// `(metric, value)` rows for the summary report.
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("gross_pnl", format!("{:.2}", self.gross_pnl)),
            ("commission", format!("{:.2}", self.commission)),
            ("net_pnl", format!("{:.2}", self.net_pnl)),
            ("total_return_pct", format!("{:.2}", self.total_return * 100.0)),
            ("final_equity", format!("{:.2}", self.final_equity)),
            ("total_trades", self.total_trades.to_string()),
            ("trades_won", self.trades_won.to_string()),
            ("trades_lost", self.trades_lost.to_string()),
            ("trades_breakeven", self.trades_breakeven.to_string()),
            ("win_rate_pct", format!("{:.2}", self.win_rate * 100.0)),
            ("profit_factor", format!("{:.4}", self.profit_factor)),
            ("avg_win", format!("{:.2}", self.avg_win)),
            ("avg_loss", format!("{:.2}", self.avg_loss)),
            ("largest_win", format!("{:.2}", self.largest_win)),
            ("largest_loss", format!("{:.2}", self.largest_loss)),
            ("avg_holding_hours", format!("{:.2}", self.avg_holding_hours)),
            ("max_drawdown_pct", format!("{:.2}", self.max_drawdown * 100.0)),
            ("sharpe_ratio", format!("{:.4}", self.sharpe_ratio)),
        ]
    }
}

/// `num / den`, or zero when there is nothing to divide by.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    equity_curve.iter().fold(0.0_f64, |worst, point| {
        peak = peak.max(point.equity);
        worst.max(ratio(peak - point.equity, peak))
    })
}

fn compute_sharpe(equity_curve: &[EquityPoint]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| ratio(w[1].equity - w[0].equity, w[0].equity))
        .collect();
    if returns.is_empty() {
        return 0.0;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    ratio(mean, variance.sqrt())
}
