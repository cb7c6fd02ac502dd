//! End-to-end tests over the public engine surface.
//!
//! Tests cover:
//! - Backtest round trips through the simulated broker (percent band, staged)
//! - Scanning a CSV file for entry signals
//! - Push-mode driving with source and routing failures

mod common;

use approx::assert_relative_eq;
use common::*;
use trendpilot::adapters::csv_adapter::CsvAdapter;
use trendpilot::domain::backtest::BacktestConfig;
use trendpilot::domain::engine::{Engine, scan};
use trendpilot::domain::lifecycle::LifecycleState;
use trendpilot::domain::order_intent::{OrderKind, OrderRole, Side};
use trendpilot::domain::position::TradeRecord;
use trendpilot::domain::signal::EntryPattern;
use trendpilot::ports::data_port::BarSource;
use trendpilot::runner::{run_backtest, run_live};

fn backtest_config() -> BacktestConfig {
    BacktestConfig {
        symbol: SYMBOL.into(),
        data_file: None,
        initial_capital: 10_000.0,
        commission_pct: 0.0,
        trade_log: None,
        summary_report: None,
    }
}

mod backtest_round_trip {
    use super::*;

    #[test]
    fn percent_band_exit_closes_whole_position() {
        let mut log: Vec<TradeRecord> = Vec::new();
        let result = run_backtest(
            &band_round_trip_bars(),
            &band_config(),
            &backtest_config(),
            &mut log,
        );

        assert!(result.failures.is_empty());
        assert_eq!(result.trades.len(), 1);
        assert_eq!(log, result.trades);

        let trade = &result.trades[0];
        assert_eq!(trade.size, 454);
        assert_relative_eq!(trade.entry_price, 11.0);
        assert_relative_eq!(trade.exit_price, 11.8, epsilon = 1e-9);
        assert_relative_eq!(trade.pnl, 0.8 * 454.0, epsilon = 1e-9);
        assert_eq!(trade.exit_reason, "market_exit");
        assert_eq!(trade.entry_time, ts(7));
        assert_eq!(trade.exit_time, ts(9));
        assert_relative_eq!(result.final_equity(), 10_000.0 + trade.pnl, epsilon = 1e-6);
    }

    #[test]
    fn staged_exit_takes_half_then_trails() {
        let mut log: Vec<TradeRecord> = Vec::new();
        let bars = staged_round_trip_bars();
        let result = run_backtest(&bars, &staged_config(), &backtest_config(), &mut log);

        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.size, 454);
        assert_eq!(trade.exit_reason, "trailing_stop");
        // 227 at 13.25, 227 at 10.55
        assert_relative_eq!(trade.exit_price, 11.9, epsilon = 1e-9);
        assert_relative_eq!(
            trade.pnl,
            (trade.exit_price - trade.entry_price) * trade.size as f64,
            epsilon = 1e-9
        );
        assert_relative_eq!(trade.pnl, 408.6, epsilon = 1e-6);
        assert!(trade.is_win());

        assert_eq!(result.equity_curve.len(), bars.len());
        assert_relative_eq!(result.final_equity(), 10_408.6, epsilon = 1e-6);
        assert_eq!(result.metrics.total_trades, 1);
        assert_eq!(result.metrics.trades_won, 1);
    }

    #[test]
    fn net_pnl_deducts_broker_commission() {
        let mut log: Vec<TradeRecord> = Vec::new();
        let backtest = BacktestConfig {
            commission_pct: 0.0005,
            ..backtest_config()
        };
        let result = run_backtest(&staged_round_trip_bars(), &staged_config(), &backtest, &mut log);

        assert_eq!(result.trades.len(), 1);
        let m = &result.metrics;
        assert_relative_eq!(m.gross_pnl, result.trades[0].pnl, epsilon = 1e-9);
        assert!(m.commission > 0.0);
        assert_relative_eq!(m.net_pnl, m.gross_pnl - m.commission, epsilon = 1e-9);
        // flat at the end, so net pnl is exactly the equity change
        assert_relative_eq!(m.net_pnl, result.final_equity() - 10_000.0, epsilon = 1e-6);
    }

    #[test]
    fn no_signal_means_no_trades() {
        let mut log: Vec<TradeRecord> = Vec::new();
        let bars = spike_bars();
        let result = run_backtest(&bars[..5], &band_config(), &backtest_config(), &mut log);
        assert!(result.trades.is_empty());
        assert!(log.is_empty());
        assert_relative_eq!(result.final_equity(), 10_000.0);
        assert_relative_eq!(result.metrics.max_drawdown, 0.0);
    }

    #[test]
    fn open_position_at_end_is_not_a_trade() {
        let mut log: Vec<TradeRecord> = Vec::new();
        let bars = staged_round_trip_bars();
        let result = run_backtest(&bars[..9], &staged_config(), &backtest_config(), &mut log);
        assert!(result.trades.is_empty());
        // half the position is still marked to market
        assert!(result.final_equity() > 10_000.0);
    }
}

mod signal_scan {
    use super::*;

    #[test]
    fn csv_spike_yields_exactly_one_signal() {
        let dir = tempfile::tempdir().unwrap();
        write_bars(dir.path(), &spike_bars());

        let bars = CsvAdapter::new(dir.path()).fetch_bars(SYMBOL).unwrap();
        assert_eq!(bars, spike_bars());

        let hits = scan(&bars, &band_config());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].timestamp, ts(6));
        assert_eq!(hits[0].pattern, EntryPattern::VolumeSpikeCrossover);
        assert_relative_eq!(hits[0].volume_ratio.unwrap(), 400.0 / 175.0, epsilon = 1e-9);
    }

    #[test]
    fn history_shorter_than_warmup_never_signals() {
        let bars = spike_bars();
        for n in 0..4 {
            assert!(scan(&bars[..n], &band_config()).is_empty());
        }
    }
}

mod live_driver {
    use super::*;

    #[test]
    fn acknowledged_entry_stays_in_flight() {
        let mut engine = Engine::new(SYMBOL, staged_config());
        let mut router = RecordingRouter::default();
        let mut log: Vec<TradeRecord> = Vec::new();

        let failures = run_live(
            spike_bars().into_iter().map(Ok),
            &mut engine,
            &mut router,
            &FixedAccount(10_000.0),
            &mut log,
        );

        assert!(failures.is_empty());
        assert_eq!(router.submitted.len(), 3);
        let entry = &router.submitted[0];
        assert_eq!(entry.role, OrderRole::Entry);
        assert_eq!(entry.side, Side::Buy);
        assert_eq!(entry.quantity, 454);
        let stop = router
            .submitted
            .iter()
            .find(|i| i.role == OrderRole::InitialStop)
            .unwrap();
        assert_eq!(stop.kind, OrderKind::Stop { price: 9.5 });
        let tp = router
            .submitted
            .iter()
            .find(|i| i.role == OrderRole::TakeProfit)
            .unwrap();
        assert_eq!(tp.quantity, 227);
        assert_eq!(tp.kind, OrderKind::Limit { price: 13.25 });

        // the market entry has only been acknowledged
        assert_eq!(engine.state(), LifecycleState::Entered);
        assert!(engine.has_in_flight());
    }

    #[test]
    fn failures_are_recorded_and_the_stream_continues() {
        let mut engine = Engine::new(SYMBOL, band_config());
        let mut router = RecordingRouter::failing(1);
        let mut log: Vec<TradeRecord> = Vec::new();

        let bars = spike_bars();
        let mut source: Vec<Result<Bar, TrendpilotError>> = bars.iter().cloned().map(Ok).collect();
        source.insert(
            3,
            Err(TrendpilotError::Transport {
                symbol: SYMBOL.into(),
                timestamp: ts(3),
                reason: "feed timeout".into(),
            }),
        );
        // replayed bar after the spike
        source.push(Ok(bars[6].clone()));

        let failures = run_live(
            source,
            &mut engine,
            &mut router,
            &FixedAccount(10_000.0),
            &mut log,
        );

        assert_eq!(failures.len(), 3, "{failures:?}");
        assert!(matches!(failures[0].error, TrendpilotError::Transport { .. }));
        assert_eq!(failures[0].timestamp, ts(3));
        // the entry submission failed and was treated as rejected
        assert!(matches!(failures[1].error, TrendpilotError::Transport { .. }));
        assert_eq!(failures[1].timestamp, ts(6));
        assert!(matches!(failures[2].error, TrendpilotError::OutOfOrderBar { .. }));
        assert!(failures.iter().all(|f| f.error.is_recoverable()));

        assert!(router.submitted.is_empty());
        assert_eq!(engine.state(), LifecycleState::Flat);
        assert!(!engine.has_in_flight());
        assert!(log.is_empty());
    }
}
