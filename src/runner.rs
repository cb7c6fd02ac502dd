//! Drivers that feed bars to the [`Engine`] and route what it decides.
//!
//! Both drivers process exactly one bar to completion before the next. A
//! failure on one bar is logged and recorded as a [`BarFailure`]; the loop
//! always moves on. Retrying is left to whoever owns the transport.

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

use crate::adapters::sim_broker::SimBroker;
use crate::domain::backtest::{BacktestConfig, BacktestResult, BarFailure, EquityPoint};
use crate::domain::config::EngineConfig;
use crate::domain::engine::Engine;
use crate::domain::error::TrendpilotError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::Bar;
use crate::domain::order_intent::{Action, Instruction, OrderStatus, OrderUpdate};
use crate::ports::account_port::AccountPort;
use crate::ports::order_port::OrderRouter;
use crate::ports::trade_log_port::TradeLogSink;

/// Replay `bars` through the engine against a [`SimBroker`].
pub fn run_backtest(
    bars: &[Bar],
    engine_config: &EngineConfig,
    backtest: &BacktestConfig,
    sink: &mut dyn TradeLogSink,
) -> BacktestResult {
    let mut engine = Engine::new(&backtest.symbol, engine_config.clone());
    let mut broker = SimBroker::new(
        &backtest.symbol,
        backtest.initial_capital,
        backtest.commission_pct,
    );
    let mut equity_curve = Vec::with_capacity(bars.len());
    let mut failures = Vec::new();

    info!(
        symbol = %backtest.symbol,
        strategy = %engine_config.name,
        profile = engine_config.profile.name(),
        exit = engine_config.exit.name(),
        bars = bars.len(),
        "starting backtest"
    );

    for bar in bars {
        broker.on_bar(bar);
        let mut errors = pump_updates(&mut engine, &mut broker);

        match engine.on_bar(bar, &broker) {
            Ok(action) => errors.extend(route_action(&mut engine, &mut broker, action)),
            Err(e) => errors.push(e),
        }
        errors.extend(record_trades(&mut engine, sink));

        record_failures(&mut failures, bar.timestamp, errors);
        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: broker.equity(),
        });
    }

    let trades = engine.trades().to_vec();
    let metrics = Metrics::compute(
        &trades,
        &equity_curve,
        backtest.initial_capital,
        broker.commission_paid(),
    );
    info!(
        symbol = %backtest.symbol,
        trades = trades.len(),
        net_pnl = metrics.net_pnl,
        commission = metrics.commission,
        final_equity = metrics.final_equity,
        cash = broker.cash(),
        open_units = broker.held(),
        working_orders = broker.working_orders().len(),
        failures = failures.len(),
        "backtest finished"
    );

    BacktestResult {
        trades,
        equity_curve,
        metrics,
        failures,
    }
}

/// Push-mode driver: one bar at a time from a live or replayed source.
///
/// Status updates the router produced since the previous bar are applied
/// before the new bar is evaluated. A source error counts as a failed bar.
pub fn run_live<I>(
    source: I,
    engine: &mut Engine,
    router: &mut dyn OrderRouter,
    account: &dyn AccountPort,
    sink: &mut dyn TradeLogSink,
) -> Vec<BarFailure>
where
    I: IntoIterator<Item = Result<Bar, TrendpilotError>>,
{
    let mut failures = Vec::new();
    let mut last_seen: Option<NaiveDateTime> = None;

    for item in source {
        let bar = match item {
            Ok(bar) => bar,
            Err(e) => {
                let timestamp = match &e {
                    TrendpilotError::Transport { timestamp, .. } => *timestamp,
                    _ => last_seen.unwrap_or_default(),
                };
                record_failures(&mut failures, timestamp, vec![e]);
                continue;
            }
        };

        let mut errors = pump_updates(engine, router);
        match engine.on_bar(&bar, account) {
            Ok(action) => errors.extend(route_action(engine, router, action)),
            Err(e) => errors.push(e),
        }
        errors.extend(record_trades(engine, sink));
        record_failures(&mut failures, bar.timestamp, errors);
        last_seen = Some(bar.timestamp);
    }

    failures
}

/// Apply every pending router update, routing whatever the engine decides
/// in response, until the router has nothing more to report.
pub fn pump_updates(engine: &mut Engine, router: &mut dyn OrderRouter) -> Vec<TrendpilotError> {
    route_action(engine, router, Action::none())
}

/// Route `action`, then keep feeding router updates back to the engine
/// until both queues are empty. A failed instruction is reported to the
/// engine as a rejection so nothing waits on it forever.
pub fn route_action(
    engine: &mut Engine,
    router: &mut dyn OrderRouter,
    action: Action,
) -> Vec<TrendpilotError> {
    if !action.is_empty() {
        debug!(
            symbol = %engine.symbol(),
            submits = action.submissions().count(),
            cancels = action.cancellations().count(),
            "routing action"
        );
    }
    let mut errors = Vec::new();
    let mut queue: VecDeque<Instruction> = action.instructions.into();

    loop {
        while let Some(instruction) = queue.pop_front() {
            if let Err(e) = router.route(&instruction) {
                let id = match &instruction {
                    Instruction::Submit(intent) => intent.id,
                    Instruction::Cancel(id) => *id,
                };
                warn!(symbol = %engine.symbol(), %id, error = %e, "routing failed");
                let rejected = OrderUpdate {
                    id,
                    status: OrderStatus::Rejected {
                        reason: e.to_string(),
                    },
                };
                queue.extend(engine.on_order_update(&rejected).instructions);
                errors.push(e);
            }
        }

        let updates = router.poll_updates();
        if updates.is_empty() {
            break;
        }
        for update in &updates {
            queue.extend(engine.on_order_update(update).instructions);
        }
    }

    errors
}

fn record_trades(engine: &mut Engine, sink: &mut dyn TradeLogSink) -> Vec<TrendpilotError> {
    engine
        .take_new_trades()
        .iter()
        .filter_map(|trade| sink.record(trade).err())
        .collect()
}

fn record_failures(failures: &mut Vec<BarFailure>, timestamp: NaiveDateTime, errors: Vec<TrendpilotError>) {
    for error in errors {
        warn!(%timestamp, %error, recoverable = error.is_recoverable(), "bar failed");
        failures.push(BarFailure { timestamp, error });
    }
}
