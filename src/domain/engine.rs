//! The decision engine: one bar in, one [`Action`] out.
//!
//! Wires the indicator engine, signal evaluator, position sizer, lifecycle
//! manager and order intent builder together behind two entry points,
//! [`Engine::on_bar`] and [`Engine::on_order_update`]. The engine performs
//! no I/O of its own; capital comes from the injected [`AccountPort`].

use chrono::NaiveDateTime;
use tracing::debug;

use crate::domain::config::EngineConfig;
use crate::domain::error::TrendpilotError;
use crate::domain::indicator::{
    IndicatorEngine, IndicatorSet, apply_warmup, compute_raw_indicators,
};
use crate::domain::lifecycle::{Decision, LifecycleManager, LifecycleState};
use crate::domain::ohlcv::Bar;
use crate::domain::order_intent::{Action, OrderIdSequence, OrderUpdate, build_instructions};
use crate::domain::position::{Position, TradeRecord};
use crate::domain::signal::{EntryPattern, PriorBar, evaluate_entry};
use crate::domain::sizing::position_size;
use crate::ports::account_port::AccountPort;

pub struct Engine {
    symbol: String,
    config: EngineConfig,
    indicators: IndicatorEngine,
    lifecycle: LifecycleManager,
    ids: OrderIdSequence,
    last_timestamp: Option<NaiveDateTime>,
    last_close: Option<f64>,
    reported: usize,
}

impl Engine {
    pub fn new(symbol: &str, config: EngineConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            indicators: IndicatorEngine::new(config.indicators.clone()),
            lifecycle: LifecycleManager::new(symbol, config.exit),
            config,
            ids: OrderIdSequence::new(),
            last_timestamp: None,
            last_close: None,
            reported: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn position(&self) -> Option<&Position> {
        self.lifecycle.position()
    }

    pub fn indicators(&self) -> &IndicatorSet {
        self.indicators.current()
    }

    pub fn has_in_flight(&self) -> bool {
        self.lifecycle.has_in_flight()
    }

    /// Every trade closed so far.
    pub fn trades(&self) -> &[TradeRecord] {
        self.lifecycle.trades()
    }

    /// Trades closed since the previous call.
    pub fn take_new_trades(&mut self) -> Vec<TradeRecord> {
        let trades = self.lifecycle.trades();
        let fresh = trades[self.reported..].to_vec();
        self.reported = trades.len();
        fresh
    }

    /// Evaluate one bar.
    ///
    /// Bars must arrive with strictly increasing timestamps; a repeated or
    /// older bar is rejected without touching any state. The account is only
    /// queried when an entry signal needs sizing.
    pub fn on_bar(
        &mut self,
        bar: &Bar,
        account: &dyn AccountPort,
    ) -> Result<Action, TrendpilotError> {
        if let Some(previous) = self.last_timestamp.filter(|prev| bar.timestamp <= *prev) {
            return Err(TrendpilotError::OutOfOrderBar {
                previous,
                received: bar.timestamp,
            });
        }

        let prior_indicators = *self.indicators.raw();
        let prior_close = self.last_close;
        let current = self.indicators.push(bar);
        self.last_timestamp = Some(bar.timestamp);
        self.last_close = Some(bar.close);

        if self.lifecycle.has_in_flight() {
            debug!(
                symbol = %self.symbol,
                timestamp = %bar.timestamp,
                in_flight = ?self.lifecycle.in_flight_ids(),
                "orders outstanding, skipping evaluation"
            );
            return Ok(Action::none());
        }

        let decision = match self.lifecycle.state() {
            LifecycleState::Flat => {
                let prior = prior_close.map(|close| PriorBar {
                    close,
                    indicators: &prior_indicators,
                });
                match evaluate_entry(&self.config.profile, bar, &current, prior) {
                    Some(signal) => {
                        let capital = account.available_capital()?;
                        let quantity =
                            position_size(capital, self.config.risk_fraction, signal.price);
                        debug!(
                            symbol = %self.symbol,
                            pattern = %signal.pattern,
                            capital,
                            quantity,
                            "entry signal"
                        );
                        self.lifecycle
                            .enter(&signal, current.atr, quantity, bar.timestamp)
                    }
                    None => Decision::Hold,
                }
            }
            _ => self.lifecycle.evaluate(bar, &current),
        };

        Ok(self.dispatch(decision))
    }

    /// Feed a status update from the order router.
    pub fn on_order_update(&mut self, update: &OrderUpdate) -> Action {
        let decision = self.lifecycle.on_order_update(update);
        self.dispatch(decision)
    }

    fn dispatch(&mut self, decision: Decision) -> Action {
        let instructions = build_instructions(&decision, &mut self.ids);
        self.lifecycle.attach(&instructions);
        Action { instructions }
    }
}

/// One bar on which the configured entry rule fired.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalHit {
    pub timestamp: NaiveDateTime,
    pub close: f64,
    pub volume_ratio: Option<f64>,
    pub short_ma: Option<f64>,
    pub mid_ma: Option<f64>,
    pub pattern: EntryPattern,
}

/// Every bar in `bars` where the entry rule fires, ignoring position state.
pub fn scan(bars: &[Bar], config: &EngineConfig) -> Vec<SignalHit> {
    let raw = compute_raw_indicators(bars, &config.indicators);
    let sets = apply_warmup(&raw, &config.indicators);
    bars.iter()
        .zip(&sets)
        .enumerate()
        .filter_map(|(i, (bar, set))| {
            let prior = i.checked_sub(1).map(|p| PriorBar {
                close: bars[p].close,
                indicators: &raw[p],
            });
            let signal = evaluate_entry(&config.profile, bar, set, prior)?;
            Some(SignalHit {
                timestamp: bar.timestamp,
                close: bar.close,
                volume_ratio: set.volume_ratio,
                short_ma: set.short_ma,
                mid_ma: set.mid_ma,
                pattern: signal.pattern,
            })
        })
        .collect()
}
