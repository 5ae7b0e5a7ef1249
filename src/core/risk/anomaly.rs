//! Anomaly guard: anti-manipulation and abnormal-market defense.
//!
//! Watches per-token price and depth histories for hostile patterns: a
//! price pulse (one large step against recent history) or depth
//! depletion (liquidity vanishing from the ask side). Responses are
//! graduated: DEGRADE shrinks position sizing, HALT trips the circuit
//! breaker and blocks the token until conditions normalize.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::core::domain::{OrderBook, TokenId};
use crate::core::execution::CircuitBreaker;
use crate::core::telemetry::{now_ms, EventLog, EventType};

/// Kinds of detected anomalies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Sudden large price movement.
    PricePulse,
    /// Sudden loss of resting liquidity.
    DepthDepletion,
}

/// Graduated response to an anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseAction {
    /// Normal trading.
    #[default]
    None,
    /// Reduce position sizes.
    Degrade,
    /// Stop trading the token; trips the circuit breaker.
    Halt,
}

/// A detected anomaly.
#[derive(Debug, Clone)]
pub struct AnomalyEvent {
    pub kind: AnomalyKind,
    pub token_id: TokenId,
    /// Severity in `[0, 1]`.
    pub severity: f64,
    pub at_ms: i64,
    pub action: ResponseAction,
}

/// Guard tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyGuardConfig {
    /// Fractional best-ask move that registers as a pulse.
    #[serde(default = "default_price_pulse_threshold")]
    pub price_pulse_threshold: Decimal,
    /// Fractional ask-depth drop that registers as depletion.
    #[serde(default = "default_depth_depletion_threshold")]
    pub depth_depletion_threshold: Decimal,
    /// Size multiplier applied while degraded.
    #[serde(default = "default_degrade_size_factor")]
    pub degrade_size_factor: Decimal,
    /// Samples of price history kept per token.
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_price_pulse_threshold() -> Decimal {
    Decimal::new(10, 2) // 10%
}

fn default_depth_depletion_threshold() -> Decimal {
    Decimal::new(50, 2) // 50%
}

fn default_degrade_size_factor() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_history_size() -> usize {
    100
}

impl Default for AnomalyGuardConfig {
    fn default() -> Self {
        Self {
            price_pulse_threshold: default_price_pulse_threshold(),
            depth_depletion_threshold: default_depth_depletion_threshold(),
            degrade_size_factor: default_degrade_size_factor(),
            history_size: default_history_size(),
        }
    }
}

#[derive(Default)]
struct TokenHistory {
    prices: VecDeque<Decimal>,
    depths: VecDeque<Decimal>,
    action: ResponseAction,
}

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AnomalyCounters {
    pub total: u64,
    pub price_pulses: u64,
    pub depth_depletions: u64,
    pub degrades: u64,
    pub halts: u64,
}

/// Detects and responds to abnormal market conditions.
pub struct AnomalyGuard {
    config: AnomalyGuardConfig,
    histories: Mutex<HashMap<TokenId, TokenHistory>>,
    counters: Mutex<AnomalyCounters>,
    breaker: Option<Arc<CircuitBreaker>>,
    event_log: Option<Arc<EventLog>>,
}

impl AnomalyGuard {
    /// Create a guard with the given config.
    #[must_use]
    pub fn new(config: AnomalyGuardConfig) -> Self {
        Self {
            config,
            histories: Mutex::new(HashMap::new()),
            counters: Mutex::new(AnomalyCounters::default()),
            breaker: None,
            event_log: None,
        }
    }

    /// Trip this breaker when a HALT response fires.
    #[must_use]
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    /// Attach a telemetry sink; anomalies are emitted to it.
    #[must_use]
    pub fn with_event_log(mut self, event_log: Arc<EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Observe a fresh book snapshot and return the response action for
    /// its token.
    pub fn observe(&self, book: &OrderBook) -> ResponseAction {
        let Some(best_ask) = book.best_ask() else {
            return self.action_for(book.token_id());
        };
        let price = best_ask.price();
        let depth = book.ask_depth();

        let mut detected: Option<(AnomalyKind, f64)> = None;

        let mut histories = self.histories.lock();
        let history = histories.entry(book.token_id().clone()).or_default();

        if let Some(&prev_price) = history.prices.back() {
            if prev_price > Decimal::ZERO {
                let move_frac = ((price - prev_price) / prev_price).abs();
                if move_frac >= self.config.price_pulse_threshold {
                    let severity = Self::severity(move_frac, self.config.price_pulse_threshold);
                    detected = Some((AnomalyKind::PricePulse, severity));
                }
            }
        }

        if detected.is_none() {
            if let Some(&prev_depth) = history.depths.back() {
                if prev_depth > Decimal::ZERO {
                    let drop_frac = ((prev_depth - depth) / prev_depth).max(Decimal::ZERO);
                    if drop_frac >= self.config.depth_depletion_threshold {
                        let severity =
                            Self::severity(drop_frac, self.config.depth_depletion_threshold);
                        detected = Some((AnomalyKind::DepthDepletion, severity));
                    }
                }
            }
        }

        history.prices.push_back(price);
        history.depths.push_back(depth);
        while history.prices.len() > self.config.history_size {
            history.prices.pop_front();
        }
        while history.depths.len() > self.config.history_size {
            history.depths.pop_front();
        }

        let action = match detected {
            Some((_, severity)) if severity >= 1.0 => ResponseAction::Halt,
            Some(_) => ResponseAction::Degrade,
            None => ResponseAction::None,
        };
        history.action = action;
        drop(histories);

        if let Some((kind, severity)) = detected {
            self.react(AnomalyEvent {
                kind,
                token_id: book.token_id().clone(),
                severity,
                at_ms: now_ms(),
                action,
            });
        }

        action
    }

    /// Current response action for a token.
    #[must_use]
    pub fn action_for(&self, token_id: &TokenId) -> ResponseAction {
        self.histories
            .lock()
            .get(token_id)
            .map(|h| h.action)
            .unwrap_or_default()
    }

    /// Position size multiplier for a response action.
    #[must_use]
    pub fn size_factor(&self, action: ResponseAction) -> Decimal {
        match action {
            ResponseAction::None => Decimal::ONE,
            ResponseAction::Degrade => self.config.degrade_size_factor,
            ResponseAction::Halt => Decimal::ZERO,
        }
    }

    /// (total, price pulses, depth depletions, degrades, halts).
    #[must_use]
    pub fn counters(&self) -> (u64, u64, u64, u64, u64) {
        let c = self.counters.lock();
        (c.total, c.price_pulses, c.depth_depletions, c.degrades, c.halts)
    }

    /// Severity relative to threshold: reaches 1.0 at twice the
    /// threshold, where the response escalates to HALT.
    fn severity(observed: Decimal, threshold: Decimal) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        let ratio = (observed / (threshold * Decimal::TWO))
            .to_f64()
            .unwrap_or(1.0);
        ratio.clamp(0.0, 1.0)
    }

    fn react(&self, event: AnomalyEvent) {
        warn!(
            kind = ?event.kind,
            token_id = %event.token_id,
            severity = event.severity,
            action = ?event.action,
            "Market anomaly detected"
        );

        {
            let mut c = self.counters.lock();
            c.total += 1;
            match event.kind {
                AnomalyKind::PricePulse => c.price_pulses += 1,
                AnomalyKind::DepthDepletion => c.depth_depletions += 1,
            }
            match event.action {
                ResponseAction::Degrade => c.degrades += 1,
                ResponseAction::Halt => c.halts += 1,
                ResponseAction::None => {}
            }
        }

        if event.action == ResponseAction::Halt {
            if let Some(breaker) = &self.breaker {
                breaker.trip("anomaly guard halt");
            }
        }

        if let Some(log) = &self.event_log {
            log.emit(
                EventType::AnomalyDetected,
                serde_json::json!({
                    "kind": event.kind,
                    "token_id": event.token_id.as_str(),
                    "severity": event.severity,
                    "action": format!("{:?}", event.action).to_lowercase(),
                }),
                None,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::PriceLevel;
    use rust_decimal_macros::dec;

    fn book(token: &str, ask_price: Decimal, ask_size: Decimal) -> OrderBook {
        OrderBook::with_levels(
            TokenId::from(token),
            vec![],
            vec![PriceLevel::new(ask_price, ask_size)],
        )
    }

    fn guard() -> AnomalyGuard {
        AnomalyGuard::new(AnomalyGuardConfig::default())
    }

    #[test]
    fn steady_prices_stay_normal() {
        let guard = guard();
        assert_eq!(guard.observe(&book("t", dec!(0.50), dec!(100))), ResponseAction::None);
        assert_eq!(guard.observe(&book("t", dec!(0.51), dec!(100))), ResponseAction::None);
        assert_eq!(guard.counters().0, 0);
    }

    #[test]
    fn moderate_pulse_degrades() {
        let guard = guard();
        guard.observe(&book("t", dec!(0.50), dec!(100)));
        // 12% move: above the 10% threshold, below the 20% halt line.
        let action = guard.observe(&book("t", dec!(0.56), dec!(100)));
        assert_eq!(action, ResponseAction::Degrade);
        assert_eq!(guard.action_for(&TokenId::from("t")), ResponseAction::Degrade);
        assert_eq!(guard.size_factor(action), dec!(0.5));
    }

    #[test]
    fn violent_pulse_halts_and_trips_breaker() {
        let breaker = Arc::new(CircuitBreaker::new(
            "execution",
            crate::core::execution::CircuitBreakerConfig {
                open_timeout_seconds: 3600,
                ..Default::default()
            },
        ));
        let guard = guard().with_breaker(breaker.clone());

        guard.observe(&book("t", dec!(0.50), dec!(100)));
        // 30% move: at least twice the threshold, severity 1.0.
        let action = guard.observe(&book("t", dec!(0.65), dec!(100)));

        assert_eq!(action, ResponseAction::Halt);
        assert_eq!(guard.size_factor(action), dec!(0));
        assert_eq!(
            breaker.state(),
            crate::core::execution::CircuitState::Open
        );
        assert_eq!(guard.counters().4, 1);
    }

    #[test]
    fn depth_depletion_is_detected() {
        let guard = guard();
        guard.observe(&book("t", dec!(0.50), dec!(100)));
        // Depth collapses from 50 to 10 notional: an 80% drop.
        let action = guard.observe(&book("t", dec!(0.50), dec!(20)));
        assert_eq!(action, ResponseAction::Degrade);
        assert_eq!(guard.counters().2, 1);
    }

    #[test]
    fn recovery_resets_to_normal() {
        let guard = guard();
        guard.observe(&book("t", dec!(0.50), dec!(100)));
        guard.observe(&book("t", dec!(0.56), dec!(100)));
        assert_eq!(guard.action_for(&TokenId::from("t")), ResponseAction::Degrade);

        // Next quiet observation clears the degraded state.
        guard.observe(&book("t", dec!(0.56), dec!(100)));
        assert_eq!(guard.action_for(&TokenId::from("t")), ResponseAction::None);
    }

    #[test]
    fn unknown_token_is_normal() {
        let guard = guard();
        assert_eq!(
            guard.action_for(&TokenId::from("never-seen")),
            ResponseAction::None
        );
    }

    #[test]
    fn history_is_bounded() {
        let guard = AnomalyGuard::new(AnomalyGuardConfig {
            history_size: 5,
            ..Default::default()
        });
        for i in 0..20u32 {
            let price = dec!(0.50) + Decimal::new(i.into(), 4);
            guard.observe(&book("t", price, dec!(100)));
        }
        let histories = guard.histories.lock();
        assert!(histories.get(&TokenId::from("t")).unwrap().prices.len() <= 5);
    }
}
