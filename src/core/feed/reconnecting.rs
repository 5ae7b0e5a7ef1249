//! Reconnecting wrapper for MarketDataStream.
//!
//! Adds automatic reconnection with exponential backoff, subscription
//! restoration, and heartbeat staleness tracking to any
//! [`MarketDataStream`] implementation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::stream::{MarketDataStream, MarketEvent};
use crate::core::domain::TokenId;
use crate::error::Result;

/// Reconnection and heartbeat tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectionConfig {
    /// Delay before the first reconnection attempt.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Consecutive failed attempts before the stream gives up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Seconds without any message before `heartbeat_ok` turns false.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

fn default_initial_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    10
}

fn default_heartbeat_timeout_secs() -> u64 {
    30
}

impl Default for ReconnectionConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_attempts: default_max_attempts(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Wrapper that adds reconnection logic to any MarketDataStream.
pub struct ReconnectingStream<S: MarketDataStream> {
    inner: S,
    config: ReconnectionConfig,
    /// Token IDs to restore after reconnection.
    subscribed_tokens: Vec<TokenId>,
    consecutive_failures: u32,
    current_delay_ms: u64,
    state: ConnectionState,
    last_event_at: Option<Instant>,
}

impl<S: MarketDataStream> ReconnectingStream<S> {
    /// Create a new reconnecting wrapper.
    pub fn new(inner: S, config: ReconnectionConfig) -> Self {
        let initial_delay = config.initial_delay_ms;
        Self {
            inner,
            config,
            subscribed_tokens: Vec::new(),
            consecutive_failures: 0,
            current_delay_ms: initial_delay,
            state: ConnectionState::Disconnected,
            last_event_at: None,
        }
    }

    /// Current connection state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// False when no message has arrived within the heartbeat timeout.
    ///
    /// A stale heartbeat does not disconnect the stream; it only flags
    /// staleness for observability.
    #[must_use]
    pub fn heartbeat_ok(&self) -> bool {
        match self.last_event_at {
            Some(at) => at.elapsed() < Duration::from_secs(self.config.heartbeat_timeout_secs),
            None => true,
        }
    }

    fn reset_backoff(&mut self) {
        self.consecutive_failures = 0;
        self.current_delay_ms = self.config.initial_delay_ms;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = Duration::from_millis(self.current_delay_ms);
        let next = (self.current_delay_ms as f64 * self.config.backoff_multiplier) as u64;
        self.current_delay_ms = next.min(self.config.max_delay_ms);
        delay
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        let delay = self.next_delay();
        info!(
            delay_ms = delay.as_millis(),
            attempt = self.consecutive_failures + 1,
            "Reconnecting after delay"
        );
        sleep(delay).await;

        match self.inner.connect().await {
            Ok(()) => {
                info!("Reconnected");
                self.state = ConnectionState::Connected;

                if !self.subscribed_tokens.is_empty() {
                    debug!(
                        tokens = self.subscribed_tokens.len(),
                        "Restoring subscriptions"
                    );
                    self.inner.subscribe(&self.subscribed_tokens).await?;
                }

                self.reset_backoff();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Reconnection failed");
                self.state = ConnectionState::Disconnected;
                self.consecutive_failures += 1;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl<S: MarketDataStream + Send> MarketDataStream for ReconnectingStream<S> {
    async fn connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        let result = self.inner.connect().await;
        match result {
            Ok(()) => {
                self.state = ConnectionState::Connected;
                self.reset_backoff();
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        // Remember tokens so a reconnect can restore them.
        for token in token_ids {
            if !self.subscribed_tokens.contains(token) {
                self.subscribed_tokens.push(token.clone());
            }
        }
        self.inner.subscribe(token_ids).await
    }

    async fn unsubscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        self.subscribed_tokens.retain(|t| !token_ids.contains(t));
        self.inner.unsubscribe(token_ids).await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        loop {
            if self.state != ConnectionState::Connected {
                if self.consecutive_failures >= self.config.max_attempts {
                    error!(
                        attempts = self.consecutive_failures,
                        "Reconnection attempts exhausted, giving up"
                    );
                    return None;
                }
                if self.reconnect().await.is_err() {
                    continue;
                }
            }

            match self.inner.next_event().await {
                Some(MarketEvent::Disconnected { reason }) => {
                    warn!(reason = %reason, "Connection lost, will reconnect");
                    self.state = ConnectionState::Disconnected;
                    self.consecutive_failures += 1;
                    continue;
                }
                Some(event) => {
                    self.last_event_at = Some(Instant::now());
                    if self.consecutive_failures > 0 {
                        debug!("Event received after reconnection, resetting backoff");
                        self.reset_backoff();
                    }
                    return Some(event);
                }
                None => {
                    warn!("Stream ended unexpectedly, will reconnect");
                    self.state = ConnectionState::Disconnected;
                    self.consecutive_failures += 1;
                    continue;
                }
            }
        }
    }

    fn exchange_name(&self) -> &'static str {
        self.inner.exchange_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::telemetry::now_ms;
    use std::collections::VecDeque;

    /// Scripted stream: pops pre-loaded connect results and events.
    struct ScriptedStream {
        connect_results: VecDeque<Result<()>>,
        events: VecDeque<Option<MarketEvent>>,
        connect_calls: u32,
        subscribe_calls: u32,
    }

    impl ScriptedStream {
        fn new(connect_results: Vec<Result<()>>, events: Vec<Option<MarketEvent>>) -> Self {
            Self {
                connect_results: connect_results.into(),
                events: events.into(),
                connect_calls: 0,
                subscribe_calls: 0,
            }
        }
    }

    #[async_trait]
    impl MarketDataStream for ScriptedStream {
        async fn connect(&mut self) -> Result<()> {
            self.connect_calls += 1;
            self.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn subscribe(&mut self, _token_ids: &[TokenId]) -> Result<()> {
            self.subscribe_calls += 1;
            Ok(())
        }

        async fn unsubscribe(&mut self, _token_ids: &[TokenId]) -> Result<()> {
            Ok(())
        }

        async fn next_event(&mut self) -> Option<MarketEvent> {
            self.events.pop_front().flatten()
        }

        fn exchange_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn fast_config() -> ReconnectionConfig {
        ReconnectionConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            max_attempts: 3,
            heartbeat_timeout_secs: 30,
        }
    }

    fn snapshot_event() -> MarketEvent {
        MarketEvent::Snapshot {
            token_id: TokenId::from("tok"),
            bids: vec![],
            asks: vec![],
            sequence: None,
            received_ms: now_ms(),
        }
    }

    #[tokio::test]
    async fn reconnects_after_disconnect_and_resubscribes() {
        let inner = ScriptedStream::new(
            vec![Ok(()), Ok(())],
            vec![
                Some(MarketEvent::Disconnected {
                    reason: "gone".into(),
                }),
                Some(snapshot_event()),
            ],
        );
        let mut stream = ReconnectingStream::new(inner, fast_config());

        stream.connect().await.unwrap();
        stream.subscribe(&[TokenId::from("tok")]).await.unwrap();

        let event = stream.next_event().await;
        assert!(matches!(event, Some(MarketEvent::Snapshot { .. })));
        // One initial subscribe plus one restore after reconnect.
        assert_eq!(stream.inner.subscribe_calls, 2);
        assert_eq!(stream.inner.connect_calls, 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let inner = ScriptedStream::new(
            vec![
                Ok(()),
                Err(crate::error::Error::Connection("refused".into())),
                Err(crate::error::Error::Connection("refused".into())),
                Err(crate::error::Error::Connection("refused".into())),
            ],
            vec![Some(MarketEvent::Disconnected {
                reason: "gone".into(),
            })],
        );
        let mut stream = ReconnectingStream::new(inner, fast_config());

        stream.connect().await.unwrap();
        let event = stream.next_event().await;
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn heartbeat_is_ok_before_any_event() {
        let inner = ScriptedStream::new(vec![Ok(())], vec![]);
        let stream = ReconnectingStream::new(inner, fast_config());
        assert!(stream.heartbeat_ok());
    }

    #[tokio::test]
    async fn unsubscribe_forgets_tokens() {
        let inner = ScriptedStream::new(vec![Ok(())], vec![]);
        let mut stream = ReconnectingStream::new(inner, fast_config());
        stream.connect().await.unwrap();

        let token = TokenId::from("tok");
        stream.subscribe(std::slice::from_ref(&token)).await.unwrap();
        assert_eq!(stream.subscribed_tokens.len(), 1);

        stream.unsubscribe(std::slice::from_ref(&token)).await.unwrap();
        assert!(stream.subscribed_tokens.is_empty());
    }
}
