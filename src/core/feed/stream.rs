//! Market data stream trait and WebSocket implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::dedup::FingerprintCache;
use super::messages::{parse_deltas, parse_levels, FeedMessage, SubscribeMessage};
use crate::core::domain::{LevelDelta, PriceLevel, TokenId};
use crate::core::telemetry::now_ms;
use crate::error::{Error, Result};

/// An event produced by a market data stream.
#[derive(Debug, Clone)]
pub enum MarketEvent {
    /// Full book replacement for one token.
    Snapshot {
        token_id: TokenId,
        bids: Vec<PriceLevel>,
        asks: Vec<PriceLevel>,
        sequence: Option<u64>,
        received_ms: i64,
    },
    /// Incremental per-level changes for one token.
    Update {
        token_id: TokenId,
        bid_deltas: Vec<LevelDelta>,
        ask_deltas: Vec<LevelDelta>,
        sequence: Option<u64>,
        received_ms: i64,
    },
    /// The connection was lost.
    Disconnected { reason: String },
}

/// Abstraction over a streaming market data source.
#[async_trait]
pub trait MarketDataStream: Send {
    /// Establish the connection.
    async fn connect(&mut self) -> Result<()>;

    /// Subscribe to book updates for the given tokens.
    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()>;

    /// Unsubscribe from the given tokens.
    async fn unsubscribe(&mut self, token_ids: &[TokenId]) -> Result<()>;

    /// Wait for the next event. `None` means the stream has ended.
    async fn next_event(&mut self) -> Option<MarketEvent>;

    /// Name of the backing exchange, for logging.
    fn exchange_name(&self) -> &'static str;
}

/// WebSocket-backed market data stream.
pub struct WsDataStream {
    url: String,
    ws: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    dedup: Option<Arc<FingerprintCache>>,
}

impl WsDataStream {
    /// Create a new stream for the given WebSocket URL.
    #[must_use]
    pub fn new(url: String) -> Self {
        Self {
            url,
            ws: None,
            dedup: None,
        }
    }

    /// Attach a fingerprint cache for wire-level duplicate filtering.
    #[must_use]
    pub fn with_dedup(mut self, dedup: Arc<FingerprintCache>) -> Self {
        self.dedup = Some(dedup);
        self
    }

    async fn send_subscription(&mut self, msg: &SubscribeMessage) -> Result<()> {
        let ws = self
            .ws
            .as_mut()
            .ok_or_else(|| Error::Connection("Not connected".into()))?;
        let json = serde_json::to_string(msg)?;
        ws.send(Message::Text(json)).await?;
        Ok(())
    }

    fn to_event(msg: FeedMessage) -> Option<MarketEvent> {
        match msg {
            FeedMessage::Snapshot {
                token_id,
                bids,
                asks,
                sequence_number,
            } => Some(MarketEvent::Snapshot {
                token_id: TokenId::from(token_id),
                bids: parse_levels(&bids),
                asks: parse_levels(&asks),
                sequence: sequence_number,
                received_ms: now_ms(),
            }),
            FeedMessage::Update {
                token_id,
                bids,
                asks,
                sequence_number,
            } => Some(MarketEvent::Update {
                token_id: TokenId::from(token_id),
                bid_deltas: parse_deltas(&bids),
                ask_deltas: parse_deltas(&asks),
                sequence: sequence_number,
                received_ms: now_ms(),
            }),
            FeedMessage::Unknown => None,
        }
    }
}

#[async_trait]
impl MarketDataStream for WsDataStream {
    async fn connect(&mut self) -> Result<()> {
        info!(url = %self.url, "Connecting to feed");
        let (ws_stream, response) = connect_async(&self.url).await?;
        info!(status = %response.status(), "Feed connected");
        self.ws = Some(ws_stream);
        Ok(())
    }

    async fn subscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        let tokens: Vec<String> = token_ids.iter().map(|t| t.as_str().to_string()).collect();
        info!(tokens = tokens.len(), "Subscribing to tokens");
        self.send_subscription(&SubscribeMessage::subscribe(tokens))
            .await
    }

    async fn unsubscribe(&mut self, token_ids: &[TokenId]) -> Result<()> {
        let tokens: Vec<String> = token_ids.iter().map(|t| t.as_str().to_string()).collect();
        info!(tokens = tokens.len(), "Unsubscribing from tokens");
        self.send_subscription(&SubscribeMessage::unsubscribe(tokens))
            .await
    }

    async fn next_event(&mut self) -> Option<MarketEvent> {
        let ws = self.ws.as_mut()?;

        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => {
                    // Heartbeat frames arrive as empty text.
                    if text.trim().is_empty() {
                        continue;
                    }

                    if let Some(dedup) = &self.dedup {
                        if dedup.is_duplicate(&text) {
                            debug!("Dropping duplicate frame");
                            continue;
                        }
                    }

                    match serde_json::from_str::<FeedMessage>(&text) {
                        Ok(msg) => {
                            if let Some(event) = Self::to_event(msg) {
                                return Some(event);
                            }
                        }
                        Err(e) => {
                            // Parse failures never terminate the loop.
                            warn!(error = %e, raw = %text, "Failed to parse feed message");
                        }
                    }
                }
                Ok(Message::Ping(data)) => {
                    debug!("Received ping");
                    if ws.send(Message::Pong(data)).await.is_err() {
                        return Some(MarketEvent::Disconnected {
                            reason: "Failed to send pong".into(),
                        });
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!(frame = ?frame, "Feed closed by server");
                    return Some(MarketEvent::Disconnected {
                        reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    error!(error = %e, "Feed error");
                    return Some(MarketEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn exchange_name(&self) -> &'static str {
        "Polymarket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn snapshot_message_becomes_event() {
        let msg: FeedMessage = serde_json::from_str(
            r#"{"type":"snapshot","token_id":"tok","asks":[{"price":"0.5","size":"10"}]}"#,
        )
        .unwrap();

        match WsDataStream::to_event(msg) {
            Some(MarketEvent::Snapshot {
                token_id, asks, ..
            }) => {
                assert_eq!(token_id.as_str(), "tok");
                assert_eq!(asks[0].price(), dec!(0.5));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_message_yields_no_event() {
        let msg: FeedMessage =
            serde_json::from_str(r#"{"type":"last_trade_price","token_id":"tok"}"#).unwrap();
        assert!(WsDataStream::to_event(msg).is_none());
    }
}
