//! Live price feed
//!
//! Maintains a last-known price per token from the CLOB market stream.
//! Prices here size orders and value drift; they are advisory, so a stale
//! quote degrades pricing but never corrupts position state.

use crate::market::MarketCache;
use crate::ws::{WsClient, WsConfig, WsMessage};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Last-known price per token id
pub struct PriceBook {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Last-known price, if any
    pub async fn get(&self, token_id: &str) -> Option<Decimal> {
        self.prices.read().await.get(token_id).copied()
    }

    /// Last-known price or a fallback
    pub async fn get_or(&self, token_id: &str, fallback: Decimal) -> Decimal {
        self.get(token_id).await.unwrap_or(fallback)
    }

    /// Record an observed price
    pub async fn observe(&self, token_id: &str, price: Decimal) {
        if price <= Decimal::ZERO || price >= Decimal::ONE {
            return;
        }
        self.prices.write().await.insert(token_id.to_string(), price);
    }

    pub async fn len(&self) -> usize {
        self.prices.read().await.len()
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        Self::new()
    }
}

/// One price update extracted from a stream message
#[derive(Debug, Clone, PartialEq)]
pub struct PriceUpdate {
    pub token_id: String,
    pub price: Decimal,
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    event_type: String,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    price: Option<String>,
    #[serde(default)]
    changes: Option<Vec<StreamChange>>,
}

#[derive(Debug, Deserialize)]
struct StreamChange {
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    price: Option<String>,
}

/// Extract price updates from one market-stream frame. Frames arrive as a
/// single event or as an array of events; `price_change` events may batch
/// updates in a nested `changes` array.
pub fn parse_stream_message(text: &str) -> Vec<PriceUpdate> {
    let events: Vec<StreamEvent> = match serde_json::from_str::<Vec<StreamEvent>>(text) {
        Ok(events) => events,
        Err(_) => match serde_json::from_str::<StreamEvent>(text) {
            Ok(event) => vec![event],
            Err(_) => return vec![],
        },
    };

    let mut updates = Vec::new();
    for event in events {
        if event.event_type != "price_change" && event.event_type != "trade" {
            continue;
        }
        if let Some(update) = to_update(event.asset_id.as_deref(), event.price.as_deref()) {
            updates.push(update);
        }
        for change in event.changes.unwrap_or_default() {
            if let Some(update) = to_update(change.asset_id.as_deref(), change.price.as_deref()) {
                updates.push(update);
            }
        }
    }
    updates
}

fn to_update(asset_id: Option<&str>, price: Option<&str>) -> Option<PriceUpdate> {
    let token_id = asset_id?.to_string();
    let price = Decimal::from_str(price?).ok()?;
    Some(PriceUpdate { token_id, price })
}

/// Streams CLOB market prices into a [`PriceBook`]
pub struct PriceFeed {
    ws_url: String,
    book: Arc<PriceBook>,
    cache: Arc<MarketCache>,
}

impl PriceFeed {
    pub fn new(ws_url: String, book: Arc<PriceBook>, cache: Arc<MarketCache>) -> Self {
        Self { ws_url, book, cache }
    }

    /// Run until the subscribe channel closes. `subscriptions` carries token
    /// ids to add to the stream; the full set is replayed on reconnect.
    pub async fn run(self, mut subscriptions: mpsc::Receiver<Vec<String>>) {
        let client = WsClient::new(WsConfig::new(&self.ws_url));
        let (mut rx, tx) = client.connect();

        let mut subscribed: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        WsMessage::Connected => {
                            // Cache contents may predate this connection
                            subscribed.extend(self.cache.token_ids().await);
                            if !subscribed.is_empty() {
                                let assets: Vec<&String> = subscribed.iter().collect();
                                if Self::send_subscribe(&tx, &assets).await.is_err() {
                                    break;
                                }
                                tracing::info!(tokens = subscribed.len(), "Price stream subscribed");
                            }
                        }
                        WsMessage::Text(text) => {
                            for update in parse_stream_message(&text) {
                                self.book.observe(&update.token_id, update.price).await;
                            }
                        }
                        WsMessage::Reconnecting { attempt } => {
                            tracing::warn!(attempt, "Price stream reconnecting");
                        }
                        WsMessage::Disconnected => {
                            tracing::error!("Price stream disconnected permanently");
                            break;
                        }
                    }
                }

                tokens = subscriptions.recv() => {
                    let Some(tokens) = tokens else { break };
                    let fresh: Vec<String> = tokens
                        .into_iter()
                        .filter(|t| subscribed.insert(t.clone()))
                        .collect();
                    if !fresh.is_empty() {
                        let assets: Vec<&String> = fresh.iter().collect();
                        let _ = Self::send_subscribe(&tx, &assets).await;
                    }
                }
            }
        }
    }

    async fn send_subscribe(
        tx: &mpsc::Sender<String>,
        assets: &[&String],
    ) -> Result<(), mpsc::error::SendError<String>> {
        let frame = json!({
            "type": "market",
            "assets_ids": assets,
        });
        tx.send(frame.to_string()).await
    }
}
