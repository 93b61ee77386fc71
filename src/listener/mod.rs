//! Chain fill listener
//!
//! Subscribes to OrderFilled logs from the exchange contracts over a
//! JSON-RPC WebSocket, decodes the fills, and emits [`TradeSignal`]s for the
//! reference trader. The subscription is re-issued on every reconnect; gaps
//! during downtime are healed by the reconciler, not replayed.

mod decode;

pub use decode::{
    attribute_fill, decode_order_filled, OrderFilledEvent, RawLog, TradeSignal,
    ORDER_FILLED_TOPIC,
};

use crate::market::MarketResolver;
use crate::prices::PriceBook;
use crate::telemetry::{bump_counter, CounterMetric};
use crate::ws::{WsClient, WsConfig, WsMessage};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Envelope of an `eth_subscription` notification
#[derive(Debug, Deserialize)]
struct SubscriptionEnvelope {
    method: Option<String>,
    params: Option<SubscriptionParams>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionParams {
    result: RawLog,
}

/// Listens for reference-trader fills on the exchange contracts
pub struct FillListener {
    ws_url: String,
    /// Lowercased reference trader address
    reference: String,
    /// Lowercased exchange contract addresses
    exchanges: Vec<String>,
    resolver: Arc<MarketResolver>,
    prices: Arc<PriceBook>,
    /// Fills below this many shares are dust and dropped
    min_shares: rust_decimal::Decimal,
}

impl FillListener {
    pub fn new(
        ws_url: String,
        reference: String,
        exchanges: Vec<String>,
        resolver: Arc<MarketResolver>,
        prices: Arc<PriceBook>,
        min_shares: rust_decimal::Decimal,
    ) -> Self {
        Self {
            ws_url,
            reference: reference.to_lowercase(),
            exchanges: exchanges.into_iter().map(|a| a.to_lowercase()).collect(),
            resolver,
            prices,
            min_shares,
        }
    }

    /// Run until the signal receiver is dropped
    pub async fn run(self, signals: mpsc::Sender<TradeSignal>) {
        let client = WsClient::new(WsConfig::new(&self.ws_url));
        let (mut rx, tx) = client.connect();

        while let Some(msg) = rx.recv().await {
            match msg {
                WsMessage::Connected => {
                    let subscribe = json!({
                        "jsonrpc": "2.0",
                        "id": 1,
                        "method": "eth_subscribe",
                        "params": [
                            "logs",
                            {
                                "address": self.exchanges,
                                "topics": [ORDER_FILLED_TOPIC.as_str()],
                            }
                        ]
                    });
                    if tx.send(subscribe.to_string()).await.is_err() {
                        break;
                    }
                    tracing::info!(url = %self.ws_url, "Subscribed to OrderFilled logs");
                }
                WsMessage::Text(text) => {
                    if let Some(log) = parse_notification(&text) {
                        if let Some(signal) = self.handle_log(&log).await {
                            if signals.send(signal).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "Fill stream reconnecting");
                }
                WsMessage::Disconnected => {
                    tracing::error!("Fill stream disconnected permanently");
                    return;
                }
            }
        }
    }

    /// Decode one log into a trade signal for the reference trader
    async fn handle_log(&self, log: &RawLog) -> Option<TradeSignal> {
        if !self.exchanges.iter().any(|a| log.address.eq_ignore_ascii_case(a)) {
            return None;
        }
        let event = decode_order_filled(log)?;
        if event.maker != self.reference && event.taker != self.reference {
            return None;
        }

        let token = self.resolve_risk_leg(&event).await?;
        let (side, shares, price) = attribute_fill(&event, &self.reference, &token.token_id)?;
        if shares < self.min_shares {
            tracing::debug!(token_id = %token.token_id, %shares, "Dust fill dropped");
            return None;
        }

        bump_counter(CounterMetric::FillsDecoded);
        // Fill prices double as quotes until the live feed covers the token
        self.prices.observe(&token.token_id, price).await;

        tracing::info!(
            token_id = %token.token_id,
            market = %token.market_title,
            outcome = %token.outcome_label,
            ?side,
            %shares,
            %price,
            tx = %log.transaction_hash.as_deref().unwrap_or(""),
            "Reference fill"
        );

        Some(TradeSignal {
            token_id: token.token_id.clone(),
            side,
            shares,
            price,
            tx_hash: log.transaction_hash.clone().unwrap_or_default(),
            observed_at: chrono::Utc::now(),
        })
    }

    /// Identify the risk leg of the fill: the single non-collateral asset id,
    /// resolved through the market cache with a just-in-time fetch on miss.
    /// Fills where both legs are outcome tokens are skipped; those crosses
    /// carry no unambiguous price for a single token.
    async fn resolve_risk_leg(
        &self,
        event: &OrderFilledEvent,
    ) -> Option<Arc<crate::market::OutcomeToken>> {
        let maker_is_risk = event.maker_asset_id != "0";
        let taker_is_risk = event.taker_asset_id != "0";

        match (maker_is_risk, taker_is_risk) {
            (true, false) => self.resolver.resolve_by_fetch(&event.maker_asset_id).await,
            (false, true) => self.resolver.resolve_by_fetch(&event.taker_asset_id).await,
            (true, true) => {
                tracing::debug!(
                    maker_asset = %event.maker_asset_id,
                    taker_asset = %event.taker_asset_id,
                    "Skipping token-for-token fill"
                );
                None
            }
            (false, false) => None,
        }
    }
}

/// Extract the log from a subscription notification, ignoring RPC replies
fn parse_notification(text: &str) -> Option<RawLog> {
    let envelope: SubscriptionEnvelope = serde_json::from_str(text).ok()?;
    if envelope.method.as_deref() != Some("eth_subscription") {
        return None;
    }
    Some(envelope.params?.result)
}
