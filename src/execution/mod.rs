//! Order execution module
//!
//! Defines the order-matching service seam (`OrderClient`), the rejection
//! taxonomy, and the bounded chase executor.

mod chase;
mod clob;

pub use chase::{ChaseConfig, ChaseExecutor, ChaseOutcome, Preflight};
pub use clob::ClobHttpClient;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trade side, from the acting account's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The side that unwinds this one
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// A fill-and-kill order for the order-matching service
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// CLOB token identifier
    pub token_id: String,
    /// Limit price in [0, 1], tick-aligned
    pub price: Decimal,
    pub side: Side,
    /// Size in shares
    pub size: Decimal,
    /// Minimum price increment of the market
    pub tick_size: Decimal,
    /// Whether the market trades on the neg-risk exchange
    pub neg_risk: bool,
}

/// Sub-classification of a rejected placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectClass {
    /// FAK killed, nothing resting at the limit, or size below the venue
    /// minimum; expected noise, retried via chase/reconciliation
    NoLiquidity,
    /// Market resolved between detection and execution; deferred to the
    /// redemption sweeper
    MarketClosed,
    /// Anything else; logged, non-fatal
    Other,
}

/// Explicit placement result so callers branch deliberately instead of
/// relying on catch-all error handling
#[derive(Debug, Clone)]
pub enum Placement {
    /// Order matched; id assigned by the venue
    Filled { order_id: String },
    /// Order rejected with a reason
    Rejected { class: RejectClass, message: String },
}

/// Classify a venue rejection message
pub fn classify_rejection(message: &str) -> RejectClass {
    let msg = message.to_lowercase();
    if msg.contains("killed")
        || msg.contains("fully filled")
        || msg.contains("invalid amount")
        || msg.contains("not enough")
        || msg.contains("no match")
    {
        RejectClass::NoLiquidity
    } else if msg.contains("closed") || msg.contains("does not exist") {
        RejectClass::MarketClosed
    } else {
        RejectClass::Other
    }
}

/// Seam to the order-matching service
#[async_trait]
pub trait OrderClient: Send + Sync {
    /// Submit a fill-and-kill order. `Err` means the transport failed and the
    /// order state is unknown; `Ok(Placement)` is a definitive venue answer.
    async fn post_order(&self, order: &OrderRequest) -> anyhow::Result<Placement>;

    /// Cancel all resting orders on a token
    async fn cancel_token_orders(&self, token_id: &str) -> anyhow::Result<()>;
}
