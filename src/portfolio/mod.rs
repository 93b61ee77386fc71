//! Account portfolio state
//!
//! REST snapshots of positions and portfolio value for both tracked
//! accounts, the follower's in-memory book with optimistic updates, and the
//! equity pair that yields the scale ratio.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One position as reported by the data API
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPosition {
    /// CLOB token id
    pub asset: String,
    /// Shares held
    pub size: Decimal,
    /// Venue-computed average entry price
    #[serde(rename = "avgPrice", default)]
    pub avg_price: Decimal,
    /// Mark value of the position
    #[serde(rename = "currentValue", default)]
    pub current_value: Decimal,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub outcome: String,
}

#[derive(Debug, Deserialize)]
struct PortfolioValue {
    value: Decimal,
}

/// Authoritative account snapshots
#[async_trait]
pub trait AccountDataSource: Send + Sync {
    /// Open positions for an account
    async fn positions(&self, address: &str) -> anyhow::Result<Vec<AccountPosition>>;

    /// Mark value of all open positions for an account
    async fn portfolio_value(&self, address: &str) -> anyhow::Result<Decimal>;
}

/// Data API client
pub struct DataApiClient {
    base_url: String,
    client: Client,
}

impl DataApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl AccountDataSource for DataApiClient {
    async fn positions(&self, address: &str) -> anyhow::Result<Vec<AccountPosition>> {
        let url = format!("{}/positions", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("user", address), ("sizeThreshold", "0.1")])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("positions fetch failed: HTTP {}", response.status());
        }
        Ok(response.json().await?)
    }

    async fn portfolio_value(&self, address: &str) -> anyhow::Result<Decimal> {
        let url = format!("{}/value", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("user", address)])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("value fetch failed: HTTP {}", response.status());
        }
        let values: Vec<PortfolioValue> = response.json().await?;
        Ok(values.first().map(|v| v.value).unwrap_or(Decimal::ZERO))
    }
}

/// The follower's tracked holdings: share counts per token plus spendable
/// collateral. Updated optimistically on fills and overwritten by REST
/// snapshots on the refresh timer.
#[derive(Debug, Default)]
pub struct FollowerBook {
    positions: HashMap<String, Decimal>,
    pub collateral: Decimal,
}

impl FollowerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shares held of a token
    pub fn shares(&self, token_id: &str) -> Decimal {
        self.positions.get(token_id).copied().unwrap_or(Decimal::ZERO)
    }

    /// Token ids with a non-zero holding
    pub fn held_tokens(&self) -> Vec<String> {
        self.positions
            .iter()
            .filter(|(_, size)| !size.is_zero())
            .map(|(token, _)| token.clone())
            .collect()
    }

    /// Replace all positions with a REST snapshot
    pub fn replace_positions(&mut self, snapshot: &[AccountPosition]) {
        self.positions = snapshot
            .iter()
            .filter(|p| p.size > Decimal::ZERO)
            .map(|p| (p.asset.clone(), p.size))
            .collect();
    }

    /// Record a fill before the next REST snapshot confirms it
    pub fn apply_fill(&mut self, token_id: &str, side: crate::execution::Side, size: Decimal, price: Decimal) {
        let entry = self.positions.entry(token_id.to_string()).or_default();
        match side {
            crate::execution::Side::Buy => {
                *entry += size;
                self.collateral -= size * price;
            }
            crate::execution::Side::Sell => {
                *entry = (*entry - size).max(Decimal::ZERO);
                self.collateral += size * price;
            }
        }
        if self.collateral < Decimal::ZERO {
            self.collateral = Decimal::ZERO;
        }
    }
}

/// Equity readings for both accounts. The ratio is undefined until both
/// sides have been observed; implausibly small reference readings are
/// rejected so a flaky API response cannot inflate the ratio.
#[derive(Debug, Default)]
pub struct EquityPair {
    follower: Option<Decimal>,
    reference: Option<Decimal>,
    min_reference: Decimal,
}

impl EquityPair {
    pub fn new(min_reference: Decimal) -> Self {
        Self {
            follower: None,
            reference: None,
            min_reference,
        }
    }

    pub fn set_follower(&mut self, total: Decimal) {
        self.follower = Some(total);
    }

    /// Update the reference reading; values below the plausibility floor are
    /// discarded and the previous reading kept
    pub fn set_reference(&mut self, total: Decimal) {
        if total < self.min_reference {
            tracing::warn!(%total, floor = %self.min_reference, "Ignoring implausible reference equity");
            return;
        }
        self.reference = Some(total);
    }

    pub fn follower(&self) -> Option<Decimal> {
        self.follower
    }

    pub fn reference(&self) -> Option<Decimal> {
        self.reference
    }

    /// follower equity / reference equity
    pub fn scale_ratio(&self) -> Option<Decimal> {
        let follower = self.follower?;
        let reference = self.reference?;
        if reference <= Decimal::ZERO {
            return None;
        }
        Some(follower / reference)
    }
}
