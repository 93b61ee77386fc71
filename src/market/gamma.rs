//! Gamma API client for market metadata
//!
//! Fetches market metadata by search term (bulk prefetch) or by CLOB token
//! id (just-in-time lookup). Responses are loosely typed upstream, so every
//! field the cost-basis math depends on is validated here at the boundary.

use super::OutcomeToken;
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Search terms for bulk prefetch
    pub search_terms: Vec<String>,
    /// Maximum markets per search term
    pub prefetch_limit: u32,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://gamma-api.polymarket.com".to_string(),
            timeout: Duration::from_secs(10),
            search_terms: vec![],
            prefetch_limit: 50,
        }
    }
}

/// Client for the Gamma metadata API
pub struct GammaClient {
    config: GammaConfig,
    client: Client,
}

/// Resolution status of a market, used by the redemption sweeper
#[derive(Debug, Clone)]
pub struct MarketStatus {
    pub condition_id: String,
    pub question: String,
    pub outcomes: Vec<String>,
    pub outcome_prices: Vec<Decimal>,
    pub closed: bool,
    pub neg_risk: bool,
}

impl MarketStatus {
    /// Index of the winning outcome if the market has resolved to a binary
    /// 0/1 payout, `None` while still trading or unresolved.
    pub fn resolved_winner(&self) -> Option<usize> {
        if !self.closed {
            return None;
        }
        self.outcome_prices.iter().position(|p| *p == Decimal::ONE)
    }
}

impl GammaClient {
    /// Create a new client with custom configuration
    pub fn with_config(config: GammaConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Fetch open markets for every configured search term
    pub async fn scan_open_markets(&self) -> anyhow::Result<Vec<Vec<OutcomeToken>>> {
        let url = format!("{}/markets", self.config.base_url);
        let limit = self.config.prefetch_limit.to_string();
        let mut markets = Vec::new();

        for term in &self.config.search_terms {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("q", term.as_str()),
                    ("closed", "false"),
                    ("active", "true"),
                    ("limit", limit.as_str()),
                ])
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                anyhow::bail!("Gamma API error: {} for search term {:?}", status, term);
            }

            let raw: Vec<GammaMarket> = response.json().await?;
            for market in raw {
                match market.into_tokens() {
                    Ok(tokens) => markets.push(tokens),
                    Err(e) => tracing::debug!(error = %e, "Skipping malformed market"),
                }
            }
        }

        Ok(markets)
    }

    /// Fetch the market owning a specific CLOB token id
    pub async fn fetch_by_token_id(
        &self,
        token_id: &str,
    ) -> anyhow::Result<Option<Vec<OutcomeToken>>> {
        let Some(market) = self.fetch_raw_by_token_id(token_id).await? else {
            return Ok(None);
        };
        Ok(Some(market.into_tokens()?))
    }

    /// Fetch the resolution status of the market owning a token
    pub async fn fetch_status(&self, token_id: &str) -> anyhow::Result<Option<MarketStatus>> {
        let Some(market) = self.fetch_raw_by_token_id(token_id).await? else {
            return Ok(None);
        };
        Ok(Some(market.into_status()?))
    }

    async fn fetch_raw_by_token_id(&self, token_id: &str) -> anyhow::Result<Option<GammaMarket>> {
        let url = format!("{}/markets", self.config.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("clob_token_ids", token_id), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let mut markets: Vec<GammaMarket> = response.json().await?;
        if markets.is_empty() {
            return Ok(None);
        }
        Ok(Some(markets.remove(0)))
    }
}

/// Raw market response from the Gamma API.
///
/// `clobTokenIds`, `outcomes` and `outcomePrices` arrive as JSON-encoded
/// strings inside the JSON body; older records carry real arrays.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    condition_id: String,
    question: String,
    clob_token_ids: Option<JsonList>,
    outcomes: Option<JsonList>,
    outcome_prices: Option<JsonList>,
    order_price_min_tick_size: Option<Decimal>,
    #[serde(default)]
    neg_risk: bool,
    #[serde(default)]
    closed: bool,
}

/// A list that may arrive either as a JSON array or as a JSON string
/// containing an encoded array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonList {
    List(Vec<String>),
    Encoded(String),
}

impl JsonList {
    fn into_vec(self) -> anyhow::Result<Vec<String>> {
        match self {
            JsonList::List(v) => Ok(v),
            JsonList::Encoded(s) => {
                serde_json::from_str(&s).map_err(|e| anyhow::anyhow!("bad encoded list: {}", e))
            }
        }
    }
}

impl GammaMarket {
    /// Validate and convert into one OutcomeToken per outcome
    fn into_tokens(self) -> anyhow::Result<Vec<OutcomeToken>> {
        let token_ids = self
            .clob_token_ids
            .ok_or_else(|| anyhow::anyhow!("missing clobTokenIds for {}", self.condition_id))?
            .into_vec()?;
        if token_ids.is_empty() {
            anyhow::bail!("empty clobTokenIds for {}", self.condition_id);
        }

        let outcomes = match self.outcomes {
            Some(list) => list.into_vec()?,
            None => vec![],
        };

        let tick_size = self.order_price_min_tick_size.unwrap_or(dec!(0.01));

        Ok(token_ids
            .iter()
            .enumerate()
            .map(|(i, token_id)| {
                // In a binary market the other token is the opposite side
                let opposite_token_id = if token_ids.len() == 2 {
                    Some(token_ids[1 - i].clone())
                } else {
                    None
                };
                OutcomeToken {
                    token_id: token_id.clone(),
                    condition_id: self.condition_id.clone(),
                    market_title: self.question.clone(),
                    outcome_label: outcomes.get(i).cloned().unwrap_or_default(),
                    opposite_token_id,
                    tick_size,
                    neg_risk: self.neg_risk,
                }
            })
            .collect())
    }

    /// Validate and convert into a resolution status
    fn into_status(self) -> anyhow::Result<MarketStatus> {
        let outcomes = match self.outcomes {
            Some(list) => list.into_vec()?,
            None => vec![],
        };
        let outcome_prices = match self.outcome_prices {
            Some(list) => list
                .into_vec()?
                .iter()
                .map(|p| Decimal::from_str(p))
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![],
        };

        Ok(MarketStatus {
            condition_id: self.condition_id,
            question: self.question,
            outcomes,
            outcome_prices,
            closed: self.closed,
            neg_risk: self.neg_risk,
        })
    }
}
