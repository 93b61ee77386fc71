//! Market metadata resolution
//!
//! Maps outcome-token ids to immutable market metadata. Populated by bulk
//! prefetch of open markets in the tracked categories plus just-in-time
//! single lookups when an unknown token shows up in the fill stream.
//! Metadata is never evicted for the process lifetime.

mod gamma;

pub use gamma::{GammaClient, GammaConfig, MarketStatus};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Immutable metadata for a single outcome token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeToken {
    /// CLOB token identifier (decimal string)
    pub token_id: String,
    /// Condition identifier of the parent market
    pub condition_id: String,
    /// Market question
    pub market_title: String,
    /// Outcome label for this token (e.g. "Up")
    pub outcome_label: String,
    /// The other side of a binary market, if any
    pub opposite_token_id: Option<String>,
    /// Minimum price increment for orders
    pub tick_size: Decimal,
    /// Whether the market trades on the neg-risk exchange
    pub neg_risk: bool,
}

/// Token-id keyed metadata cache. No eviction.
pub struct MarketCache {
    tokens: RwLock<HashMap<String, Arc<OutcomeToken>>>,
    conditions: RwLock<HashSet<String>>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            conditions: RwLock::new(HashSet::new()),
        }
    }

    /// Look up cached metadata for a token
    pub async fn lookup(&self, token_id: &str) -> Option<Arc<OutcomeToken>> {
        self.tokens.read().await.get(token_id).cloned()
    }

    /// Whether a token is known
    pub async fn contains(&self, token_id: &str) -> bool {
        self.tokens.read().await.contains_key(token_id)
    }

    /// Insert the tokens of one market. Returns the token ids that were new;
    /// re-inserting a known condition is a no-op.
    pub async fn insert_market(&self, tokens: Vec<OutcomeToken>) -> Vec<String> {
        let Some(condition_id) = tokens.first().map(|t| t.condition_id.clone()) else {
            return vec![];
        };

        let mut conditions = self.conditions.write().await;
        if !conditions.insert(condition_id) {
            return vec![];
        }

        let mut map = self.tokens.write().await;
        let mut added = Vec::with_capacity(tokens.len());
        for token in tokens {
            added.push(token.token_id.clone());
            map.insert(token.token_id.clone(), Arc::new(token));
        }
        added
    }

    /// All cached token ids
    pub async fn token_ids(&self) -> Vec<String> {
        self.tokens.read().await.keys().cloned().collect()
    }
}

impl Default for MarketCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache-through resolver: cached lookup plus just-in-time REST fetch.
///
/// Duplicate concurrent fetches for the same token are wasteful but safe;
/// the cache ignores re-inserts of a known condition.
pub struct MarketResolver {
    cache: Arc<MarketCache>,
    gamma: Arc<GammaClient>,
    /// Newly cached token ids are announced here so the price feed can
    /// subscribe to them
    subscriber: RwLock<Option<mpsc::Sender<Vec<String>>>>,
}

impl MarketResolver {
    pub fn new(cache: Arc<MarketCache>, gamma: Arc<GammaClient>) -> Self {
        Self {
            cache,
            gamma,
            subscriber: RwLock::new(None),
        }
    }

    /// Route new-token announcements to the price feed
    pub async fn set_price_subscriber(&self, tx: mpsc::Sender<Vec<String>>) {
        *self.subscriber.write().await = Some(tx);
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    /// Cached lookup
    pub async fn lookup(&self, token_id: &str) -> Option<Arc<OutcomeToken>> {
        self.cache.lookup(token_id).await
    }

    /// Cached lookup with a just-in-time metadata fetch on miss
    pub async fn resolve_by_fetch(&self, token_id: &str) -> Option<Arc<OutcomeToken>> {
        if token_id.is_empty() || token_id == "0" {
            return None;
        }
        if let Some(token) = self.cache.lookup(token_id).await {
            return Some(token);
        }

        match self.gamma.fetch_by_token_id(token_id).await {
            Ok(Some(tokens)) => {
                self.announce(self.cache.insert_market(tokens).await).await;
                self.cache.lookup(token_id).await
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(token_id, error = %e, "JIT metadata fetch failed");
                None
            }
        }
    }

    /// Bulk prefetch of open markets for the configured search terms
    pub async fn scan_markets(&self) -> anyhow::Result<usize> {
        let markets = self.gamma.scan_open_markets().await?;
        let mut added = 0;
        for tokens in markets {
            let new_ids = self.cache.insert_market(tokens).await;
            added += new_ids.len();
            self.announce(new_ids).await;
        }
        if added > 0 {
            tracing::info!(tokens = added, "Market scan cached new tokens");
        }
        Ok(added)
    }

    async fn announce(&self, token_ids: Vec<String>) {
        if token_ids.is_empty() {
            return;
        }
        if let Some(tx) = self.subscriber.read().await.as_ref() {
            let _ = tx.send(token_ids).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token(token_id: &str, condition_id: &str, opposite: Option<&str>) -> OutcomeToken {
        OutcomeToken {
            token_id: token_id.to_string(),
            condition_id: condition_id.to_string(),
            market_title: "Bitcoin Up or Down".to_string(),
            outcome_label: "Up".to_string(),
            opposite_token_id: opposite.map(|s| s.to_string()),
            tick_size: dec!(0.01),
            neg_risk: false,
        }
    }

    #[tokio::test]
    async fn test_cache_insert_and_lookup() {
        let cache = MarketCache::new();
        let added = cache
            .insert_market(vec![token("1", "0xc1", Some("2")), token("2", "0xc1", Some("1"))])
            .await;
        assert_eq!(added.len(), 2);

        let hit = cache.lookup("1").await.unwrap();
        assert_eq!(hit.condition_id, "0xc1");
        assert_eq!(hit.opposite_token_id.as_deref(), Some("2"));
        assert!(cache.lookup("3").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_reinsert_is_noop() {
        let cache = MarketCache::new();
        cache.insert_market(vec![token("1", "0xc1", None)]).await;
        let added = cache.insert_market(vec![token("1", "0xc1", None)]).await;
        assert!(added.is_empty());
    }

    #[tokio::test]
    async fn test_cache_empty_market() {
        let cache = MarketCache::new();
        let added = cache.insert_market(vec![]).await;
        assert!(added.is_empty());
    }

    #[tokio::test]
    async fn test_token_ids() {
        let cache = MarketCache::new();
        cache
            .insert_market(vec![token("1", "0xc1", Some("2")), token("2", "0xc1", Some("1"))])
            .await;
        let mut ids = cache.token_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
    }
}
