//! Replication engine
//!
//! Owns the shadow ledger, the follower book, and the equity pair, and turns
//! reference fills into proportional follower trades. All mutable state
//! lives behind one lock owned by the engine; no order placement happens
//! while the lock is held, so a slow chase never stalls the fill stream.

use crate::chain::ChainClient;
use crate::config::{AccountsConfig, ReplicationConfig};
use crate::execution::{ChaseExecutor, ChaseOutcome, OrderClient, Preflight, Side};
use crate::ledger::{Blacklist, ShadowLedger};
use crate::listener::TradeSignal;
use crate::market::{MarketResolver, OutcomeToken};
use crate::portfolio::{AccountDataSource, EquityPair, FollowerBook};
use crate::prices::PriceBook;
use crate::telemetry::{bump_counter, set_gauge, CounterMetric, GaugeMetric};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutable engine state, guarded by a single lock
struct EngineState {
    ledger: ShadowLedger,
    blacklist: Blacklist,
    follower: FollowerBook,
    equity: EquityPair,
}

/// A trade the target calculator wants executed
#[derive(Debug, Clone)]
struct TradeIntent {
    token: Arc<OutcomeToken>,
    side: Side,
    size: Decimal,
    price: Decimal,
}

pub struct Replicator {
    replication: ReplicationConfig,
    chase: ChaseExecutor,
    resolver: Arc<MarketResolver>,
    prices: Arc<PriceBook>,
    orders: Arc<dyn OrderClient>,
    data: Arc<dyn AccountDataSource>,
    chain: Arc<dyn ChainClient>,
    reference_address: String,
    follower_address: String,
    state: Mutex<EngineState>,
    /// Tokens with an execution attempt in flight
    pending: Mutex<HashSet<String>>,
}

impl Replicator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        replication: ReplicationConfig,
        chase: ChaseExecutor,
        resolver: Arc<MarketResolver>,
        prices: Arc<PriceBook>,
        orders: Arc<dyn OrderClient>,
        data: Arc<dyn AccountDataSource>,
        chain: Arc<dyn ChainClient>,
        accounts: &AccountsConfig,
    ) -> Self {
        let dust = replication.dust_epsilon;
        let min_reference = replication.min_reference_equity;
        Self {
            replication,
            chase,
            resolver,
            prices,
            orders,
            data,
            chain,
            reference_address: accounts.reference_address.clone(),
            follower_address: accounts.follower_address.clone(),
            state: Mutex::new(EngineState {
                ledger: ShadowLedger::new(dust),
                blacklist: Blacklist::new(),
                follower: FollowerBook::new(),
                equity: EquityPair::new(min_reference),
            }),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Snapshot the reference's pre-existing positions into the blacklist.
    /// Their entry history predates the fill stream, so they are excluded
    /// from replication for the process lifetime.
    pub async fn init_blacklist(&self) -> anyhow::Result<usize> {
        let positions = self.data.positions(&self.reference_address).await?;

        let mut ids: Vec<String> = Vec::new();
        for position in &positions {
            ids.push(position.asset.clone());
            // Also exclude the whole market when metadata is available
            if let Some(token) = self.resolver.lookup(&position.asset).await {
                ids.push(token.condition_id.clone());
            }
        }

        let mut state = self.state.lock().await;
        for id in ids {
            state.blacklist.add(id);
        }
        let count = state.blacklist.len();
        tracing::info!(entries = count, "Blacklisted pre-existing reference positions");
        Ok(count)
    }

    /// Handle one decoded reference fill
    pub async fn on_fill(&self, signal: TradeSignal) {
        let Some(token) = self.resolver.lookup(&signal.token_id).await else {
            tracing::debug!(token_id = %signal.token_id, "Fill for unresolved token dropped");
            return;
        };
        let price = self
            .prices
            .get_or(&signal.token_id, self.replication.fallback_price)
            .await;

        let intent = {
            let mut state = self.state.lock().await;
            if state.blacklist.excludes(&token) {
                bump_counter(CounterMetric::FillsBlacklisted);
                tracing::debug!(token_id = %token.token_id, "Fill on blacklisted token skipped");
                return;
            }

            let delta = match signal.side {
                Side::Buy => signal.shares,
                Side::Sell => -signal.shares,
            };
            let position = state.ledger.apply(&signal.token_id, delta, signal.price);
            set_gauge(GaugeMetric::ShadowPositions, state.ledger.len() as f64);
            tracing::info!(
                token_id = %token.token_id,
                net_shares = %position.net_shares,
                avg_entry = %position.avg_entry,
                "Shadow ledger updated"
            );

            self.compute_intent(&state, &token, price)
        };

        if let Some(intent) = intent {
            self.execute(intent).await;
        }
    }

    /// Target calculator: proportional target minus actual holding, gated by
    /// the dual thresholds
    fn compute_intent(
        &self,
        state: &EngineState,
        token: &Arc<OutcomeToken>,
        price: Decimal,
    ) -> Option<TradeIntent> {
        let ratio = state.equity.scale_ratio()?;
        let net = state.ledger.net_shares(&token.token_id);
        // The follower holds outcome tokens long only
        let target = (net * ratio).max(Decimal::ZERO);
        let held = state.follower.shares(&token.token_id);
        let diff = target - held;

        if diff.abs() < self.replication.min_share_threshold {
            return None;
        }
        if diff.abs() * price < self.replication.min_dollar_threshold {
            tracing::debug!(
                token_id = %token.token_id,
                %diff,
                %price,
                "Drift below dollar threshold"
            );
            return None;
        }

        let side = if diff > Decimal::ZERO { Side::Buy } else { Side::Sell };
        Some(TradeIntent {
            token: token.clone(),
            side,
            size: diff.abs(),
            price,
        })
    }

    /// Run one intent through the chase, guarded so only a single execution
    /// per token is in flight
    async fn execute(&self, intent: TradeIntent) {
        bump_counter(CounterMetric::TriggersFired);
        self.run_chase(&intent).await;
    }

    /// Pending guard, pre-flight snapshot, chase, optimistic update
    async fn run_chase(&self, intent: &TradeIntent) -> Option<ChaseOutcome> {
        let token_id = intent.token.token_id.clone();
        {
            let mut pending = self.pending.lock().await;
            if !pending.insert(token_id.clone()) {
                tracing::debug!(%token_id, "Execution already in flight, skipping");
                return None;
            }
            set_gauge(GaugeMetric::PendingOrders, pending.len() as f64);
        }

        let preflight = {
            let state = self.state.lock().await;
            Preflight {
                collateral: state.follower.collateral,
                owned_shares: state.follower.shares(&token_id),
            }
        };

        let outcome = self
            .chase
            .execute(
                self.orders.as_ref(),
                &intent.token,
                intent.side,
                intent.size,
                intent.price,
                preflight,
            )
            .await;

        if let ChaseOutcome::Filled { side, size, price, .. } = &outcome {
            let mut state = self.state.lock().await;
            state.follower.apply_fill(&token_id, *side, *size, *price);
        }

        let mut pending = self.pending.lock().await;
        pending.remove(&token_id);
        set_gauge(GaugeMetric::PendingOrders, pending.len() as f64);
        Some(outcome)
    }

    /// Reconcile the shadow ledger against the reference's REST snapshot:
    /// heal drifted entries, flatten entries the reference no longer holds,
    /// force-close follower-held ghosts, then re-run the target calculator
    /// for every reference-held token.
    pub async fn reconcile(&self) -> anyhow::Result<()> {
        let reference = self.data.positions(&self.reference_address).await?;

        let held = {
            let state = self.state.lock().await;
            state.follower.held_tokens()
        };

        // Resolve metadata and prices outside the state lock
        let mut tokens: HashMap<String, Arc<OutcomeToken>> = HashMap::new();
        let mut quotes: HashMap<String, Decimal> = HashMap::new();
        let relevant = reference
            .iter()
            .filter(|p| p.size > Decimal::ZERO)
            .map(|p| p.asset.clone())
            .chain(held.iter().cloned());
        for token_id in relevant {
            if tokens.contains_key(&token_id) {
                continue;
            }
            if let Some(token) = self.resolver.resolve_by_fetch(&token_id).await {
                tokens.insert(token_id.clone(), token);
            }
            let price = self
                .prices
                .get_or(&token_id, self.replication.fallback_price)
                .await;
            quotes.insert(token_id, price);
        }

        let (ghosts, intents) = {
            let mut state = self.state.lock().await;
            let reference_ids: HashSet<String> = reference
                .iter()
                .filter(|p| p.size > Decimal::ZERO)
                .map(|p| p.asset.clone())
                .collect();

            // Heal drifted shadow entries from REST truth
            for position in &reference {
                if position.size <= Decimal::ZERO || state.blacklist.contains(&position.asset) {
                    continue;
                }
                let net = state.ledger.net_shares(&position.asset);
                if (net - position.size).abs() > self.replication.drift_threshold_shares {
                    tracing::info!(
                        token_id = %position.asset,
                        shadow = %net,
                        actual = %position.size,
                        "Healing shadow ledger drift"
                    );
                    state
                        .ledger
                        .overwrite(&position.asset, position.size, Some(position.avg_price));
                }
            }

            // Shadow entries absent from the snapshot were closed while we
            // were not watching
            for token_id in state.ledger.open_tokens() {
                if !reference_ids.contains(&token_id) && !state.blacklist.contains(&token_id) {
                    tracing::info!(%token_id, "Flattening stale shadow entry");
                    state.ledger.overwrite(&token_id, Decimal::ZERO, None);
                }
            }
            set_gauge(GaugeMetric::ShadowPositions, state.ledger.len() as f64);

            // Ghosts: follower-held tokens the reference no longer holds
            let mut ghosts: Vec<TradeIntent> = Vec::new();
            for token_id in &held {
                if reference_ids.contains(token_id) || state.blacklist.contains(token_id) {
                    continue;
                }
                let Some(token) = tokens.get(token_id) else { continue };
                if state.blacklist.excludes(token) {
                    continue;
                }
                let owned = state.follower.shares(token_id);
                if owned < Decimal::ONE {
                    continue;
                }
                ghosts.push(TradeIntent {
                    token: token.clone(),
                    side: Side::Sell,
                    size: owned,
                    price: quotes.get(token_id).copied().unwrap_or(self.replication.fallback_price),
                });
            }

            // Re-run the target calculator over reference-held tokens
            let mut intents: Vec<TradeIntent> = Vec::new();
            for token_id in &reference_ids {
                let Some(token) = tokens.get(token_id) else { continue };
                if state.blacklist.excludes(token) {
                    continue;
                }
                let price = quotes.get(token_id).copied().unwrap_or(self.replication.fallback_price);
                if let Some(intent) = self.compute_intent(&state, token, price) {
                    intents.push(intent);
                }
            }

            (ghosts, intents)
        };

        for ghost in ghosts {
            self.close_ghost(ghost).await;
        }
        for intent in intents {
            self.execute(intent).await;
        }
        Ok(())
    }

    /// Cancel any resting orders on a ghost token and sell the whole holding
    async fn close_ghost(&self, intent: TradeIntent) {
        tracing::warn!(
            token_id = %intent.token.token_id,
            size = %intent.size,
            "Closing ghost position"
        );
        if let Err(e) = self
            .orders
            .cancel_token_orders(&intent.token.token_id)
            .await
        {
            tracing::warn!(token_id = %intent.token.token_id, error = %e, "Cancel failed");
        }
        if let Some(ChaseOutcome::Filled { .. }) = self.run_chase(&intent).await {
            bump_counter(CounterMetric::GhostsClosed);
        }
    }

    /// Overwrite the follower book with a REST snapshot
    pub async fn refresh_follower(&self) -> anyhow::Result<()> {
        let positions = self.data.positions(&self.follower_address).await?;
        let mut state = self.state.lock().await;
        state.follower.replace_positions(&positions);
        Ok(())
    }

    /// Refresh both equity readings and the follower's spendable collateral
    pub async fn refresh_equity(&self) -> anyhow::Result<()> {
        let follower_collateral = self.chain.collateral_balance(&self.follower_address).await?;
        let follower_value = self.data.portfolio_value(&self.follower_address).await?;
        let reference_collateral = self.chain.collateral_balance(&self.reference_address).await?;
        let reference_value = self.data.portfolio_value(&self.reference_address).await?;

        let follower_total = follower_collateral + follower_value;
        let reference_total = reference_collateral + reference_value;

        let mut state = self.state.lock().await;
        state.follower.collateral = follower_collateral;
        state.equity.set_follower(follower_total);
        state.equity.set_reference(reference_total);

        set_gauge(
            GaugeMetric::FollowerEquity,
            follower_total.to_f64().unwrap_or(0.0),
        );
        set_gauge(
            GaugeMetric::ReferenceEquity,
            reference_total.to_f64().unwrap_or(0.0),
        );
        if let Some(ratio) = state.equity.scale_ratio() {
            set_gauge(GaugeMetric::ScaleRatio, ratio.to_f64().unwrap_or(0.0));
            tracing::info!(
                follower = %follower_total,
                reference = %reference_total,
                %ratio,
                "Equity refreshed"
            );
        }
        Ok(())
    }

    /// Shadow net shares for a token, for tests and diagnostics
    pub async fn shadow_net_shares(&self, token_id: &str) -> Decimal {
        self.state.lock().await.ledger.net_shares(token_id)
    }

    /// Follower shares for a token, for tests and diagnostics
    pub async fn follower_shares(&self, token_id: &str) -> Decimal {
        self.state.lock().await.follower.shares(token_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ChaseConfig, OrderRequest, Placement};
    use crate::market::{GammaClient, MarketCache};
    use crate::portfolio::AccountPosition;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    const TOKEN: &str = "111";
    const REFERENCE: &str = "0xref";
    const FOLLOWER: &str = "0xfol";

    /// Always fills; records every request
    #[derive(Default)]
    struct MockOrders {
        requests: StdMutex<Vec<OrderRequest>>,
        cancels: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl OrderClient for MockOrders {
        async fn post_order(&self, order: &OrderRequest) -> anyhow::Result<Placement> {
            self.requests.lock().unwrap().push(order.clone());
            Ok(Placement::Filled {
                order_id: "oid".to_string(),
            })
        }

        async fn cancel_token_orders(&self, token_id: &str) -> anyhow::Result<()> {
            self.cancels.lock().unwrap().push(token_id.to_string());
            Ok(())
        }
    }

    /// Positions and values keyed by address
    #[derive(Default)]
    struct MockData {
        positions: StdMutex<HashMap<String, Vec<AccountPosition>>>,
        values: StdMutex<HashMap<String, Decimal>>,
    }

    impl MockData {
        fn set_positions(&self, address: &str, positions: Vec<AccountPosition>) {
            self.positions
                .lock()
                .unwrap()
                .insert(address.to_string(), positions);
        }

        fn set_value(&self, address: &str, value: Decimal) {
            self.values
                .lock()
                .unwrap()
                .insert(address.to_string(), value);
        }
    }

    #[async_trait]
    impl AccountDataSource for MockData {
        async fn positions(&self, address: &str) -> anyhow::Result<Vec<AccountPosition>> {
            Ok(self
                .positions
                .lock()
                .unwrap()
                .get(address)
                .cloned()
                .unwrap_or_default())
        }

        async fn portfolio_value(&self, address: &str) -> anyhow::Result<Decimal> {
            Ok(self
                .values
                .lock()
                .unwrap()
                .get(address)
                .copied()
                .unwrap_or(Decimal::ZERO))
        }
    }

    #[derive(Default)]
    struct MockChain {
        balances: StdMutex<HashMap<String, Decimal>>,
    }

    impl MockChain {
        fn set_balance(&self, address: &str, balance: Decimal) {
            self.balances
                .lock()
                .unwrap()
                .insert(address.to_string(), balance);
        }
    }

    #[async_trait]
    impl ChainClient for MockChain {
        async fn collateral_balance(&self, address: &str) -> anyhow::Result<Decimal> {
            Ok(self
                .balances
                .lock()
                .unwrap()
                .get(address)
                .copied()
                .unwrap_or(Decimal::ZERO))
        }

        async fn redeem(
            &self,
            _request: &crate::chain::RedemptionRequest,
        ) -> anyhow::Result<String> {
            Ok("0xtx".to_string())
        }
    }

    struct Rig {
        replicator: Replicator,
        orders: Arc<MockOrders>,
        data: Arc<MockData>,
        chain: Arc<MockChain>,
        prices: Arc<PriceBook>,
    }

    fn outcome_token(token_id: &str, condition_id: &str) -> OutcomeToken {
        OutcomeToken {
            token_id: token_id.to_string(),
            condition_id: condition_id.to_string(),
            market_title: "Bitcoin Up or Down".to_string(),
            outcome_label: "Up".to_string(),
            opposite_token_id: None,
            tick_size: dec!(0.01),
            neg_risk: false,
        }
    }

    fn position(asset: &str, size: Decimal, avg_price: Decimal) -> AccountPosition {
        AccountPosition {
            asset: asset.to_string(),
            size,
            avg_price,
            current_value: size * avg_price,
            title: String::new(),
            outcome: "Up".to_string(),
        }
    }

    fn signal(side: Side, shares: Decimal, price: Decimal) -> TradeSignal {
        TradeSignal {
            token_id: TOKEN.to_string(),
            side,
            shares,
            price,
            tx_hash: "0xtx".to_string(),
            observed_at: chrono::Utc::now(),
        }
    }

    async fn rig() -> Rig {
        let cache = Arc::new(MarketCache::new());
        cache
            .insert_market(vec![outcome_token(TOKEN, "0xc1")])
            .await;
        let gamma = Arc::new(GammaClient::with_config(Default::default()).unwrap());
        let resolver = Arc::new(MarketResolver::new(cache, gamma));

        let orders = Arc::new(MockOrders::default());
        let data = Arc::new(MockData::default());
        let chain = Arc::new(MockChain::default());
        let prices = Arc::new(PriceBook::new());

        let chase = ChaseExecutor::new(ChaseConfig {
            max_attempts: 3,
            ladder: vec![dec!(0.02), dec!(0.05), dec!(0.10)],
            price_floor: dec!(0.02),
            price_ceiling: dec!(0.98),
            collateral_utilization: dec!(0.98),
            retry_pause: Duration::from_millis(1),
        });

        let replicator = Replicator::new(
            ReplicationConfig::default(),
            chase,
            resolver,
            prices.clone(),
            orders.clone(),
            data.clone(),
            chain.clone(),
            &AccountsConfig {
                reference_address: REFERENCE.to_string(),
                follower_address: FOLLOWER.to_string(),
                operator_address: "0xop".to_string(),
            },
        );

        Rig {
            replicator,
            orders,
            data,
            chain,
            prices,
        }
    }

    /// follower $500, reference $20,000: ratio 0.025
    async fn with_equity(rig: &Rig) {
        rig.chain.set_balance(FOLLOWER, dec!(500));
        rig.data.set_value(REFERENCE, dec!(20000));
        rig.replicator.refresh_equity().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_trigger_below_dollar_threshold() {
        // Scenario: ratio 0.025, reference net 60 -> target 1.5 shares;
        // 1.5 * $0.50 = $0.75 < $1.10 and 1.5 < 5 shares: nothing fires
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        rig.replicator
            .on_fill(signal(Side::Buy, dec!(60), dec!(0.50)))
            .await;

        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, dec!(60));
        assert!(rig.orders.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trigger_fires_buy_above_both_thresholds() {
        // Reference net 260 -> target 6.5; 6.5 >= 5 and 6.5*0.50 >= 1.10
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        rig.replicator
            .on_fill(signal(Side::Buy, dec!(260), dec!(0.50)))
            .await;

        let requests = rig.orders.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].side, Side::Buy);
        assert_eq!(requests[0].size, dec!(6)); // floor(6.5)
        drop(requests);
        assert_eq!(rig.replicator.follower_shares(TOKEN).await, dec!(6));
    }

    #[tokio::test]
    async fn test_large_share_drift_with_tiny_price_does_not_trigger() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.002)).await;

        // Target 25 shares at $0.002 is only $0.05 of drift
        rig.replicator
            .on_fill(signal(Side::Buy, dec!(1000), dec!(0.002)))
            .await;

        assert!(rig.orders.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_trigger_without_equity_readings() {
        let rig = rig().await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        rig.replicator
            .on_fill(signal(Side::Buy, dec!(1000), dec!(0.50)))
            .await;

        // Ledger tracks the fill but no ratio means no sizing
        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, dec!(1000));
        assert!(rig.orders.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blacklisted_fill_is_ignored() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.data
            .set_positions(REFERENCE, vec![position(TOKEN, dec!(100), dec!(0.50))]);
        rig.replicator.init_blacklist().await.unwrap();

        rig.replicator
            .on_fill(signal(Side::Buy, dec!(260), dec!(0.50)))
            .await;

        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, Decimal::ZERO);
        assert!(rig.orders.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reference_sell_triggers_follower_sell() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        // Build up: net 400 -> target 10, follower buys 10
        rig.replicator
            .on_fill(signal(Side::Buy, dec!(400), dec!(0.50)))
            .await;
        assert_eq!(rig.replicator.follower_shares(TOKEN).await, dec!(10));

        // Reference exits: target 0, follower unwinds the whole holding
        rig.replicator
            .on_fill(signal(Side::Sell, dec!(400), dec!(0.60)))
            .await;

        let requests = rig.orders.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].side, Side::Sell);
        assert_eq!(requests[1].size, dec!(10));
        drop(requests);
        assert_eq!(rig.replicator.follower_shares(TOKEN).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reconcile_heals_drift_and_orders_once() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        // Shadow ledger saw nothing, but the reference holds 400 shares
        rig.data
            .set_positions(REFERENCE, vec![position(TOKEN, dec!(400), dec!(0.50))]);

        rig.replicator.reconcile().await.unwrap();
        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, dec!(400));
        assert_eq!(rig.orders.requests.lock().unwrap().len(), 1);
        assert_eq!(rig.replicator.follower_shares(TOKEN).await, dec!(10));

        // Second run with unchanged REST data is a no-op
        rig.replicator.reconcile().await.unwrap();
        assert_eq!(rig.orders.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_flattens_stale_shadow_entries() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        rig.replicator
            .on_fill(signal(Side::Buy, dec!(60), dec!(0.50)))
            .await;
        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, dec!(60));

        // Reference snapshot no longer lists the token
        rig.data.set_positions(REFERENCE, vec![]);
        rig.replicator.reconcile().await.unwrap();

        assert_eq!(rig.replicator.shadow_net_shares(TOKEN).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_reconcile_closes_ghost_positions() {
        let rig = rig().await;
        with_equity(&rig).await;
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        // Follower holds 10 shares the reference does not
        rig.data
            .set_positions(FOLLOWER, vec![position(TOKEN, dec!(10), dec!(0.50))]);
        rig.replicator.refresh_follower().await.unwrap();
        rig.data.set_positions(REFERENCE, vec![]);

        rig.replicator.reconcile().await.unwrap();

        assert_eq!(rig.orders.cancels.lock().unwrap().as_slice(), [TOKEN]);
        let requests = rig.orders.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].side, Side::Sell);
        assert_eq!(requests[0].size, dec!(10));
        drop(requests);
        assert_eq!(rig.replicator.follower_shares(TOKEN).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_buy_never_exceeds_tracked_collateral() {
        let rig = rig().await;
        // Tiny follower: $10 collateral against a $20,000 reference
        rig.chain.set_balance(FOLLOWER, dec!(10));
        rig.data.set_value(REFERENCE, dec!(20000));
        rig.replicator.refresh_equity().await.unwrap();
        rig.prices.observe(TOKEN, dec!(0.50)).await;

        // Target would be 50 shares ($25), far beyond the $10 on hand
        rig.replicator
            .on_fill(signal(Side::Buy, dec!(100000), dec!(0.50)))
            .await;

        let requests = rig.orders.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].size * requests[0].price <= dec!(10));
    }
}
