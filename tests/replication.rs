//! End-to-end replication flow against mocked venue, data API, and chain

use async_trait::async_trait;
use poly_mirror::chain::{ChainClient, RedemptionRequest};
use poly_mirror::config::{AccountsConfig, ReplicationConfig};
use poly_mirror::execution::{
    ChaseConfig, ChaseExecutor, OrderClient, OrderRequest, Placement, Side,
};
use poly_mirror::listener::TradeSignal;
use poly_mirror::market::{GammaClient, GammaConfig, MarketCache, MarketResolver, OutcomeToken};
use poly_mirror::portfolio::{AccountDataSource, AccountPosition};
use poly_mirror::prices::PriceBook;
use poly_mirror::replicate::Replicator;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "111222333";
const REFERENCE: &str = "0xref";
const FOLLOWER: &str = "0xfol";

#[derive(Default)]
struct VenueMock {
    requests: Mutex<Vec<OrderRequest>>,
    cancels: Mutex<Vec<String>>,
}

#[async_trait]
impl OrderClient for VenueMock {
    async fn post_order(&self, order: &OrderRequest) -> anyhow::Result<Placement> {
        self.requests.lock().unwrap().push(order.clone());
        Ok(Placement::Filled {
            order_id: format!("oid-{}", self.requests.lock().unwrap().len()),
        })
    }

    async fn cancel_token_orders(&self, token_id: &str) -> anyhow::Result<()> {
        self.cancels.lock().unwrap().push(token_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct DataMock {
    positions: Mutex<HashMap<String, Vec<AccountPosition>>>,
    values: Mutex<HashMap<String, Decimal>>,
}

#[async_trait]
impl AccountDataSource for DataMock {
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
struct ChainMock {
    balances: Mutex<HashMap<String, Decimal>>,
}

#[async_trait]
impl ChainClient for ChainMock {
    async fn collateral_balance(&self, address: &str) -> anyhow::Result<Decimal> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(Decimal::ZERO))
    }

    async fn redeem(&self, _request: &RedemptionRequest) -> anyhow::Result<String> {
        Ok("0xtx".to_string())
    }
}

struct Harness {
    replicator: Replicator,
    venue: Arc<VenueMock>,
    data: Arc<DataMock>,
    prices: Arc<PriceBook>,
}

async fn harness() -> Harness {
    let cache = Arc::new(MarketCache::new());
    cache
        .insert_market(vec![OutcomeToken {
            token_id: TOKEN.to_string(),
            condition_id: "0xc1".to_string(),
            market_title: "Bitcoin Up or Down on August 23?".to_string(),
            outcome_label: "Up".to_string(),
            opposite_token_id: None,
            tick_size: dec!(0.01),
            neg_risk: false,
        }])
        .await;
    let gamma = Arc::new(GammaClient::with_config(GammaConfig::default()).unwrap());
    let resolver = Arc::new(MarketResolver::new(cache, gamma));

    let venue = Arc::new(VenueMock::default());
    let data = Arc::new(DataMock::default());
    let chain = Arc::new(ChainMock::default());
    let prices = Arc::new(PriceBook::new());

    // follower $500 against a $20,000 reference: ratio 0.025
    chain
        .balances
        .lock()
        .unwrap()
        .insert(FOLLOWER.to_string(), dec!(500));
    data.values
        .lock()
        .unwrap()
        .insert(REFERENCE.to_string(), dec!(20000));

    let replicator = Replicator::new(
        ReplicationConfig::default(),
        ChaseExecutor::new(ChaseConfig {
            max_attempts: 3,
            ladder: vec![dec!(0.02), dec!(0.05), dec!(0.10)],
            price_floor: dec!(0.02),
            price_ceiling: dec!(0.98),
            collateral_utilization: dec!(0.98),
            retry_pause: Duration::from_millis(1),
        }),
        resolver,
        prices.clone(),
        venue.clone(),
        data.clone(),
        chain,
        &AccountsConfig {
            reference_address: REFERENCE.to_string(),
            follower_address: FOLLOWER.to_string(),
            operator_address: "0xop".to_string(),
        },
    );
    replicator.refresh_equity().await.unwrap();

    Harness {
        replicator,
        venue,
        data,
        prices,
    }
}

fn fill(side: Side, shares: Decimal, price: Decimal) -> TradeSignal {
    TradeSignal {
        token_id: TOKEN.to_string(),
        side,
        shares,
        price,
        tx_hash: "0xdeadbeef".to_string(),
        observed_at: chrono::Utc::now(),
    }
}

fn rest_position(size: Decimal) -> AccountPosition {
    serde_json::from_value(serde_json::json!({
        "asset": TOKEN,
        "size": size,
        "avgPrice": 0.50,
        "currentValue": size * dec!(0.50),
        "title": "Bitcoin Up or Down on August 23?",
        "outcome": "Up"
    }))
    .unwrap()
}

#[tokio::test]
async fn follower_mirrors_a_reference_round_trip() {
    let h = harness().await;
    h.prices.observe(TOKEN, dec!(0.50)).await;

    // Small reference entry stays under the thresholds
    h.replicator.on_fill(fill(Side::Buy, dec!(60), dec!(0.50))).await;
    assert!(h.venue.requests.lock().unwrap().is_empty());

    // Position grows past both thresholds: the follower buys
    h.replicator.on_fill(fill(Side::Buy, dec!(340), dec!(0.52))).await;
    {
        let requests = h.venue.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].side, Side::Buy);
        assert_eq!(requests[0].size, dec!(10)); // 400 * 0.025
    }
    assert_eq!(h.replicator.follower_shares(TOKEN).await, dec!(10));

    // Reference exits, follower unwinds
    h.replicator.on_fill(fill(Side::Sell, dec!(400), dec!(0.60))).await;
    {
        let requests = h.venue.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].side, Side::Sell);
        assert_eq!(requests[1].size, dec!(10));
    }
    assert_eq!(h.replicator.follower_shares(TOKEN).await, Decimal::ZERO);
    assert_eq!(h.replicator.shadow_net_shares(TOKEN).await, Decimal::ZERO);
}

#[tokio::test]
async fn reconciler_heals_a_missed_entry_exactly_once() {
    let h = harness().await;
    h.prices.observe(TOKEN, dec!(0.50)).await;

    // The fill stream missed an entry; REST sees 400 shares
    h.data
        .positions
        .lock()
        .unwrap()
        .insert(REFERENCE.to_string(), vec![rest_position(dec!(400))]);

    h.replicator.reconcile().await.unwrap();
    assert_eq!(h.replicator.shadow_net_shares(TOKEN).await, dec!(400));
    assert_eq!(h.venue.requests.lock().unwrap().len(), 1);

    // Unchanged REST data: nothing new fires
    h.replicator.reconcile().await.unwrap();
    h.replicator.reconcile().await.unwrap();
    assert_eq!(h.venue.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn reconciler_force_closes_ghost_holdings() {
    let h = harness().await;
    h.prices.observe(TOKEN, dec!(0.50)).await;

    // Follower holds shares the reference does not
    h.data
        .positions
        .lock()
        .unwrap()
        .insert(FOLLOWER.to_string(), vec![rest_position(dec!(12))]);
    h.replicator.refresh_follower().await.unwrap();

    h.replicator.reconcile().await.unwrap();

    assert_eq!(h.venue.cancels.lock().unwrap().as_slice(), [TOKEN]);
    let requests = h.venue.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].side, Side::Sell);
    assert_eq!(requests[0].size, dec!(12));
}

#[tokio::test]
async fn pre_existing_positions_are_never_replicated() {
    let h = harness().await;
    h.prices.observe(TOKEN, dec!(0.50)).await;

    h.data
        .positions
        .lock()
        .unwrap()
        .insert(REFERENCE.to_string(), vec![rest_position(dec!(5000))]);
    h.replicator.init_blacklist().await.unwrap();

    // Neither live fills nor reconciliation may touch the token
    h.replicator.on_fill(fill(Side::Buy, dec!(400), dec!(0.50))).await;
    h.replicator.reconcile().await.unwrap();

    assert_eq!(h.replicator.shadow_net_shares(TOKEN).await, Decimal::ZERO);
    assert!(h.venue.requests.lock().unwrap().is_empty());
}
