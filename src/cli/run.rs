//! Run command implementation
//!
//! Wires the runtime together: market discovery, the startup blacklist, the
//! fill listener, the price feed, and the independent maintenance timers.
//! Startup order matters in one place: the blacklist snapshot is taken
//! before the fill listener attaches, so a pre-existing position can never
//! be mistaken for a fresh entry.

use crate::chain::{ChainClient, RpcChainClient};
use crate::config::Config;
use crate::execution::{ChaseConfig, ChaseExecutor, ClobHttpClient, OrderClient};
use crate::listener::FillListener;
use crate::market::{GammaClient, GammaConfig, MarketCache, MarketResolver};
use crate::portfolio::{AccountDataSource, DataApiClient};
use crate::prices::{PriceBook, PriceFeed};
use crate::redemption::RedemptionSweeper;
use crate::replicate::Replicator;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Skip the startup market prefetch (markets resolve just-in-time)
    #[arg(long)]
    pub no_prefetch: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let accounts = config.accounts.clone();

        let gamma = Arc::new(GammaClient::with_config(GammaConfig {
            base_url: config.markets.gamma_api_url.clone(),
            timeout: Duration::from_secs(10),
            search_terms: config.markets.search_terms.clone(),
            prefetch_limit: config.markets.prefetch_limit,
        })?);
        let cache = Arc::new(MarketCache::new());
        let resolver = Arc::new(MarketResolver::new(cache.clone(), gamma.clone()));

        let prices = Arc::new(PriceBook::new());
        let orders: Arc<dyn OrderClient> = Arc::new(ClobHttpClient::new(&config.execution)?);
        let data: Arc<dyn AccountDataSource> =
            Arc::new(DataApiClient::new(&config.markets.data_api_url)?);
        let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(
            config.chain.rpc_url.clone(),
            config.chain.usdc_address.clone(),
            config.chain.ctf_address.clone(),
            accounts.operator_address.clone(),
        )?);

        let chase = ChaseExecutor::new(ChaseConfig::from(&config.execution));
        let replicator = Arc::new(Replicator::new(
            config.replication.clone(),
            chase,
            resolver.clone(),
            prices.clone(),
            orders.clone(),
            data.clone(),
            chain.clone(),
            &accounts,
        ));
        let sweeper = RedemptionSweeper::new(
            data.clone(),
            gamma.clone(),
            chain.clone(),
            accounts.follower_address.clone(),
        );

        // New tokens flow from the resolver to the price stream
        let (subscribe_tx, subscribe_rx) = mpsc::channel(64);
        resolver.set_price_subscriber(subscribe_tx).await;

        if !self.no_prefetch {
            if let Err(e) = resolver.scan_markets().await {
                tracing::warn!(error = %e, "Initial market scan failed");
            }
        }

        // Blacklist before the listener attaches
        replicator.init_blacklist().await?;

        if let Err(e) = replicator.refresh_equity().await {
            tracing::warn!(error = %e, "Initial equity refresh failed");
        }
        if let Err(e) = replicator.refresh_follower().await {
            tracing::warn!(error = %e, "Initial follower refresh failed");
        }

        let feed = PriceFeed::new(config.markets.clob_ws_url.clone(), prices.clone(), cache);
        tokio::spawn(feed.run(subscribe_rx));

        let (signal_tx, mut signal_rx) = mpsc::channel(1024);
        let listener = FillListener::new(
            config.chain.ws_url.clone(),
            accounts.reference_address.clone(),
            config.chain.exchange_addresses.clone(),
            resolver.clone(),
            prices.clone(),
            config.replication.dust_epsilon,
        );
        tokio::spawn(listener.run(signal_tx));

        {
            let replicator = replicator.clone();
            tokio::spawn(async move {
                while let Some(signal) = signal_rx.recv().await {
                    replicator.on_fill(signal).await;
                }
            });
        }

        tracing::info!(
            reference = %accounts.reference_address,
            follower = %accounts.follower_address,
            "Replication engine running"
        );

        let mut scan_timer = interval(Duration::from_secs(config.schedule.market_scan_secs));
        let mut follower_timer =
            interval(Duration::from_secs(config.schedule.follower_refresh_secs));
        let mut equity_timer = interval(Duration::from_secs(config.schedule.equity_refresh_secs));
        let mut reconcile_timer = interval(Duration::from_secs(config.schedule.reconcile_secs));
        let mut redeem_timer = interval(Duration::from_secs(config.schedule.redeem_secs));

        loop {
            tokio::select! {
                _ = scan_timer.tick() => {
                    if let Err(e) = resolver.scan_markets().await {
                        tracing::warn!(error = %e, "Market scan failed");
                    }
                }
                _ = follower_timer.tick() => {
                    if let Err(e) = replicator.refresh_follower().await {
                        tracing::warn!(error = %e, "Follower refresh failed");
                    }
                }
                _ = equity_timer.tick() => {
                    if let Err(e) = replicator.refresh_equity().await {
                        tracing::warn!(error = %e, "Equity refresh failed");
                    }
                }
                _ = reconcile_timer.tick() => {
                    if let Err(e) = replicator.reconcile().await {
                        tracing::warn!(error = %e, "Reconciliation failed");
                    }
                }
                _ = redeem_timer.tick() => {
                    match sweeper.sweep().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(redemptions = n, "Redemption sweep done"),
                        Err(e) => tracing::warn!(error = %e, "Redemption sweep failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutting down");
                    return Ok(());
                }
            }
        }
    }
}
