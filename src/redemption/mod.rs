//! Redemption sweeper
//!
//! Periodically walks the follower's open positions, checks each market for
//! a binary resolution, and submits `redeemPositions` for the winning
//! outcome index. Redemption is idempotent on-chain; once the balance is
//! exhausted a repeat call burns gas but cannot double-pay, so the sweeper
//! favors simplicity over dedup bookkeeping.

use crate::chain::{ChainClient, RedemptionRequest};
use crate::market::{GammaClient, MarketStatus};
use crate::portfolio::AccountDataSource;
use crate::telemetry::{bump_counter, CounterMetric};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Market resolution lookups, by token id
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, token_id: &str) -> anyhow::Result<Option<MarketStatus>>;
}

#[async_trait]
impl StatusSource for GammaClient {
    async fn fetch_status(&self, token_id: &str) -> anyhow::Result<Option<MarketStatus>> {
        GammaClient::fetch_status(self, token_id).await
    }
}

pub struct RedemptionSweeper {
    data: Arc<dyn AccountDataSource>,
    status: Arc<dyn StatusSource>,
    chain: Arc<dyn ChainClient>,
    follower_address: String,
}

impl RedemptionSweeper {
    pub fn new(
        data: Arc<dyn AccountDataSource>,
        status: Arc<dyn StatusSource>,
        chain: Arc<dyn ChainClient>,
        follower_address: String,
    ) -> Self {
        Self {
            data,
            status,
            chain,
            follower_address,
        }
    }

    /// One sweep over the follower's positions. Returns the number of
    /// redemptions submitted; per-position failures are logged and skipped.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let positions = self.data.positions(&self.follower_address).await?;
        let mut submitted = 0;

        for position in positions {
            if position.size <= Decimal::ZERO {
                continue;
            }

            let status = match self.status.fetch_status(&position.asset).await {
                Ok(Some(status)) => status,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(token_id = %position.asset, error = %e, "Status fetch failed");
                    continue;
                }
            };

            let Some(winner_index) = status.resolved_winner() else {
                continue;
            };

            let request = RedemptionRequest {
                condition_id: status.condition_id.clone(),
                outcome_index: winner_index,
            };

            match self.chain.redeem(&request).await {
                Ok(tx_hash) => {
                    submitted += 1;
                    bump_counter(CounterMetric::Redemptions);
                    tracing::info!(
                        market = %status.question,
                        outcome = %position.outcome,
                        size = %position.size,
                        %tx_hash,
                        "Redemption submitted"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        condition_id = %request.condition_id,
                        error = %e,
                        "Redemption failed"
                    );
                }
            }
        }

        Ok(submitted)
    }
}
