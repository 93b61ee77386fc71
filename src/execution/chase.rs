//! Bounded chase executor
//!
//! A fill-and-kill order that misses is retried at increasingly aggressive
//! limits along a fixed slippage ladder. Attempts are bounded; a trade that
//! survives every rung unfilled is abandoned and left to reconciliation.

use super::{OrderClient, OrderRequest, Placement, RejectClass, Side};
use crate::config::ExecutionConfig;
use crate::market::OutcomeToken;
use crate::telemetry::{bump_counter, CounterMetric};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::sleep;

/// Chase parameters, lifted out of [`ExecutionConfig`] so tests can build
/// them directly
#[derive(Debug, Clone)]
pub struct ChaseConfig {
    pub max_attempts: usize,
    /// Slippage buffer per attempt, ordered least to most aggressive
    pub ladder: Vec<Decimal>,
    pub price_floor: Decimal,
    pub price_ceiling: Decimal,
    /// Fraction of collateral spendable when scaling an unaffordable buy down
    pub collateral_utilization: Decimal,
    pub retry_pause: Duration,
}

impl From<&ExecutionConfig> for ChaseConfig {
    fn from(cfg: &ExecutionConfig) -> Self {
        Self {
            max_attempts: cfg.max_chase_attempts,
            ladder: cfg.slippage_ladder.clone(),
            price_floor: cfg.price_floor,
            price_ceiling: cfg.price_ceiling,
            collateral_utilization: cfg.collateral_utilization,
            retry_pause: Duration::from_millis(cfg.retry_pause_ms),
        }
    }
}

/// Account state snapshotted before the chase starts
#[derive(Debug, Clone, Copy)]
pub struct Preflight {
    /// Tracked collateral available to spend
    pub collateral: Decimal,
    /// Shares of the token currently held
    pub owned_shares: Decimal,
}

/// Terminal result of one chase
#[derive(Debug, Clone)]
pub enum ChaseOutcome {
    /// An attempt filled at `price` for `size` shares
    Filled {
        side: Side,
        size: Decimal,
        price: Decimal,
        order_id: String,
    },
    /// Every attempt was killed; reconciliation retries later if the drift
    /// persists
    Exhausted,
    /// Nothing tradable after pre-flight sizing
    Aborted,
    /// Market resolved mid-chase; handed off to the redemption sweeper
    Deferred,
    /// Transport or venue failure; order state unknown, chase stopped
    Failed(String),
}

pub struct ChaseExecutor {
    config: ChaseConfig,
}

impl ChaseExecutor {
    pub fn new(config: ChaseConfig) -> Self {
        Self { config }
    }

    /// Run the chase: pre-flight sizing, then bounded FAK attempts
    pub async fn execute(
        &self,
        orders: &dyn OrderClient,
        token: &OutcomeToken,
        side: Side,
        desired_size: Decimal,
        base_price: Decimal,
        preflight: Preflight,
    ) -> ChaseOutcome {
        let Some(size) = self.preflight_size(side, desired_size, base_price, preflight) else {
            tracing::debug!(
                token_id = %token.token_id,
                ?side,
                %desired_size,
                "Chase aborted in pre-flight"
            );
            return ChaseOutcome::Aborted;
        };

        for attempt in 0..self.config.max_attempts {
            let limit = self.limit_price(side, base_price, attempt, token.tick_size);
            let request = OrderRequest {
                token_id: token.token_id.clone(),
                price: limit,
                side,
                size,
                tick_size: token.tick_size,
                neg_risk: token.neg_risk,
            };

            tracing::info!(
                token_id = %token.token_id,
                market = %token.market_title,
                outcome = %token.outcome_label,
                ?side,
                %size,
                %limit,
                attempt = attempt + 1,
                "Placing FAK order"
            );

            match orders.post_order(&request).await {
                Ok(Placement::Filled { order_id }) => {
                    bump_counter(CounterMetric::OrdersFilled);
                    tracing::info!(
                        token_id = %token.token_id,
                        %order_id,
                        %size,
                        %limit,
                        "Order filled"
                    );
                    return ChaseOutcome::Filled {
                        side,
                        size,
                        price: limit,
                        order_id,
                    };
                }
                Ok(Placement::Rejected { class, message }) => match class {
                    RejectClass::NoLiquidity => {
                        bump_counter(CounterMetric::OrdersKilled);
                        tracing::debug!(
                            token_id = %token.token_id,
                            attempt = attempt + 1,
                            %message,
                            "Order killed, chasing"
                        );
                        if attempt + 1 < self.config.max_attempts {
                            sleep(self.config.retry_pause).await;
                        }
                    }
                    RejectClass::MarketClosed => {
                        tracing::info!(
                            token_id = %token.token_id,
                            %message,
                            "Market closed mid-chase, deferring to redemption"
                        );
                        return ChaseOutcome::Deferred;
                    }
                    RejectClass::Other => {
                        tracing::warn!(
                            token_id = %token.token_id,
                            %message,
                            "Order rejected"
                        );
                        return ChaseOutcome::Failed(message);
                    }
                },
                // The order may or may not have landed; stop here and let
                // the position refresh and reconciler settle it.
                Err(e) => {
                    tracing::warn!(
                        token_id = %token.token_id,
                        error = %e,
                        "Order transport failed, abandoning chase"
                    );
                    return ChaseOutcome::Failed(e.to_string());
                }
            }
        }

        tracing::info!(
            token_id = %token.token_id,
            attempts = self.config.max_attempts,
            "Chase exhausted without a fill"
        );
        ChaseOutcome::Exhausted
    }

    /// Size the order against the snapshot: buys never exceed collateral at
    /// the worst-rung price, sells never exceed owned shares. Sizes are
    /// floored to whole shares.
    fn preflight_size(
        &self,
        side: Side,
        desired_size: Decimal,
        base_price: Decimal,
        preflight: Preflight,
    ) -> Option<Decimal> {
        let mut size = desired_size.abs();

        match side {
            Side::Buy => {
                // Worst case: the final rung fills at the most aggressive limit
                let worst = self.worst_case_buy_price(base_price);
                if worst <= Decimal::ZERO {
                    return None;
                }
                let cost = size * worst;
                if cost > preflight.collateral {
                    size = (preflight.collateral * self.config.collateral_utilization) / worst;
                }
            }
            Side::Sell => {
                size = size.min(preflight.owned_shares);
            }
        }

        size = size.floor();
        if size < Decimal::ONE {
            return None;
        }
        Some(size)
    }

    fn worst_case_buy_price(&self, base_price: Decimal) -> Decimal {
        let max_buffer = self.config.ladder.last().copied().unwrap_or(Decimal::ZERO);
        let worst = base_price * (Decimal::ONE + max_buffer);
        worst.min(self.config.price_ceiling)
    }

    /// Limit price for an attempt: base price pushed `ladder[attempt]` in the
    /// aggressive direction, clamped to the valid band, aligned to the tick
    fn limit_price(
        &self,
        side: Side,
        base_price: Decimal,
        attempt: usize,
        tick_size: Decimal,
    ) -> Decimal {
        let buffer = self
            .config
            .ladder
            .get(attempt)
            .or(self.config.ladder.last())
            .copied()
            .unwrap_or(Decimal::ZERO);

        let raw = match side {
            Side::Buy => base_price * (Decimal::ONE + buffer),
            Side::Sell => base_price * (Decimal::ONE - buffer),
        };

        let clamped = raw
            .max(self.config.price_floor)
            .min(self.config.price_ceiling);
        align_to_tick(clamped, tick_size)
            .max(self.config.price_floor)
            .min(self.config.price_ceiling)
    }
}

/// Round a price to the nearest multiple of the tick size
pub fn align_to_tick(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return price;
    }
    (price / tick_size).round() * tick_size
}
