//! Shadow ledger of the reference trader's positions
//!
//! The ledger is rebuilt from the fill stream: it tracks signed net shares
//! and a weighted-average entry price per token. Reductions release cost in
//! proportion to the shares sold so the average entry price is preserved,
//! which keeps realized PnL out of the cost basis.

mod blacklist;

pub use blacklist::Blacklist;

use rust_decimal::Decimal;
use std::collections::HashMap;

/// Cost-basis state for one token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowPosition {
    /// Signed net shares; positive is long
    pub net_shares: Decimal,
    /// Cost attributed to the open position, always non-negative
    pub total_cost: Decimal,
    /// Weighted-average entry price, zero when flat
    pub avg_entry: Decimal,
}

impl ShadowPosition {
    const FLAT: ShadowPosition = ShadowPosition {
        net_shares: Decimal::ZERO,
        total_cost: Decimal::ZERO,
        avg_entry: Decimal::ZERO,
    };
}

/// Token-id keyed shadow ledger
pub struct ShadowLedger {
    positions: HashMap<String, ShadowPosition>,
    /// Positions with |net shares| below this clamp to flat
    dust_epsilon: Decimal,
}

impl ShadowLedger {
    pub fn new(dust_epsilon: Decimal) -> Self {
        Self {
            positions: HashMap::new(),
            dust_epsilon,
        }
    }

    /// Current position for a token, flat if never traded
    pub fn position(&self, token_id: &str) -> ShadowPosition {
        self.positions
            .get(token_id)
            .copied()
            .unwrap_or(ShadowPosition::FLAT)
    }

    /// Signed net shares for a token
    pub fn net_shares(&self, token_id: &str) -> Decimal {
        self.position(token_id).net_shares
    }

    /// Token ids with a non-flat position
    pub fn open_tokens(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Apply one observed fill: `shares_delta` is signed (buys positive) and
    /// `price` is the execution price. Returns the position after the fill.
    pub fn apply(&mut self, token_id: &str, shares_delta: Decimal, price: Decimal) -> ShadowPosition {
        let before = self.position(token_id);
        let after_shares = before.net_shares + shares_delta;

        let same_direction = before.net_shares.is_zero()
            || (before.net_shares.is_sign_positive() == shares_delta.is_sign_positive());

        let total_cost = if same_direction {
            // Opening or adding: cost accrues at the fill price
            before.total_cost + shares_delta.abs() * price
        } else if after_shares.is_zero()
            || (after_shares.is_sign_positive() == before.net_shares.is_sign_positive())
        {
            // Reducing: release cost pro rata so avg entry is unchanged
            if before.net_shares.is_zero() {
                Decimal::ZERO
            } else {
                before.total_cost * (after_shares.abs() / before.net_shares.abs())
            }
        } else {
            // Crossed through flat: remainder opens at the fill price
            after_shares.abs() * price
        };

        let position = self.normalize(after_shares, total_cost);
        self.store(token_id, position);
        position
    }

    /// Overwrite a token's position with REST truth. `avg_price` of `None`
    /// keeps the existing average when one exists.
    pub fn overwrite(&mut self, token_id: &str, net_shares: Decimal, avg_price: Option<Decimal>) {
        let avg = avg_price.unwrap_or_else(|| self.position(token_id).avg_entry);
        let position = self.normalize(net_shares, net_shares.abs() * avg);
        self.store(token_id, position);
    }

    fn normalize(&self, net_shares: Decimal, total_cost: Decimal) -> ShadowPosition {
        if net_shares.abs() < self.dust_epsilon {
            return ShadowPosition::FLAT;
        }
        let total_cost = total_cost.max(Decimal::ZERO);
        ShadowPosition {
            net_shares,
            total_cost,
            avg_entry: total_cost / net_shares.abs(),
        }
    }

    fn store(&mut self, token_id: &str, position: ShadowPosition) {
        if position.net_shares.is_zero() {
            self.positions.remove(token_id);
        } else {
            self.positions.insert(token_id.to_string(), position);
        }
    }
}
