//! Startup blacklist
//!
//! Tokens the reference trader already held before this process attached
//! have an unknowable entry history, so they are excluded from replication
//! for the process lifetime. Both token ids and condition ids are stored so
//! the opposite side of a blacklisted binary market is excluded too.

use crate::market::OutcomeToken;
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct Blacklist {
    ids: HashSet<String>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a token or condition id
    pub fn add(&mut self, id: impl Into<String>) {
        self.ids.insert(id.into());
    }

    /// Whether a raw id is blacklisted
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Whether a resolved token is excluded, by token id or by its market
    pub fn excludes(&self, token: &OutcomeToken) -> bool {
        self.ids.contains(&token.token_id) || self.ids.contains(&token.condition_id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn token(token_id: &str, condition_id: &str) -> OutcomeToken {
        OutcomeToken {
            token_id: token_id.to_string(),
            condition_id: condition_id.to_string(),
            market_title: "m".to_string(),
            outcome_label: "Up".to_string(),
            opposite_token_id: None,
            tick_size: dec!(0.01),
            neg_risk: false,
        }
    }

    #[test]
    fn test_excludes_by_token_id() {
        let mut blacklist = Blacklist::new();
        blacklist.add("111");
        assert!(blacklist.excludes(&token("111", "0xc1")));
        assert!(!blacklist.excludes(&token("222", "0xc2")));
    }

    #[test]
    fn test_excludes_whole_market_by_condition() {
        let mut blacklist = Blacklist::new();
        blacklist.add("0xc1");
        // Both sides of the market share the condition id
        assert!(blacklist.excludes(&token("111", "0xc1")));
        assert!(blacklist.excludes(&token("222", "0xc1")));
    }

    #[test]
    fn test_empty_blacklist_excludes_nothing() {
        let blacklist = Blacklist::new();
        assert!(blacklist.is_empty());
        assert!(!blacklist.excludes(&token("111", "0xc1")));
    }
}
