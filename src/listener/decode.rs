//! OrderFilled log decoding
//!
//! The exchange contracts emit `OrderFilled(bytes32 indexed orderHash,
//! address indexed maker, address indexed taker, uint256 makerAssetId,
//! uint256 takerAssetId, uint256 makerAmountFilled, uint256
//! takerAmountFilled, uint256 fee)`. Asset id 0 is the collateral leg;
//! amounts are 6-decimal fixed point.

use crate::execution::Side;
use alloy_primitives::{keccak256, U256};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::LazyLock;

/// topic0 of the OrderFilled event
pub static ORDER_FILLED_TOPIC: LazyLock<String> = LazyLock::new(|| {
    let hash = keccak256(
        b"OrderFilled(bytes32,address,address,uint256,uint256,uint256,uint256,uint256)",
    );
    format!("0x{}", hex::encode(hash))
});

/// Raw log from an `eth_subscription` notification
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Decoded OrderFilled event with addresses lowercased and amounts scaled
/// to natural units
#[derive(Debug, Clone, PartialEq)]
pub struct OrderFilledEvent {
    pub maker: String,
    pub taker: String,
    /// Decimal-string asset ids; "0" is the collateral leg
    pub maker_asset_id: String,
    pub taker_asset_id: String,
    pub maker_amount: Decimal,
    pub taker_amount: Decimal,
}

/// One reference trade extracted from a fill
#[derive(Debug, Clone)]
pub struct TradeSignal {
    pub token_id: String,
    pub side: Side,
    pub shares: Decimal,
    pub price: Decimal,
    pub tx_hash: String,
    /// When the log was seen, not when the block was mined
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

/// Decode an OrderFilled log. Returns `None` for logs that are not
/// OrderFilled or that fail structural validation.
pub fn decode_order_filled(log: &RawLog) -> Option<OrderFilledEvent> {
    if log.topics.len() != 4 || !log.topics[0].eq_ignore_ascii_case(&ORDER_FILLED_TOPIC) {
        return None;
    }

    let maker = address_from_topic(&log.topics[2])?;
    let taker = address_from_topic(&log.topics[3])?;

    let data = log.data.strip_prefix("0x").unwrap_or(&log.data);
    // makerAssetId, takerAssetId, makerAmountFilled, takerAmountFilled, fee
    if data.len() < 5 * 64 {
        return None;
    }

    let word = |i: usize| U256::from_str_radix(&data[i * 64..(i + 1) * 64], 16).ok();
    let maker_asset_id = word(0)?;
    let taker_asset_id = word(1)?;
    let maker_amount = amount_from_word(word(2)?)?;
    let taker_amount = amount_from_word(word(3)?)?;

    Some(OrderFilledEvent {
        maker,
        taker,
        maker_asset_id: maker_asset_id.to_string(),
        taker_asset_id: taker_asset_id.to_string(),
        maker_amount,
        taker_amount,
    })
}

/// Attribute a fill to the reference trader against a known risk leg.
///
/// The four quadrants: the reference is maker or taker, and on each side the
/// risk token may sit on the maker or the taker leg. Returns `None` when the
/// reference is not involved or the risk leg is not part of this fill.
pub fn attribute_fill(
    event: &OrderFilledEvent,
    reference: &str,
    risk_token_id: &str,
) -> Option<(Side, Decimal, Decimal)> {
    let (shares, usdc, side) = if event.maker == reference {
        if event.maker_asset_id == risk_token_id {
            (event.maker_amount, event.taker_amount, Side::Sell)
        } else if event.taker_asset_id == risk_token_id {
            (event.taker_amount, event.maker_amount, Side::Buy)
        } else {
            return None;
        }
    } else if event.taker == reference {
        if event.taker_asset_id == risk_token_id {
            (event.taker_amount, event.maker_amount, Side::Sell)
        } else if event.maker_asset_id == risk_token_id {
            (event.maker_amount, event.taker_amount, Side::Buy)
        } else {
            return None;
        }
    } else {
        return None;
    };

    if shares.is_zero() {
        return None;
    }
    Some((side, shares, usdc / shares))
}

fn address_from_topic(topic: &str) -> Option<String> {
    let hex = topic.strip_prefix("0x").unwrap_or(topic);
    if hex.len() != 64 {
        return None;
    }
    Some(format!("0x{}", hex[24..].to_lowercase()))
}

fn amount_from_word(word: U256) -> Option<Decimal> {
    let raw: u128 = word.try_into().ok()?;
    Some(Decimal::from_i128_with_scale(raw as i128, 6))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const REFERENCE: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const OTHER: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const RISK: &str = "111222333";

    fn topic_for(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x"))
    }

    fn word_u128(value: u128) -> String {
        format!("{:064x}", value)
    }

    fn raw_log(maker: &str, taker: &str, words: [u128; 4]) -> RawLog {
        let mut data = String::from("0x");
        for w in words {
            data.push_str(&word_u128(w));
        }
        data.push_str(&word_u128(0)); // fee
        RawLog {
            address: "0x4bfb41d5b3570defd03c39a9a4d8de6bd8b8982e".to_string(),
            topics: vec![
                ORDER_FILLED_TOPIC.clone(),
                topic_for("0x1234"),
                topic_for(maker),
                topic_for(taker),
            ],
            data,
            transaction_hash: Some("0xtx".to_string()),
        }
    }

    #[test]
    fn test_topic_is_stable_hex() {
        assert!(ORDER_FILLED_TOPIC.starts_with("0x"));
        assert_eq!(ORDER_FILLED_TOPIC.len(), 66);
    }

    #[test]
    fn test_decode_scales_amounts() {
        // maker sells 100 shares of the risk token for 52 USDC
        let log = raw_log(REFERENCE, OTHER, [111222333, 0, 100_000_000, 52_000_000]);
        let event = decode_order_filled(&log).unwrap();

        assert_eq!(event.maker, REFERENCE);
        assert_eq!(event.taker, OTHER);
        assert_eq!(event.maker_asset_id, RISK);
        assert_eq!(event.taker_asset_id, "0");
        assert_eq!(event.maker_amount, dec!(100));
        assert_eq!(event.taker_amount, dec!(52));
    }

    #[test]
    fn test_decode_rejects_other_events() {
        let mut log = raw_log(REFERENCE, OTHER, [111222333, 0, 1_000_000, 1_000_000]);
        log.topics[0] = format!("0x{}", "ab".repeat(32));
        assert!(decode_order_filled(&log).is_none());
    }

    #[test]
    fn test_decode_rejects_short_data() {
        let mut log = raw_log(REFERENCE, OTHER, [111222333, 0, 1_000_000, 1_000_000]);
        log.data = "0x00".to_string();
        assert!(decode_order_filled(&log).is_none());
    }

    #[test]
    fn test_attribute_maker_sell() {
        let log = raw_log(REFERENCE, OTHER, [111222333, 0, 100_000_000, 52_000_000]);
        let event = decode_order_filled(&log).unwrap();

        let (side, shares, price) = attribute_fill(&event, REFERENCE, RISK).unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(shares, dec!(100));
        assert_eq!(price, dec!(0.52));
    }

    #[test]
    fn test_attribute_maker_buy() {
        // reference maker pays 52 USDC, receives 100 shares on the taker leg
        let log = raw_log(REFERENCE, OTHER, [0, 111222333, 52_000_000, 100_000_000]);
        let event = decode_order_filled(&log).unwrap();

        let (side, shares, price) = attribute_fill(&event, REFERENCE, RISK).unwrap();
        assert_eq!(side, Side::Buy);
        assert_eq!(shares, dec!(100));
        assert_eq!(price, dec!(0.52));
    }

    #[test]
    fn test_attribute_taker_buy() {
        // counterparty maker sells shares, reference taker pays USDC
        let log = raw_log(OTHER, REFERENCE, [111222333, 0, 40_000_000, 18_000_000]);
        let event = decode_order_filled(&log).unwrap();

        let (side, shares, price) = attribute_fill(&event, REFERENCE, RISK).unwrap();
        assert_eq!(side, Side::Buy);
        assert_eq!(shares, dec!(40));
        assert_eq!(price, dec!(0.45));
    }

    #[test]
    fn test_attribute_taker_sell() {
        let log = raw_log(OTHER, REFERENCE, [0, 111222333, 18_000_000, 40_000_000]);
        let event = decode_order_filled(&log).unwrap();

        let (side, shares, price) = attribute_fill(&event, REFERENCE, RISK).unwrap();
        assert_eq!(side, Side::Sell);
        assert_eq!(shares, dec!(40));
        assert_eq!(price, dec!(0.45));
    }

    #[test]
    fn test_attribute_skips_uninvolved_reference() {
        let log = raw_log(OTHER, OTHER, [111222333, 0, 1_000_000, 1_000_000]);
        let event = decode_order_filled(&log).unwrap();
        assert!(attribute_fill(&event, REFERENCE, RISK).is_none());
    }

    #[test]
    fn test_attribute_skips_foreign_risk_leg() {
        let log = raw_log(REFERENCE, OTHER, [999, 0, 1_000_000, 1_000_000]);
        let event = decode_order_filled(&log).unwrap();
        assert!(attribute_fill(&event, REFERENCE, RISK).is_none());
    }

    #[test]
    fn test_attribute_skips_zero_shares() {
        let log = raw_log(REFERENCE, OTHER, [111222333, 0, 0, 1_000_000]);
        let event = decode_order_filled(&log).unwrap();
        assert!(attribute_fill(&event, REFERENCE, RISK).is_none());
    }
}
