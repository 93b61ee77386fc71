//! Chain access
//!
//! JSON-RPC reads for collateral balances and redemption submission through
//! the conditional tokens contract. Transaction signing lives in the node
//! this client points at; the engine only builds calldata.

use async_trait::async_trait;
use alloy_primitives::{keccak256, U256};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// A redemption to submit for a resolved market
#[derive(Debug, Clone)]
pub struct RedemptionRequest {
    /// Condition id of the resolved market (0x-prefixed 32-byte hex)
    pub condition_id: String,
    /// Index of the outcome held by the follower
    pub outcome_index: usize,
}

/// Seam to the chain for balances and redemptions
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// USDC balance of an address, in dollars
    async fn collateral_balance(&self, address: &str) -> anyhow::Result<Decimal>;

    /// Submit `redeemPositions` for a resolved market; returns the tx hash
    async fn redeem(&self, request: &RedemptionRequest) -> anyhow::Result<String>;
}

/// JSON-RPC backed chain client
pub struct RpcChainClient {
    rpc_url: String,
    usdc_address: String,
    ctf_address: String,
    operator_address: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

impl RpcChainClient {
    pub fn new(
        rpc_url: impl Into<String>,
        usdc_address: impl Into<String>,
        ctf_address: impl Into<String>,
        operator_address: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            rpc_url: rpc_url.into(),
            usdc_address: usdc_address.into(),
            ctf_address: ctf_address.into(),
            operator_address: operator_address.into(),
            client,
        })
    }

    async fn call(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response: RpcResponse = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.error {
            anyhow::bail!("{} failed: {}", method, error.message);
        }
        response
            .result
            .ok_or_else(|| anyhow::anyhow!("{} returned no result", method))
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn collateral_balance(&self, address: &str) -> anyhow::Result<Decimal> {
        let data = balance_of_calldata(address)?;
        let result = self
            .call(
                "eth_call",
                json!([{ "to": self.usdc_address, "data": data }, "latest"]),
            )
            .await?;

        let hex = result
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("eth_call returned non-string result"))?;
        let raw = U256::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| anyhow::anyhow!("bad balance word: {}", e))?;
        let units: u128 = raw
            .try_into()
            .map_err(|_| anyhow::anyhow!("balance exceeds u128"))?;
        // USDC has 6 decimals
        Ok(Decimal::from_i128_with_scale(units as i128, 6))
    }

    async fn redeem(&self, request: &RedemptionRequest) -> anyhow::Result<String> {
        let data = redeem_calldata(&self.usdc_address, &request.condition_id, request.outcome_index)?;
        let result = self
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": self.operator_address,
                    "to": self.ctf_address,
                    "data": data,
                }]),
            )
            .await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("eth_sendTransaction returned non-string result"))
    }
}

fn selector(signature: &[u8]) -> String {
    hex::encode(&keccak256(signature)[..4])
}

fn word_from_hex(value: &str, label: &str) -> anyhow::Result<String> {
    let hex = value.trim_start_matches("0x");
    if hex.len() > 64 || hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("bad {}: {:?}", label, value);
    }
    Ok(format!("{:0>64}", hex.to_lowercase()))
}

/// Calldata for `balanceOf(address)`
pub fn balance_of_calldata(address: &str) -> anyhow::Result<String> {
    Ok(format!(
        "0x{}{}",
        selector(b"balanceOf(address)"),
        word_from_hex(address, "address")?
    ))
}

/// Calldata for `redeemPositions(address collateral, bytes32
/// parentCollectionId, bytes32 conditionId, uint256[] indexSets)` with a
/// single index set of `1 << outcome_index`
pub fn redeem_calldata(
    usdc_address: &str,
    condition_id: &str,
    outcome_index: usize,
) -> anyhow::Result<String> {
    if outcome_index >= 128 {
        anyhow::bail!("outcome index out of range: {}", outcome_index);
    }
    let index_set: u128 = 1 << outcome_index;

    let mut data = format!(
        "0x{}",
        selector(b"redeemPositions(address,bytes32,bytes32,uint256[])")
    );
    data.push_str(&word_from_hex(usdc_address, "collateral address")?);
    data.push_str(&"0".repeat(64)); // parentCollectionId = bytes32(0)
    data.push_str(&word_from_hex(condition_id, "condition id")?);
    data.push_str(&format!("{:064x}", 0x80)); // offset of the array
    data.push_str(&format!("{:064x}", 1)); // array length
    data.push_str(&format!("{:064x}", index_set));
    Ok(data)
}
