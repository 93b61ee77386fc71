//! HTTP client for the CLOB order endpoint
//!
//! Posts fill-and-kill orders and cancels resting orders. Request signing
//! happens inside the venue gateway this client talks to; from here the
//! contract is plain JSON plus the usual API-key headers.

use super::{classify_rejection, OrderClient, OrderRequest, Placement, Side};
use crate::config::ExecutionConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CLOB order gateway client
pub struct ClobHttpClient {
    host: String,
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct OrderBody<'a> {
    token_id: &'a str,
    price: String,
    side: &'a str,
    size: String,
    order_type: &'static str,
    neg_risk: bool,
}

#[derive(Debug, Serialize)]
struct CancelBody<'a> {
    asset_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "orderID")]
    order_id: Option<String>,
    #[serde(default, rename = "errorMsg")]
    error_msg: Option<String>,
}

impl ClobHttpClient {
    pub fn new(config: &ExecutionConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            host: config.clob_host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            api_passphrase: config.api_passphrase.clone(),
            client,
        })
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("POLY-API-KEY", &self.api_key)
            .header("POLY-API-SECRET", &self.api_secret)
            .header("POLY-API-PASSPHRASE", &self.api_passphrase)
    }
}

#[async_trait]
impl OrderClient for ClobHttpClient {
    async fn post_order(&self, order: &OrderRequest) -> anyhow::Result<Placement> {
        let url = format!("{}/order", self.host);
        let body = OrderBody {
            token_id: &order.token_id,
            price: order.price.to_string(),
            side: match order.side {
                Side::Buy => "BUY",
                Side::Sell => "SELL",
            },
            size: order.size.to_string(),
            order_type: "FAK",
            neg_risk: order.neg_risk,
        };

        let response = self.authed(self.client.post(&url)).json(&body).send().await?;
        let status = response.status();
        let parsed: OrderResponse = response.json().await?;

        if status.is_success() && parsed.success {
            let order_id = parsed.order_id.unwrap_or_default();
            return Ok(Placement::Filled { order_id });
        }

        let message = parsed
            .error_msg
            .unwrap_or_else(|| format!("HTTP {}", status));
        Ok(Placement::Rejected {
            class: classify_rejection(&message),
            message,
        })
    }

    async fn cancel_token_orders(&self, token_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/cancel-market-orders", self.host);
        let response = self
            .authed(self.client.delete(&url))
            .json(&CancelBody { asset_id: token_id })
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("cancel failed: HTTP {}", response.status());
        }
        Ok(())
    }
}
