//! Configuration types for poly-mirror

use rust_decimal::Decimal;
use serde::Deserialize;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub accounts: AccountsConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub markets: MarketsConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Tracked accounts
#[derive(Debug, Clone, Deserialize)]
pub struct AccountsConfig {
    /// Address of the reference trader being copied
    pub reference_address: String,
    /// Follower proxy wallet that holds positions and collateral
    pub follower_address: String,
    /// EOA that operates the follower proxy
    pub operator_address: String,
}

impl AccountsConfig {
    /// Lowercase all addresses so comparisons against decoded logs are exact
    pub fn normalized(mut self) -> Self {
        self.reference_address = self.reference_address.to_lowercase();
        self.follower_address = self.follower_address.to_lowercase();
        self.operator_address = self.operator_address.to_lowercase();
        self
    }
}

/// Chain endpoints and contract addresses
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// WebSocket JSON-RPC endpoint for the log subscription
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// HTTP JSON-RPC endpoint for balance reads and transaction submission
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Exchange contracts emitting OrderFilled (legacy and neg-risk)
    #[serde(default = "default_exchange_addresses")]
    pub exchange_addresses: Vec<String>,
    /// Conditional tokens framework contract
    #[serde(default = "default_ctf_address")]
    pub ctf_address: String,
    /// Collateral (USDC) contract
    #[serde(default = "default_usdc_address")]
    pub usdc_address: String,
}

fn default_ws_url() -> String {
    "wss://polygon-bor-rpc.publicnode.com".to_string()
}
fn default_rpc_url() -> String {
    "https://polygon-rpc.com".to_string()
}
fn default_chain_id() -> u64 {
    137
}
fn default_exchange_addresses() -> Vec<String> {
    vec![
        "0x4bfb41d5b3570defd03c39a9a4d8de6bd8b8982e".to_string(),
        "0xc5d563a36ae78145c45a50134d48a1215220f80a".to_string(),
    ]
}
fn default_ctf_address() -> String {
    "0x4d97dcd97ec945f40cf65f87097ace5ea0476045".to_string()
}
fn default_usdc_address() -> String {
    "0x2791bca1f2de4661ed88a30c99a7a9449aa84174".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            exchange_addresses: default_exchange_addresses(),
            ctf_address: default_ctf_address(),
            usdc_address: default_usdc_address(),
        }
    }
}

/// Market discovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketsConfig {
    #[serde(default = "default_gamma_api_url")]
    pub gamma_api_url: String,
    #[serde(default = "default_data_api_url")]
    pub data_api_url: String,
    /// CLOB market stream for live prices
    #[serde(default = "default_clob_ws_url")]
    pub clob_ws_url: String,
    /// Search terms for bulk prefetch of open markets
    #[serde(default = "default_search_terms")]
    pub search_terms: Vec<String>,
    /// Maximum markets fetched per search term
    #[serde(default = "default_prefetch_limit")]
    pub prefetch_limit: u32,
}

fn default_gamma_api_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}
fn default_data_api_url() -> String {
    "https://data-api.polymarket.com".to_string()
}
fn default_clob_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}
fn default_search_terms() -> Vec<String> {
    vec![
        "Bitcoin Up or Down".to_string(),
        "Ethereum Up or Down".to_string(),
    ]
}
fn default_prefetch_limit() -> u32 {
    50
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            gamma_api_url: default_gamma_api_url(),
            data_api_url: default_data_api_url(),
            clob_ws_url: default_clob_ws_url(),
            search_terms: default_search_terms(),
            prefetch_limit: default_prefetch_limit(),
        }
    }
}

/// Replication thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Minimum share drift before an order fires
    #[serde(default = "default_min_share_threshold")]
    pub min_share_threshold: Decimal,
    /// Minimum dollar drift before an order fires
    #[serde(default = "default_min_dollar_threshold")]
    pub min_dollar_threshold: Decimal,
    /// Positions with |net shares| below this are treated as flat
    #[serde(default = "default_dust_epsilon")]
    pub dust_epsilon: Decimal,
    /// Shadow net shares are overwritten by REST truth beyond this drift
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold_shares: Decimal,
    /// Price assumed when no live quote exists for a token yet
    #[serde(default = "default_fallback_price")]
    pub fallback_price: Decimal,
    /// Reference equity readings below this are ignored as implausible
    #[serde(default = "default_min_reference_equity")]
    pub min_reference_equity: Decimal,
}

fn default_min_share_threshold() -> Decimal {
    Decimal::new(5, 0) // 5 shares
}
fn default_min_dollar_threshold() -> Decimal {
    Decimal::new(110, 2) // $1.10
}
fn default_dust_epsilon() -> Decimal {
    Decimal::new(1, 1) // 0.1 shares
}
fn default_drift_threshold() -> Decimal {
    Decimal::new(1, 0) // 1 share
}
fn default_fallback_price() -> Decimal {
    Decimal::new(5, 1) // 0.50
}
fn default_min_reference_equity() -> Decimal {
    Decimal::new(5000, 0)
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            min_share_threshold: default_min_share_threshold(),
            min_dollar_threshold: default_min_dollar_threshold(),
            dust_epsilon: default_dust_epsilon(),
            drift_threshold_shares: default_drift_threshold(),
            fallback_price: default_fallback_price(),
            min_reference_equity: default_min_reference_equity(),
        }
    }
}

/// Order execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_clob_host")]
    pub clob_host: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
    /// Maximum placement attempts per trigger
    #[serde(default = "default_max_chase_attempts")]
    pub max_chase_attempts: usize,
    /// Slippage buffer per attempt; each rung prices more aggressively
    #[serde(default = "default_slippage_ladder")]
    pub slippage_ladder: Vec<Decimal>,
    /// Valid limit price band
    #[serde(default = "default_price_floor")]
    pub price_floor: Decimal,
    #[serde(default = "default_price_ceiling")]
    pub price_ceiling: Decimal,
    /// Fraction of collateral spendable when scaling an unaffordable buy down
    #[serde(default = "default_collateral_utilization")]
    pub collateral_utilization: Decimal,
    /// Pause between chase attempts
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
}

fn default_clob_host() -> String {
    "https://clob.polymarket.com".to_string()
}
fn default_max_chase_attempts() -> usize {
    3
}
fn default_slippage_ladder() -> Vec<Decimal> {
    vec![Decimal::new(2, 2), Decimal::new(5, 2), Decimal::new(10, 2)]
}
fn default_price_floor() -> Decimal {
    Decimal::new(2, 2) // 0.02
}
fn default_price_ceiling() -> Decimal {
    Decimal::new(98, 2) // 0.98
}
fn default_collateral_utilization() -> Decimal {
    Decimal::new(98, 2) // 0.98
}
fn default_retry_pause_ms() -> u64 {
    500
}

/// Timer intervals for the independent loops
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_market_scan_secs")]
    pub market_scan_secs: u64,
    #[serde(default = "default_follower_refresh_secs")]
    pub follower_refresh_secs: u64,
    #[serde(default = "default_equity_refresh_secs")]
    pub equity_refresh_secs: u64,
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_secs: u64,
    #[serde(default = "default_redeem_secs")]
    pub redeem_secs: u64,
}

fn default_market_scan_secs() -> u64 {
    30
}
fn default_follower_refresh_secs() -> u64 {
    15
}
fn default_equity_refresh_secs() -> u64 {
    60
}
fn default_reconcile_secs() -> u64 {
    5
}
fn default_redeem_secs() -> u64 {
    60
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            market_scan_secs: default_market_scan_secs(),
            follower_refresh_secs: default_follower_refresh_secs(),
            equity_refresh_secs: default_equity_refresh_secs(),
            reconcile_secs: default_reconcile_secs(),
            redeem_secs: default_redeem_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.accounts = config.accounts.normalized();
        Ok(config)
    }
}
