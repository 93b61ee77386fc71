//! poly-mirror: proportional copy-trading replication engine for Polymarket
//!
//! This library provides the core components for:
//! - Chain log subscription and OrderFilled decoding for a reference account
//! - Market metadata resolution via the Gamma API
//! - A shadow ledger reconstructing the reference's cost basis
//! - Proportional target calculation and trigger evaluation
//! - Bounded chase execution against the CLOB order-matching service
//! - Drift reconciliation against authoritative REST snapshots
//! - Redemption sweeping for resolved markets
//! - Structured logging and metrics

pub mod chain;
pub mod cli;
pub mod config;
pub mod execution;
pub mod ledger;
pub mod listener;
pub mod market;
pub mod portfolio;
pub mod prices;
pub mod redemption;
pub mod replicate;
pub mod telemetry;
pub mod ws;
