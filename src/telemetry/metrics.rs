//! Engine metrics over the `metrics` facade

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Reference fills decoded from the log stream
    FillsDecoded,
    /// Fills skipped because the token is blacklisted
    FillsBlacklisted,
    /// Trigger evaluations that fired an execution
    TriggersFired,
    /// Orders successfully placed and filled
    OrdersFilled,
    /// Chase attempts killed for lack of liquidity
    OrdersKilled,
    /// Ghost positions force-closed by the reconciler
    GhostsClosed,
    /// Redemption transactions submitted
    Redemptions,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Follower total equity
    FollowerEquity,
    /// Reference total equity
    ReferenceEquity,
    /// Current scale ratio
    ScaleRatio,
    /// Tokens tracked in the shadow ledger
    ShadowPositions,
    /// Tokens with an execution attempt in flight
    PendingOrders,
}

/// Increment a counter
pub fn bump_counter(metric: CounterMetric) {
    let name = match metric {
        CounterMetric::FillsDecoded => "polymirror_fills_decoded_total",
        CounterMetric::FillsBlacklisted => "polymirror_fills_blacklisted_total",
        CounterMetric::TriggersFired => "polymirror_triggers_fired_total",
        CounterMetric::OrdersFilled => "polymirror_orders_filled_total",
        CounterMetric::OrdersKilled => "polymirror_orders_killed_total",
        CounterMetric::GhostsClosed => "polymirror_ghosts_closed_total",
        CounterMetric::Redemptions => "polymirror_redemptions_total",
    };
    metrics::counter!(name).increment(1);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::FollowerEquity => "polymirror_follower_equity_usd",
        GaugeMetric::ReferenceEquity => "polymirror_reference_equity_usd",
        GaugeMetric::ScaleRatio => "polymirror_scale_ratio",
        GaugeMetric::ShadowPositions => "polymirror_shadow_positions",
        GaugeMetric::PendingOrders => "polymirror_pending_orders",
    };
    metrics::gauge!(name).set(value);
}
