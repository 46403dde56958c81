//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "surge_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "surge_connections_active";
    pub const AUTH_FAILURES_TOTAL: &str = "surge_auth_failures_total";
    pub const ROOMS_ACTIVE: &str = "surge_rooms_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "surge_subscriptions_total";
    pub const EVENTS_DELIVERED_TOTAL: &str = "surge_events_delivered_total";
    pub const EVENTS_DROPPED_TOTAL: &str = "surge_events_dropped_total";
    pub const BACKPLANE_EVENTS_TOTAL: &str = "surge_backplane_events_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::AUTH_FAILURES_TOTAL,
        "Handshakes rejected for missing or invalid credentials"
    );
    metrics::describe_gauge!(
        names::ROOMS_ACTIVE,
        "Rooms with at least one local subscriber"
    );
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Total room subscriptions");
    metrics::describe_counter!(
        names::EVENTS_DELIVERED_TOTAL,
        "Event envelopes written to client sockets"
    );
    metrics::describe_counter!(
        names::EVENTS_DROPPED_TOTAL,
        "Event envelopes dropped because a receiver lagged"
    );
    metrics::describe_counter!(
        names::BACKPLANE_EVENTS_TOTAL,
        "Events received from peer processes over the backplane"
    );

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record an authentication failure.
pub fn record_auth_failure() {
    counter!(names::AUTH_FAILURES_TOTAL).increment(1);
}

/// Record a subscription.
pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Record an event envelope delivered to a client socket.
pub fn record_event_delivered() {
    counter!(names::EVENTS_DELIVERED_TOTAL).increment(1);
}

/// Record events dropped by a lagging receiver.
pub fn record_events_dropped(count: u64) {
    counter!(names::EVENTS_DROPPED_TOTAL).increment(count);
}

/// Record an event received over the backplane.
pub fn record_backplane_event() {
    counter!(names::BACKPLANE_EVENTS_TOTAL).increment(1);
}

/// Update the active room count.
pub fn set_active_rooms(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::CONNECTIONS_TOTAL).increment(1);
        gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
    }
}
