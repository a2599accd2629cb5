//! Prometheus metrics for irclogd.
//!
//! Exposed as `GET /metrics` on the API listener.
//!
//! - `irclog_records_persisted_total{network}` - records written to storage
//! - `irclog_records_dropped_total{reason}` - records lost by ingestion
//! - `irclog_persist_duration_seconds` - storage write latency
//! - `irclog_commands_total{result}` - router handoff outcomes
//! - `irclog_session_connects_total{network,result}` - connect attempts
//! - `irclog_sessions_connected` - sessions currently registered
//! - `irclog_tail_subscribers` - live-tail connections

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

pub static RECORDS_PERSISTED: OnceLock<IntCounterVec> = OnceLock::new();

pub static RECORDS_DROPPED: OnceLock<IntCounterVec> = OnceLock::new();

pub static COMMANDS: OnceLock<IntCounterVec> = OnceLock::new();

pub static SESSION_CONNECTS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges
// ========================================================================

pub static SESSIONS_CONNECTED: OnceLock<IntGauge> = OnceLock::new();

pub static TAIL_SUBSCRIBERS: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Histograms
// ========================================================================

pub static PERSIST_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Recording before `init` is a no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(RECORDS_PERSISTED, IntCounterVec::new(Opts::new("irclog_records_persisted_total", "Records written to storage"), &["network"]));
    register!(RECORDS_DROPPED, IntCounterVec::new(Opts::new("irclog_records_dropped_total", "Records lost by ingestion"), &["reason"]));
    register!(COMMANDS, IntCounterVec::new(Opts::new("irclog_commands_total", "Control command handoff outcomes"), &["result"]));
    register!(SESSION_CONNECTS, IntCounterVec::new(Opts::new("irclog_session_connects_total", "Session connect attempts"), &["network", "result"]));
    register!(SESSIONS_CONNECTED, IntGauge::new("irclog_sessions_connected", "Sessions currently connected"));
    register!(TAIL_SUBSCRIBERS, IntGauge::new("irclog_tail_subscribers", "Active live-tail subscribers"));
    register!(PERSIST_LATENCY, Histogram::with_opts(
        HistogramOpts::new("irclog_persist_duration_seconds", "Storage write latency")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions
// ============================================================================

#[inline]
pub fn record_persisted(network: &str, duration_secs: f64) {
    if let Some(c) = RECORDS_PERSISTED.get() {
        c.with_label_values(&[network]).inc();
    }
    if let Some(h) = PERSIST_LATENCY.get() {
        h.observe(duration_secs);
    }
}

#[inline]
pub fn record_dropped(reason: &str) {
    if let Some(c) = RECORDS_DROPPED.get() {
        c.with_label_values(&[reason]).inc();
    }
}

/// Record a handoff outcome: `delivered` or a `DeliveryError` code.
#[inline]
pub fn record_command(result: &str) {
    if let Some(c) = COMMANDS.get() {
        c.with_label_values(&[result]).inc();
    }
}

/// Record a connect attempt: `ok` or a `TransportError` code.
#[inline]
pub fn record_connect(network: &str, result: &str) {
    if let Some(c) = SESSION_CONNECTS.get() {
        c.with_label_values(&[network, result]).inc();
    }
}

#[inline]
pub fn session_connected() {
    if let Some(g) = SESSIONS_CONNECTED.get() {
        g.inc();
    }
}

#[inline]
pub fn session_disconnected() {
    if let Some(g) = SESSIONS_CONNECTED.get() {
        g.dec();
    }
}

/// Guard counting one live-tail subscriber while alive.
pub struct TailSubscriberGuard(());

impl TailSubscriberGuard {
    pub fn new() -> Self {
        if let Some(g) = TAIL_SUBSCRIBERS.get() {
            g.inc();
        }
        Self(())
    }
}

impl Default for TailSubscriberGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TailSubscriberGuard {
    fn drop(&mut self) {
        if let Some(g) = TAIL_SUBSCRIBERS.get() {
            g.dec();
        }
    }
}
