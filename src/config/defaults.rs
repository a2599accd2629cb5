//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

pub fn default_true() -> bool {
    true
}

// =============================================================================
// Database / Logging Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "irclogs.db".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Session Defaults
// =============================================================================

pub fn default_ingest_queue_capacity() -> usize {
    20
}

pub fn default_reconnect_backoff_ms() -> u64 {
    1000
}

pub fn default_join_delay_ms() -> u64 {
    1000
}

pub fn default_connect_timeout_secs() -> u64 {
    30
}

pub fn default_registration_timeout_secs() -> u64 {
    60
}

pub fn default_persist_retry_delay_ms() -> u64 {
    500
}

pub fn default_realname() -> String {
    "http://irclogs.me".to_string()
}

// =============================================================================
// Router / Tail Defaults
// =============================================================================

pub fn default_router_interval_ms() -> u64 {
    1000
}

pub fn default_handoff_timeout_secs() -> u64 {
    60
}

pub fn default_tail_address() -> std::net::SocketAddr {
    std::net::SocketAddr::from(([0, 0, 0, 0], 5023))
}

pub fn default_tail_poll_interval_ms() -> u64 {
    1000
}
