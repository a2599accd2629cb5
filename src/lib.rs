//! irclogd - IRC logging daemon.
//!
//! Keeps one supervised session per configured network, persists what it
//! sees to SQLite, accepts control commands through a database queue and
//! streams new records to live-tail subscribers.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod router;
pub mod session;
pub mod store;
pub mod tail;
pub mod telemetry;
pub mod transport;
