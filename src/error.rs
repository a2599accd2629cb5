//! Error types shared across workers.
//!
//! Storage errors live with the storage layer (`db::DbError`,
//! `store::StoreError`) and configuration errors with the config module.

use crate::model::RecordId;
use crate::store::StoreError;
use irclog_proto::ProtocolError;
use thiserror::Error;

// ============================================================================
// Transport Errors (connection to an IRC server)
// ============================================================================

/// Errors raised while connecting to or talking with an IRC server.
///
/// None of these are fatal: the session treats every one as a disconnect.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    #[error("connect to {server} failed: {source}")]
    Connect {
        server: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {0} timed out")]
    ConnectTimeout(String),

    #[error("registration with {0} timed out")]
    RegistrationTimeout(String),

    #[error("TLS handshake with {server} failed: {reason}")]
    Tls { server: String, reason: String },

    #[error("server rejected registration: {0}")]
    Rejected(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidAddress(_) => "invalid_address",
            Self::Connect { .. } => "connect_failed",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::RegistrationTimeout(_) => "registration_timeout",
            Self::Tls { .. } => "tls",
            Self::Rejected(_) => "rejected",
            Self::Protocol(_) => "protocol",
            Self::NotConnected => "not_connected",
            Self::Closed => "closed",
        }
    }
}

// ============================================================================
// Delivery Errors (router -> session handoff)
// ============================================================================

/// Why a control command was not taken by its session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("no session for network")]
    Unrouted,

    #[error("session is gone")]
    SessionClosed,

    #[error("handoff timed out")]
    Timeout,
}

impl DeliveryError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unrouted => "unrouted",
            Self::SessionClosed => "session_closed",
            Self::Timeout => "timeout",
        }
    }
}

// ============================================================================
// Live-tail Errors
// ============================================================================

/// Errors that end a single live-tail subscription.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("malformed start id: {0:?}")]
    BadStart(String),

    #[error("start record {0} not found")]
    UnknownRecord(RecordId),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("subscriber went away")]
    SinkClosed,

    #[error("sink error: {0}")]
    Sink(String),
}

impl TailError {
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BadStart(_) => "bad_start",
            Self::UnknownRecord(_) => "unknown_record",
            Self::Store(_) => "store",
            Self::Serialize(_) => "serialize",
            Self::SinkClosed => "sink_closed",
            Self::Sink(_) => "sink",
        }
    }
}
