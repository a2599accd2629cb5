//! Tracing setup and span constructors.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Standardized span constructors, one per worker kind.
pub mod spans {
    use crate::model::NetworkId;
    use tracing::{Span, info_span};

    /// Span for a session supervisor.
    pub fn session(network_id: NetworkId, name: &str) -> Span {
        info_span!("session", network_id = %network_id, network = %name)
    }

    /// Span for the command router.
    pub fn router() -> Span {
        info_span!("router")
    }

    /// Span for the ingestion pipeline.
    pub fn ingest() -> Span {
        info_span!("ingest")
    }

    /// Span for one live-tail subscriber.
    pub fn tail(peer: &str, network: &str, channel: &str) -> Span {
        info_span!("tail", peer = %peer, network = %network, channel = %channel)
    }
}
