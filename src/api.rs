//! Historical query API and Prometheus endpoint.
//!
//! Read-only views over stored networks and logs. Channel path segments are
//! given without the leading `#`.

use crate::db::{Database, DbError, LogQuery};
use crate::model::NetworkConfig;
use crate::tail::LogView;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use irclog_proto::CHANNEL_PREFIX;
use serde::Serialize;
use std::net::SocketAddr;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Db(#[from] DbError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::NotFound => self.to_string(),
            Self::Db(e) => {
                error!(error = %e, "API query failed");
                "internal error".to_string()
            }
        };
        (self.status_code(), Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkView {
    pub name: String,
    pub channels: Vec<ChannelSummary>,
}

impl From<&NetworkConfig> for NetworkView {
    fn from(network: &NetworkConfig) -> Self {
        Self {
            name: network.name.clone(),
            channels: network
                .channels
                .iter()
                .map(|name| ChannelSummary { name: name.clone() })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    pub name: String,
    pub log_dates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayView {
    pub channel: ChannelView,
    pub logs: Vec<LogView>,
}

/// Build the API router.
pub fn router(db: Database) -> Router {
    Router::new()
        .route("/api/", get(list_networks))
        .route("/api/:network", get(get_network))
        .route("/api/:network/:channel", get(get_channel))
        .route("/api/:network/:channel/:date", get(get_day))
        .route("/metrics", get(metrics_handler))
        .with_state(db)
}

/// Serve the API on `address` until `shutdown` fires.
pub async fn run_api_server(
    address: SocketAddr,
    db: Database,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!(addr = %listener.local_addr()?, "HTTP API listening");
    axum::serve(listener, router(db))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn list_networks(State(db): State<Database>) -> Result<Json<Vec<NetworkView>>, ApiError> {
    let networks = db.networks().list().await?;
    Ok(Json(networks.iter().map(NetworkView::from).collect()))
}

async fn get_network(
    State(db): State<Database>,
    Path(network): Path<String>,
) -> Result<Json<NetworkView>, ApiError> {
    let network = find_network(&db, &network).await?;
    Ok(Json(NetworkView::from(&network)))
}

async fn get_channel(
    State(db): State<Database>,
    Path((network, channel)): Path<(String, String)>,
) -> Result<Json<ChannelView>, ApiError> {
    let (network, channel) = find_channel(&db, &network, &channel).await?;
    Ok(Json(channel_view(&db, &network, channel).await?))
}

async fn get_day(
    State(db): State<Database>,
    Path((network, channel, date)): Path<(String, String, String)>,
) -> Result<Json<DayView>, ApiError> {
    let (network, channel) = find_channel(&db, &network, &channel).await?;
    let records = db
        .logs()
        .query(&LogQuery::channel(network.id, channel.clone()).on_date(date))
        .await?;
    if records.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Json(DayView {
        channel: channel_view(&db, &network, channel).await?,
        logs: records.iter().map(LogView::from).collect(),
    }))
}

async fn find_network(db: &Database, name: &str) -> Result<NetworkConfig, ApiError> {
    db.networks()
        .find_by_name(name)
        .await?
        .ok_or(ApiError::NotFound)
}

/// Only configured channels are served.
async fn find_channel(
    db: &Database,
    network: &str,
    channel: &str,
) -> Result<(NetworkConfig, String), ApiError> {
    let network = find_network(db, network).await?;
    let channel = format!("{CHANNEL_PREFIX}{channel}");
    if !network.channels.contains(&channel) {
        return Err(ApiError::NotFound);
    }
    Ok((network, channel))
}

async fn channel_view(
    db: &Database,
    network: &NetworkConfig,
    channel: String,
) -> Result<ChannelView, ApiError> {
    let log_dates = db.logs().dates(network.id, &channel).await?;
    Ok(ChannelView {
        name: channel,
        log_dates,
    })
}
