//! irclog-datefix - recompute the date bucket of every stored record.
//!
//! Usage: `irclog-datefix [config.toml]`. Only the `[database]` and
//! `[logging]` sections are read.

use anyhow::Context;
use irclogd::config::Config;
use irclogd::db::{Database, recompute_date_buckets};
use irclogd::telemetry;
use tracing::info;

const PROGRESS_EVERY: u64 = 10;

fn progress_line(done: u64, total: u64) -> String {
    let pct = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    format!("{done} / {total} - {pct:.1}%")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "irclogd.toml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    telemetry::init(&config.logging);

    let db = Database::new(&config.database.path).await?;
    let logs = db.logs();
    info!(records = logs.count().await?, database = %config.database.path, "Recomputing date buckets");

    let fixed = recompute_date_buckets(&logs, |done, total| {
        if done % PROGRESS_EVERY == 0 {
            info!("{}", progress_line(done, total));
        }
    })
    .await?;

    info!(fixed, "Date buckets recomputed");
    Ok(())
}
