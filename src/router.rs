//! Command router.
//!
//! On every tick the router drains the pending command queue, hands each
//! command to the session owning its network and marks it complete once the
//! session has taken it. Anything not taken stays pending for the next tick.

use crate::config::RouterConfig;
use crate::error::DeliveryError;
use crate::metrics;
use crate::model::ControlCommand;
use crate::session::SessionRegistry;
use crate::store::CommandQueue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What one tick did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub fetched: usize,
    pub delivered: usize,
    pub unrouted: usize,
    pub timed_out: usize,
    pub closed: usize,
    /// Delivered but not marked complete; will be delivered again.
    pub mark_failures: usize,
}

pub struct CommandRouter {
    queue: Arc<dyn CommandQueue>,
    registry: Arc<SessionRegistry>,
    interval: Duration,
    handoff_timeout: Duration,
}

impl CommandRouter {
    pub fn new(
        queue: Arc<dyn CommandQueue>,
        registry: Arc<SessionRegistry>,
        interval: Duration,
        handoff_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            interval,
            handoff_timeout,
        }
    }

    pub fn from_config(
        queue: Arc<dyn CommandQueue>,
        registry: Arc<SessionRegistry>,
        config: &RouterConfig,
    ) -> Self {
        Self::new(queue, registry, config.interval(), config.handoff_timeout())
    }

    /// Tick until `shutdown` fires. An in-flight handoff is abandoned on
    /// shutdown and its command stays pending.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            handoff_timeout_secs = self.handoff_timeout.as_secs(),
            "Command router starting"
        );
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                report = self.tick() => {
                    if report.fetched > 0 {
                        debug!(?report, "Router tick");
                    }
                }
            }
        }
        info!("Command router stopped");
    }

    /// One pass over the pending queue, in fetch order.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let commands = match self.queue.fetch_pending().await {
            Ok(commands) => commands,
            Err(e) => {
                warn!(error = %e, "Failed to fetch pending commands, skipping tick");
                return report;
            }
        };
        report.fetched = commands.len();

        for command in commands {
            let id = command.id;
            let network_id = command.network_id;
            match self.deliver(command).await {
                Ok(()) => {
                    metrics::record_command("delivered");
                    report.delivered += 1;
                    debug!(command_id = %id, network_id = %network_id, "Command delivered");
                    if let Err(e) = self.queue.mark_complete(id).await {
                        warn!(command_id = %id, error = %e, "Failed to mark command complete");
                        report.mark_failures += 1;
                    }
                }
                Err(e) => {
                    metrics::record_command(e.error_code());
                    match e {
                        DeliveryError::Unrouted => report.unrouted += 1,
                        DeliveryError::Timeout => report.timed_out += 1,
                        DeliveryError::SessionClosed => report.closed += 1,
                    }
                    warn!(command_id = %id, network_id = %network_id, error = %e, "Command left pending");
                }
            }
        }

        report
    }

    async fn deliver(&self, command: ControlCommand) -> Result<(), DeliveryError> {
        let handle = self
            .registry
            .get(command.network_id)
            .ok_or(DeliveryError::Unrouted)?;
        match timeout(self.handoff_timeout, handle.deliver(command)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout),
        }
    }
}
