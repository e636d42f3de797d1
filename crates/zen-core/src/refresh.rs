// ── Refresh orchestrator ──
//
// Per-controller polling loop: request a full refresh, let reports
// settle into the cache, publish every cached state, sleep, repeat.
// Failures are transient and never end the loop; only cancellation does.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::BridgeSettings;
use crate::controller::Controller;
use crate::model::{ControllerId, DeviceRecord};
use crate::publisher::{Publisher, TopicScheme};

/// Outcome of one refresh cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub controller: ControllerId,
    /// Whether the refresh request reached the controller.
    pub refresh_sent: bool,
    /// Taken just before the refresh request was written.
    pub requested_at: DateTime<Utc>,
    /// Records published this cycle, in device id order.
    pub published: Vec<DeviceRecord>,
    pub publish_failures: usize,
}

impl CycleReport {
    /// Published records older than this cycle's refresh request.
    pub fn stale(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.published
            .iter()
            .filter(|r| r.updated_at < self.requested_at)
    }
}

pub struct RefreshOrchestrator {
    controller: Controller,
    publisher: Arc<dyn Publisher>,
    topics: TopicScheme,
    poll_interval: Duration,
    settle_delay: Duration,
}

impl RefreshOrchestrator {
    pub fn new(
        controller: Controller,
        publisher: Arc<dyn Publisher>,
        settings: &BridgeSettings,
    ) -> Self {
        Self {
            controller,
            publisher,
            topics: settings.topics.clone(),
            poll_interval: settings.poll_interval,
            settle_delay: settings.settle_delay,
        }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Run cycles on a fixed cadence until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let id = self.controller.id().clone();
        info!(controller = %id, interval_secs = self.poll_interval.as_secs(), "refresh loop started");

        while !cancel.is_cancelled() {
            let Some(report) = self.run_cycle(&cancel).await else {
                break;
            };
            debug!(
                controller = %id,
                refresh_sent = report.refresh_sent,
                published = report.published.len(),
                stale = report.stale().count(),
                "refresh cycle complete"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        info!(controller = %id, "refresh loop stopped");
    }

    /// One refresh cycle. Returns `None` if cancelled during the settle wait.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Option<CycleReport> {
        let id = self.controller.id();
        let requested_at = Utc::now();

        let refresh_sent = match self.controller.refresh_all().await {
            Ok(()) => true,
            Err(e) => {
                warn!(controller = %id, error = %e, "refresh request failed, republishing cached state");
                false
            }
        };

        // No reports can arrive if the request never went out.
        if refresh_sent {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(self.settle_delay) => {}
            }
        }

        let mut published = Vec::new();
        let mut publish_failures = 0;
        for device in self.controller.cache().known_device_ids() {
            let Some(record) = self.controller.device_record(device) else {
                continue;
            };
            let topic = self.topics.state_topic(record.id);
            match self.publisher.publish(&topic, &record.state.to_string()) {
                Ok(()) => published.push(record),
                Err(e) => {
                    publish_failures += 1;
                    warn!(controller = %id, %topic, error = %e, "publish failed");
                }
            }
        }

        Some(CycleReport {
            controller: id.clone(),
            refresh_sent,
            requested_at,
            published,
            publish_failures,
        })
    }
}

impl std::fmt::Debug for RefreshOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshOrchestrator")
            .field("controller", self.controller.id())
            .field("poll_interval", &self.poll_interval)
            .field("settle_delay", &self.settle_delay)
            .finish_non_exhaustive()
    }
}
