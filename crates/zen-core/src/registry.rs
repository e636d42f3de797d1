// ── Controller registry ──
//
// Owns one Controller + RefreshOrchestrator task per configured endpoint
// and drives their startup and teardown. Controllers are independent:
// a bad config or an unreachable host affects only its own entry.

use std::sync::Arc;

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zen_tpi::{Connector, TcpConnector};

use crate::config::{BridgeSettings, ControllerConfig};
use crate::controller::Controller;
use crate::error::CoreError;
use crate::model::{ControllerId, DeviceId, DeviceState};
use crate::publisher::Publisher;
use crate::refresh::RefreshOrchestrator;

/// A controller entry `start` refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedController {
    pub id: ControllerId,
    pub reason: String,
}

/// What `start` did with each config.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StartReport {
    /// Controllers whose task was spawned. Connecting happens inside it.
    pub started: Vec<ControllerId>,
    pub rejected: Vec<RejectedController>,
}

/// What `stop` had to do.
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub stopped: Vec<ControllerId>,
    /// Loops that missed the join bound and were aborted.
    pub aborted: Vec<ControllerId>,
}

struct Entry {
    controller: Controller,
    task: JoinHandle<()>,
}

pub struct ControllerRegistry {
    settings: BridgeSettings,
    publisher: Arc<dyn Publisher>,
    connector: Arc<dyn Connector>,
    cancel: CancellationToken,
    entries: IndexMap<ControllerId, Entry>,
}

impl ControllerRegistry {
    pub fn new(settings: BridgeSettings, publisher: Arc<dyn Publisher>) -> Result<Self, CoreError> {
        Self::with_connector(settings, publisher, Arc::new(TcpConnector))
    }

    pub fn with_connector(
        settings: BridgeSettings,
        publisher: Arc<dyn Publisher>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, CoreError> {
        settings.validate()?;
        Ok(Self {
            settings,
            publisher,
            connector,
            cancel: CancellationToken::new(),
            entries: IndexMap::new(),
        })
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Spawn one task per valid config: initial connect, then its refresh
    /// loop.
    ///
    /// Returns without waiting on any connect, so a slow or hanging host
    /// never delays its neighbours. A failed connect is logged and the
    /// loop still starts, reconnecting on its first send.
    pub fn start(&mut self, configs: impl IntoIterator<Item = ControllerConfig>) -> StartReport {
        let mut report = StartReport::default();

        for config in configs {
            let id = config.id();
            if let Err(e) = config.validate() {
                warn!(controller = %id, error = %e, "controller rejected");
                report.rejected.push(RejectedController {
                    id,
                    reason: e.to_string(),
                });
                continue;
            }
            if self.entries.contains_key(&id) {
                warn!(controller = %id, "duplicate controller id rejected");
                report.rejected.push(RejectedController {
                    id,
                    reason: "duplicate controller id".into(),
                });
                continue;
            }

            let controller = Controller::with_connector(
                config,
                self.settings.session.clone(),
                self.settings.inbound,
                Arc::clone(&self.connector),
            );
            let orchestrator = RefreshOrchestrator::new(
                controller.clone(),
                Arc::clone(&self.publisher),
                &self.settings,
            );
            let task = tokio::spawn(drive(
                orchestrator,
                self.settings.initial_refresh,
                self.cancel.child_token(),
            ));

            report.started.push(id.clone());
            self.entries.insert(id, Entry { controller, task });
        }

        info!(
            started = report.started.len(),
            rejected = report.rejected.len(),
            "controllers started"
        );
        report
    }

    /// Stop every refresh loop, then close every session.
    ///
    /// Each loop gets `max(poll_interval, settle_delay) + stop_grace` to
    /// exit before it is aborted. Consumes the registry.
    pub async fn stop(mut self) -> StopReport {
        self.cancel.cancel();
        let bound = self.settings.stop_bound();

        let joins = self.entries.iter_mut().map(|(id, entry)| async move {
            match tokio::time::timeout(bound, &mut entry.task).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => {
                    warn!(controller = %id, error = %e, "refresh loop ended abnormally");
                    None
                }
                Err(_) => {
                    warn!(controller = %id, ?bound, "refresh loop missed stop bound, aborting");
                    entry.task.abort();
                    Some(id.clone())
                }
            }
        });
        let aborted: Vec<ControllerId> = join_all(joins).await.into_iter().flatten().collect();

        join_all(self.entries.values().map(|e| e.controller.shutdown())).await;

        let stopped: Vec<ControllerId> = self.entries.keys().cloned().collect();
        info!(stopped = stopped.len(), aborted = aborted.len(), "controllers stopped");
        StopReport { stopped, aborted }
    }

    // ── Query surface ────────────────────────────────────────────

    pub fn controller(&self, id: &str) -> Option<&Controller> {
        self.entries.get(id).map(|e| &e.controller)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.entries.values().map(|e| &e.controller)
    }

    pub fn controller_ids(&self) -> Vec<ControllerId> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_state(&self, id: &str, device: DeviceId) -> Result<Option<DeviceState>, CoreError> {
        Ok(self.require(id)?.get_state(device))
    }

    pub async fn request_set_state(
        &self,
        id: &str,
        device: DeviceId,
        desired: DeviceState,
    ) -> Result<(), CoreError> {
        self.require(id)?.request_set_state(device, desired).await
    }

    pub async fn refresh_all(&self, id: &str) -> Result<(), CoreError> {
        self.require(id)?.refresh_all().await
    }

    pub async fn request_device_state(&self, id: &str, device: DeviceId) -> Result<(), CoreError> {
        self.require(id)?.request_device_state(device).await
    }

    fn require(&self, id: &str) -> Result<&Controller, CoreError> {
        self.controller(id)
            .ok_or_else(|| CoreError::ControllerNotFound { id: id.to_owned() })
    }
}

impl std::fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field("controllers", &self.entries.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Dropping without `stop` still signals every refresh loop to exit.
impl Drop for ControllerRegistry {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Per-controller task body: bring up, then loop until cancelled.
async fn drive(
    orchestrator: RefreshOrchestrator,
    initial_refresh: bool,
    cancel: CancellationToken,
) {
    tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = bring_up(orchestrator.controller(), initial_refresh) => {}
    }
    orchestrator.run(cancel).await;
}

/// Initial connect plus optional one-shot refresh. Failures are logged.
async fn bring_up(controller: &Controller, initial_refresh: bool) {
    let id = controller.id();
    if let Err(e) = controller.connect().await {
        warn!(controller = %id, error = %e, "initial connect failed, will retry on next refresh");
        return;
    }
    if initial_refresh {
        if let Err(e) = controller.refresh_all().await {
            warn!(controller = %id, error = %e, "initial refresh failed");
        }
    }
    debug!(controller = %id, "controller up");
}
