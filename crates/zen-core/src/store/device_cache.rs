// ── Device state cache ──
//
// One cache per controller. Written only by the session's receive path,
// read by the orchestrator and the query surface. Reads never touch the
// network.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;

use crate::model::{DeviceId, DeviceRecord, DeviceState};

/// Concurrent last-write-wins map from device id to state.
///
/// Every `set` bumps a version counter that subscribers can watch.
pub struct DeviceCache {
    devices: DashMap<DeviceId, DeviceRecord>,
    version: watch::Sender<u64>,
    last_update: ArcSwapOption<DateTime<Utc>>,
}

impl DeviceCache {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            devices: DashMap::new(),
            version,
            last_update: ArcSwapOption::empty(),
        }
    }

    /// Last cached state, if the device has ever reported.
    pub fn get(&self, id: DeviceId) -> Option<DeviceState> {
        self.devices.get(&id).map(|r| r.state)
    }

    /// Last cached state together with its timestamp.
    pub fn record(&self, id: DeviceId) -> Option<DeviceRecord> {
        self.devices.get(&id).map(|r| r.value().clone())
    }

    /// Overwrite the state for `id`, stamping it with the current time.
    pub fn set(&self, id: DeviceId, state: DeviceState) -> DeviceRecord {
        let now = Utc::now();
        let record = DeviceRecord {
            id,
            state,
            updated_at: now,
        };
        self.devices.insert(id, record.clone());
        self.last_update.store(Some(Arc::new(now)));
        self.version.send_modify(|v| *v = v.wrapping_add(1));
        record
    }

    /// Sorted copy of the known ids; later mutations do not affect it.
    pub fn known_device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.devices.iter().map(|r| *r.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Every cached record, ordered by device id.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> =
            self.devices.iter().map(|r| r.value().clone()).collect();
        records.sort_unstable_by_key(|r| r.id);
        records
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Current version counter.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to the version counter; it changes on every `set`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// When any device last reported.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update.load_full().map(|t| *t)
    }
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeviceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCache")
            .field("devices", &self.devices.len())
            .field("version", &self.version())
            .finish()
    }
}
