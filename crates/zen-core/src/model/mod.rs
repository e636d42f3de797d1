// ── Domain model ──
//
// Typed device and controller identities shared by the cache, the
// orchestrator and consumers (CLI, publishers).

pub mod controller_id;
pub mod device;

pub use controller_id::ControllerId;
pub use device::{DeviceId, DeviceRecord, DeviceState};
