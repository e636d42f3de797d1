// ── Device state storage ──

mod device_cache;

pub use device_cache::DeviceCache;
