//! TP-Link Kasa plugs over the legacy local protocol.

mod device;
mod discovery;

pub use device::{KasaConfig, KasaSource};
pub use discovery::{discover, discover_on, DeviceDescriptor, DEFAULT_DISCOVERY_TIMEOUT};
