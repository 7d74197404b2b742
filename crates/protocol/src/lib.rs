//! Wire types and reading normalization shared by the wattwise backends.
//!
//! Two dialects are understood:
//!
//! - [`kasa`]: the TP-Link Kasa legacy local protocol (XOR "autokey" cipher
//!   over TCP/UDP port 9999, JSON payloads).
//! - [`homeassistant`]: entity state documents returned by the Home Assistant
//!   REST API.
//!
//! Both are normalized into a single [`Reading`].

mod error;
pub mod homeassistant;
pub mod kasa;
mod reading;

pub use error::DecodeError;
pub use reading::Reading;
