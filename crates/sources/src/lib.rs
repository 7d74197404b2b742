//! Reading sources for wattwise.
//!
//! A [`ReadingSource`] owns the connection state for one backend and turns
//! each poll into a normalized [`Reading`]. Two network implementations exist:
//!
//! - [`kasa::KasaSource`] talks to a TP-Link Kasa plug on the local network.
//! - [`homeassistant::HomeAssistantSource`] reads sensor entities through a
//!   Home Assistant hub.
//!
//! [`mock::MockSource`] produces synthetic readings for demos.
//!
//! # Example
//!
//! ```ignore
//! use wattwise_sources::{kasa::{KasaConfig, KasaSource}, ReadingSource};
//!
//! let mut plug = KasaSource::new(KasaConfig::new("192.168.1.40"))?;
//! let reading = plug.fetch_reading().await?;
//! println!("{:.1} W", reading.watts);
//! plug.close().await;
//! ```

mod error;
pub mod homeassistant;
pub mod kasa;
pub mod mock;
mod source;

pub use error::SourceError;
pub use source::ReadingSource;
pub use wattwise_protocol::Reading;
