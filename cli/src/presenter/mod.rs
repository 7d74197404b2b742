//! Output sinks for the poller.

mod chart;
mod raw;
mod text;

use std::io;

use wattwise_sources::{Reading, SourceError};

use crate::config::DisplayConfig;

pub use chart::{ChartPresenter, ChartState};
pub use raw::RawPresenter;
pub use text::TextPresenter;

/// Receives every poll outcome in order.
pub trait Presenter {
    fn reading(&mut self, reading: &Reading) -> io::Result<()>;

    /// A poll failed but monitoring continues.
    fn transient(&mut self, error: &SourceError) -> io::Result<()>;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    Normal,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for Thresholds {
    fn from(display: &DisplayConfig) -> Self {
        Self {
            warning: display.warning_watts,
            critical: display.critical_watts,
        }
    }
}

impl PowerLevel {
    /// Both thresholds are inclusive of the warning band.
    pub fn classify(watts: f64, thresholds: &Thresholds) -> Self {
        if watts > thresholds.critical {
            PowerLevel::Critical
        } else if watts >= thresholds.warning {
            PowerLevel::Warning
        } else {
            PowerLevel::Normal
        }
    }
}
