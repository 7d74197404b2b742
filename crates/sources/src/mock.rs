//! Synthetic readings for trying the display without any hardware.

use std::ops::RangeInclusive;

use chrono::Local;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use wattwise_protocol::Reading;

use crate::{ReadingSource, SourceError};

const POWER_RANGE: RangeInclusive<f64> = 50.0..=400.0;
const POWER_STEP: f64 = 20.0;
const CURRENT_RANGE: RangeInclusive<f64> = 0.5..=4.0;
const CURRENT_STEP: f64 = 0.2;

/// Random walk around a desktop-sized load.
pub struct MockSource {
    rng: StdRng,
    watts: f64,
    amperes: f64,
}

impl MockSource {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Same sequence on every run for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            watts: 200.0,
            amperes: 2.0,
        }
    }

    fn step(&mut self) -> (f64, f64) {
        self.watts = walk(&mut self.rng, self.watts, POWER_STEP, &POWER_RANGE);
        self.amperes = walk(&mut self.rng, self.amperes, CURRENT_STEP, &CURRENT_RANGE);
        (self.watts, self.amperes)
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

fn walk(rng: &mut StdRng, value: f64, step: f64, bounds: &RangeInclusive<f64>) -> f64 {
    let next = value + rng.gen_range(-step..=step);
    next.clamp(*bounds.start(), *bounds.end())
}

impl ReadingSource for MockSource {
    fn name(&self) -> &str {
        "Mock data"
    }

    async fn fetch_reading(&mut self) -> Result<Reading, SourceError> {
        let (watts, amperes) = self.step();
        Ok(Reading::at(watts, Some(amperes), Local::now())?)
    }

    async fn close(&mut self) {
        debug!("Mock session closed");
    }
}
