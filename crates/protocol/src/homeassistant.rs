//! Home Assistant REST entity states (`GET /api/states/<entity_id>`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::reading::non_negative;
use crate::DecodeError;

/// States Home Assistant reports when the underlying device is offline.
const OFFLINE_STATES: &[&str] = &["unavailable", "unknown"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl EntityState {
    pub fn unit(&self) -> Option<&str> {
        self.attributes
            .get("unit_of_measurement")
            .and_then(Value::as_str)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    /// Parses the state as a number, scaled to base units (W, A).
    pub fn value(&self) -> Result<f64, DecodeError> {
        let raw = self.state.trim();
        if OFFLINE_STATES.iter().any(|s| raw.eq_ignore_ascii_case(s)) {
            return Err(DecodeError::Unavailable(self.entity_id.clone()));
        }

        let value: f64 = raw.parse().map_err(|_| DecodeError::NonNumeric {
            entity_id: self.entity_id.clone(),
            state: self.state.clone(),
        })?;

        let scaled = match self.unit() {
            Some("kW") => value * 1000.0,
            Some("mW") | Some("mA") => value / 1000.0,
            _ => value,
        };
        non_negative("state", scaled)
    }
}

pub fn parse_state(json: &str) -> Result<EntityState, DecodeError> {
    Ok(serde_json::from_str(json)?)
}

/// How several power entities fold into one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Add up every entity; all must report.
    Sum,
    /// Use the first entity, in configured order, that reports a value.
    First,
}

impl Aggregation {
    pub fn label(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::First => "first",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: &str, unit: Option<&str>) -> EntityState {
        let mut attributes = Map::new();
        if let Some(unit) = unit {
            attributes.insert("unit_of_measurement".into(), Value::from(unit));
        }
        EntityState {
            entity_id: "sensor.plug_power".into(),
            state: value.into(),
            attributes,
            last_updated: None,
        }
    }

    #[test]
    fn test_value_plain_watts() {
        assert_eq!(state("452.0", Some("W")).value().unwrap(), 452.0);
    }

    #[test]
    fn test_value_scales_kilowatts() {
        assert_eq!(state("1.5", Some("kW")).value().unwrap(), 1500.0);
    }

    #[test]
    fn test_value_unavailable() {
        let err = state("unavailable", Some("W")).value().unwrap_err();
        assert!(matches!(err, DecodeError::Unavailable(_)));
    }

    #[test]
    fn test_value_non_numeric() {
        let err = state("on", None).value().unwrap_err();
        assert!(matches!(err, DecodeError::NonNumeric { .. }));
    }
}
