use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::DecodeError;

/// One normalized power-telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Active power in watts.
    pub watts: f64,
    /// Current draw in amperes, when the backend reports it.
    pub amperes: Option<f64>,
    pub timestamp: DateTime<Local>,
}

impl Reading {
    /// Builds a reading stamped with the current local time.
    pub fn new(watts: f64, amperes: Option<f64>) -> Result<Self, DecodeError> {
        Self::at(watts, amperes, Local::now())
    }

    /// Builds a reading, rejecting negative or non-finite values.
    pub fn at(
        watts: f64,
        amperes: Option<f64>,
        timestamp: DateTime<Local>,
    ) -> Result<Self, DecodeError> {
        let watts = non_negative("watts", watts)?;
        let amperes = amperes.map(|a| non_negative("amperes", a)).transpose()?;
        Ok(Self {
            watts,
            amperes,
            timestamp,
        })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<f64, DecodeError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(DecodeError::OutOfRange { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_negative_watts() {
        let err = Reading::new(-1.5, None).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRange { field: "watts", .. }
        ));
    }

    #[test]
    fn test_rejects_nan_amperes() {
        let err = Reading::new(10.0, Some(f64::NAN)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::OutOfRange {
                field: "amperes",
                ..
            }
        ));
    }

    #[test]
    fn test_accepts_zero() {
        let reading = Reading::new(0.0, Some(0.0)).unwrap();
        assert_eq!(reading.watts, 0.0);
        assert_eq!(reading.amperes, Some(0.0));
    }
}
