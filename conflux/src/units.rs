//! The external "unit handling" collaborator the specification names in
//! §6: a callable `to_units(value, units) -> value`. This crate ships a
//! minimal linear-factor implementation so examples and tests don't need an
//! external unit-aware numerics library.

use std::collections::HashMap;

use crate::error::CouplingError;
use crate::info::Value;

/// Converts a value expressed in one unit to another.
pub trait UnitConverter {
    fn to_units(&self, value: &Value, from: &str, to: &str) -> Result<Value, CouplingError>;
}

/// A `UnitConverter` backed by a table of linear conversion factors.
///
/// Only multiplicative conversions (m -> cm, s -> ms, ...) are supported;
/// affine conversions (e.g. Celsius -> Fahrenheit) are out of scope.
#[derive(Debug, Clone, Default)]
pub struct LinearUnitTable {
    factors: HashMap<(String, String), f64>,
}

impl LinearUnitTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `from -> to` with the given multiplicative factor, and the
    /// inverse conversion for free.
    pub fn register(mut self, from: &str, to: &str, factor: f64) -> Self {
        self.factors
            .insert((from.to_string(), to.to_string()), factor);
        self.factors
            .insert((to.to_string(), from.to_string()), 1.0 / factor);
        self
    }
}

impl UnitConverter for LinearUnitTable {
    fn to_units(&self, value: &Value, from: &str, to: &str) -> Result<Value, CouplingError> {
        if from == to {
            return Ok(value.clone());
        }
        let factor = self
            .factors
            .get(&(from.to_string(), to.to_string()))
            .ok_or_else(|| CouplingError::Metadata {
                slot: "unit conversion".to_string(),
                detail: format!("no known conversion from '{from}' to '{to}'"),
            })?;
        Ok(value.scale(*factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_to_centimeter() {
        let table = LinearUnitTable::new().register("m", "cm", 100.0);
        let out = table.to_units(&Value::Scalar(1.5), "m", "cm").unwrap();
        assert_eq!(out, Value::Scalar(150.0));
    }

    #[test]
    fn unknown_conversion_errors() {
        let table = LinearUnitTable::new();
        assert!(table.to_units(&Value::Scalar(1.0), "m", "kg").is_err());
    }
}
