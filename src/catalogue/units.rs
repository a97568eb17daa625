//! Physical units attached to a decoded measurement, and the metric/
//! imperial conversion boundary.
//!
//! Collapsed into one flat `Unit` tag per measurement rather than one Rust
//! type per physical quantity (`Speed`, `Temperature`, `Pressure`,
//! `Distance`, `Time`, ...), since the decoder table is the thing that
//! varies here, not the arithmetic.

use std::fmt;

/// Which system a caller wants values presented in. Conversion only
/// applies to units that have both a metric and an imperial member
/// ([`Unit::Kmh`]/[`Unit::Mph`]); every other unit is system-agnostic and
/// passes through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UnitSystem {
    /// SI-derived units: km/h, kPa, Celsius, ...
    Metric,
    /// US customary speed (mph); every other unit is unaffected.
    Imperial,
}

/// The closed set of units a decoder can attach to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Unit {
    /// Dimensionless/no unit.
    None,
    /// Percentage, 0-100 (or -100..100 for centered values).
    Percent,
    /// Degrees Celsius.
    Celsius,
    /// Kelvin.
    Kelvin,
    /// Kilopascal.
    Kpa,
    /// Pascal.
    Pa,
    /// Revolutions per minute.
    Rpm,
    /// Kilometers per hour.
    Kmh,
    /// Miles per hour.
    Mph,
    /// Grams per second.
    GramsPerSec,
    /// Volts.
    Volt,
    /// Milliamps.
    MilliAmp,
    /// Degrees (angle).
    Degree,
    /// Seconds.
    Second,
    /// Minutes.
    Minute,
    /// Kilometers.
    Kilometer,
    /// Liters per hour.
    LiterPerHour,
    /// Dimensionless ratio (e.g. equivalence ratio).
    Ratio,
}

impl Unit {
    /// The symbol conventionally used to display this unit.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Percent => "%",
            Unit::Celsius => "\u{b0}C",
            Unit::Kelvin => "K",
            Unit::Kpa => "kPa",
            Unit::Pa => "Pa",
            Unit::Rpm => "rpm",
            Unit::Kmh => "km/h",
            Unit::Mph => "mph",
            Unit::GramsPerSec => "g/s",
            Unit::Volt => "V",
            Unit::MilliAmp => "mA",
            Unit::Degree => "\u{b0}",
            Unit::Second => "s",
            Unit::Minute => "min",
            Unit::Kilometer => "km",
            Unit::LiterPerHour => "L/h",
            Unit::Ratio => "",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A decoded value paired with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasurementResult {
    /// The decoded value, in `unit`.
    pub value: f64,
    /// The unit `value` is expressed in.
    pub unit: Unit,
}

impl MeasurementResult {
    /// Constructs a measurement.
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Converts this measurement into the requested unit system. Only
    /// [`Unit::Kmh`]/[`Unit::Mph`] carry a system-dependent counterpart;
    /// every other unit is returned unchanged, since the base `Unit` set
    /// has no second member to convert into (e.g. no `Fahrenheit`
    /// variant exists alongside `Celsius`).
    pub fn in_unit_system(self, system: UnitSystem) -> MeasurementResult {
        match (self.unit, system) {
            (Unit::Kmh, UnitSystem::Imperial) => {
                MeasurementResult::new(self.value * 0.621_371, Unit::Mph)
            }
            (Unit::Mph, UnitSystem::Metric) => {
                MeasurementResult::new(self.value / 0.621_371, Unit::Kmh)
            }
            _ => self,
        }
    }
}

impl fmt::Display for MeasurementResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kmh_converts_to_mph() {
        let m = MeasurementResult::new(100.0, Unit::Kmh).in_unit_system(UnitSystem::Imperial);
        assert_eq!(m.unit, Unit::Mph);
        assert!((m.value - 62.1371).abs() < 1e-3);
    }

    #[test]
    fn units_without_a_counterpart_pass_through() {
        let m = MeasurementResult::new(90.0, Unit::Celsius).in_unit_system(UnitSystem::Imperial);
        assert_eq!(m, MeasurementResult::new(90.0, Unit::Celsius));
    }
}
