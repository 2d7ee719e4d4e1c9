use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dimension {
    Length,
    Weight,
    Currency,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dimension::Length => "length",
            Dimension::Weight => "weight",
            Dimension::Currency => "currency",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("unit '{unit}' is not registered for dimension {dimension}")]
    UnknownUnit { unit: String, dimension: Dimension },
    #[error("currency multiplier for '{code}' must be positive and finite, got {rate}")]
    InvalidRate { code: String, rate: f64 },
    #[error("field '{field}' does not take a unit tag (got '{unit}')")]
    NotConvertible { field: String, unit: String },
}

// Base units: metre and kilogram.
const LENGTH_UNITS: &[(&str, f64)] = &[
    ("m", 1.0),
    ("cm", 0.01),
    ("mm", 0.001),
    ("km", 1_000.0),
    ("in", 0.0254),
    ("ft", 0.3048),
    ("yd", 0.9144),
    ("mi", 1_609.344),
];

const WEIGHT_UNITS: &[(&str, f64)] = &[
    ("kg", 1.0),
    ("g", 0.001),
    ("lb", 0.453_592_37),
    ("oz", 0.028_349_523_125),
    ("st", 6.350_293_18),
    ("t", 1_000.0),
];

const UNIT_ALIASES: &[(&str, &str)] = &[
    ("meter", "m"),
    ("meters", "m"),
    ("metre", "m"),
    ("metres", "m"),
    ("centimeters", "cm"),
    ("kilometers", "km"),
    ("inch", "in"),
    ("inches", "in"),
    ("foot", "ft"),
    ("feet", "ft"),
    ("yard", "yd"),
    ("yards", "yd"),
    ("mile", "mi"),
    ("miles", "mi"),
    ("kilogram", "kg"),
    ("kilograms", "kg"),
    ("kgs", "kg"),
    ("gram", "g"),
    ("grams", "g"),
    ("lbs", "lb"),
    ("pound", "lb"),
    ("pounds", "lb"),
    ("ounce", "oz"),
    ("ounces", "oz"),
    ("stone", "st"),
    ("tonne", "t"),
];

/// Caller-supplied currency multipliers: one unit of `code` is worth `rates[code]` units of `base`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CurrencyTable {
    pub base: String,
    pub rates: BTreeMap<String, f64>,
}

impl CurrencyTable {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_ascii_uppercase(),
            rates: BTreeMap::new(),
        }
    }

    pub fn with_rate(mut self, code: &str, multiplier: f64) -> Self {
        self.rates.insert(code.to_ascii_uppercase(), multiplier);
        self
    }

    fn multiplier(&self, code: &str) -> Result<f64, UnitError> {
        let code = code.trim().to_ascii_uppercase();
        if !self.base.is_empty() && code == self.base.to_ascii_uppercase() {
            return Ok(1.0);
        }
        let rate = self
            .rates
            .iter()
            .find(|(known, _)| known.eq_ignore_ascii_case(&code))
            .map(|(_, rate)| *rate)
            .ok_or_else(|| UnitError::UnknownUnit {
                unit: code.clone(),
                dimension: Dimension::Currency,
            })?;
        if !rate.is_finite() || rate <= 0.0 {
            return Err(UnitError::InvalidRate { code, rate });
        }
        Ok(rate)
    }
}

/// Converts user-facing values to the canonical unit of their dimension and back.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    currency: CurrencyTable,
}

impl Normalizer {
    pub fn new(currency: CurrencyTable) -> Self {
        Self { currency }
    }

    pub fn to_base(&self, value: f64, unit: &str, dimension: Dimension) -> Result<f64, UnitError> {
        Ok(value * self.factor(unit, dimension)?)
    }

    pub fn from_base(
        &self,
        value: f64,
        unit: &str,
        dimension: Dimension,
    ) -> Result<f64, UnitError> {
        Ok(value / self.factor(unit, dimension)?)
    }

    pub fn registered_units(&self, dimension: Dimension) -> Vec<String> {
        match dimension {
            Dimension::Length => LENGTH_UNITS.iter().map(|(u, _)| u.to_string()).collect(),
            Dimension::Weight => WEIGHT_UNITS.iter().map(|(u, _)| u.to_string()).collect(),
            Dimension::Currency => {
                let mut codes: Vec<String> = self.currency.rates.keys().cloned().collect();
                if !self.currency.base.is_empty() {
                    codes.insert(0, self.currency.base.clone());
                }
                codes
            }
        }
    }

    fn factor(&self, unit: &str, dimension: Dimension) -> Result<f64, UnitError> {
        let table = match dimension {
            Dimension::Currency => return self.currency.multiplier(unit),
            Dimension::Length => LENGTH_UNITS,
            Dimension::Weight => WEIGHT_UNITS,
        };
        let lowered = unit.trim().to_ascii_lowercase();
        let canonical = UNIT_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, target)| *target)
            .unwrap_or(lowered.as_str());
        table
            .iter()
            .find(|(known, _)| *known == canonical)
            .map(|(_, factor)| *factor)
            .ok_or_else(|| UnitError::UnknownUnit {
                unit: unit.to_string(),
                dimension,
            })
    }
}
