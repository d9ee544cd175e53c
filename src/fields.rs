use std::collections::HashMap;

use serde_derive::Serialize;

/// One parsed reading from the inverter, keyed by field name.
///
/// Keys come from [`REAL_TIME_FIELDS`]; a key is absent when the device did not
/// report the field or its value could not be converted.
pub type Sample = HashMap<&'static str, FieldValue>;

/// A single field value as reported by the inverter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Returns the numeric value, or `None` for text fields.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(value) => Some(*value),
            FieldValue::Text(_) => None,
        }
    }

    /// Returns the text value, or `None` for numeric fields.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Float(_) => None,
            FieldValue::Text(text) => Some(text),
        }
    }
}

/// Target type of a field's raw XML text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float,
    Text,
}

/// Static description of one real-time field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Key under which the field appears in a [`Sample`].
    pub key: &'static str,
    /// XML element name on the real-time endpoint.
    pub tag: &'static str,
    pub kind: FieldKind,
    /// Whether the field participates in interval averaging.
    pub averaged: bool,
    /// Optional fields (3rd/4th PV string) warn once per process when missing.
    pub optional: bool,
    /// Some PV string fields carry a trailing unit token after a space; only
    /// the first whitespace-delimited token is converted.
    pub split_unit: bool,
}

const fn field(
    key: &'static str,
    kind: FieldKind,
    averaged: bool,
    optional: bool,
    split_unit: bool,
) -> FieldSpec {
    FieldSpec {
        key,
        tag: key,
        kind,
        averaged,
        optional,
        split_unit,
    }
}

const fn text(key: &'static str) -> FieldSpec {
    field(key, FieldKind::Text, false, false, false)
}

const fn float(key: &'static str) -> FieldSpec {
    field(key, FieldKind::Float, false, false, false)
}

const fn averaged(key: &'static str) -> FieldSpec {
    field(key, FieldKind::Float, true, false, false)
}

const fn pv_string(key: &'static str) -> FieldSpec {
    field(key, FieldKind::Float, true, false, true)
}

const fn optional_pv_string(key: &'static str) -> FieldSpec {
    field(key, FieldKind::Float, true, true, true)
}

/// Every field the real-time endpoint is expected to report.
pub const REAL_TIME_FIELDS: &[FieldSpec] = &[
    text("state"),
    averaged("v-grid"),
    averaged("i-grid"),
    averaged("f-grid"),
    averaged("p-ac"),
    averaged("temp"),
    float("e-today"),
    float("t-today"),
    float("e-total"),
    float("CO2"),
    float("t-total"),
    averaged("v-pv1"),
    averaged("i-pv1"),
    pv_string("v-pv2"),
    pv_string("i-pv2"),
    optional_pv_string("v-pv3"),
    optional_pv_string("i-pv3"),
    optional_pv_string("v-pv4"),
    optional_pv_string("i-pv4"),
    float("v-bus"),
];

/// Iterates the keys eligible for interval averaging.
pub fn averaged_keys() -> impl Iterator<Item = &'static str> {
    REAL_TIME_FIELDS
        .iter()
        .filter(|spec| spec.averaged)
        .map(|spec| spec.key)
}
