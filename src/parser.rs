use std::collections::HashSet;

use roxmltree::Document;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::fields::{FieldKind, FieldSpec, FieldValue, Sample, REAL_TIME_FIELDS};

/// Raised when a device document is malformed at the top level. Field-level
/// problems never produce this; they only narrow the returned sample.
#[derive(Debug, Error)]
#[error("xml parse error: {0}")]
pub struct ParseError(#[from] roxmltree::Error);

/// Static identity reported by the equipment endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub model_id: String,
    pub serial_number: String,
    pub sw_version: String,
}

impl DeviceInfo {
    /// Identity used when the equipment endpoint cannot be read.
    pub fn unknown() -> Self {
        Self {
            model: "unknown".to_string(),
            model_id: "unknown".to_string(),
            serial_number: "unknown".to_string(),
            sw_version: "unknown".to_string(),
        }
    }
}

/// Parses real-time documents into flat samples.
///
/// Remembers which optional PV-string fields were already reported missing so
/// that two-string inverters do not flood the log on every poll.
#[derive(Debug, Default)]
pub struct RealTimeParser {
    missing_optional: HashSet<&'static str>,
}

impl RealTimeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one `real_time_data.xml` document.
    ///
    /// The returned key set may be a strict subset of the declared fields:
    /// missing elements and unconvertible values are logged and omitted.
    pub fn parse(&mut self, xml: &str) -> Result<Sample, ParseError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();

        let mut sample = Sample::new();
        for spec in REAL_TIME_FIELDS {
            let text = root
                .descendants()
                .find(|node| node.is_element() && node.has_tag_name(spec.tag))
                .and_then(|node| node.text());
            let raw = match text.map(str::trim).filter(|raw| !raw.is_empty()) {
                Some(raw) => raw,
                None => {
                    self.warn_missing(spec);
                    continue;
                }
            };

            let token = if spec.split_unit {
                raw.split_whitespace().next().unwrap_or(raw)
            } else {
                raw
            };

            match spec.kind {
                FieldKind::Float => match token.parse::<f64>() {
                    Ok(value) => {
                        sample.insert(spec.key, FieldValue::Float(value));
                    }
                    Err(err) => {
                        warn!("error converting {} value {raw:?}: {err}", spec.key);
                    }
                },
                FieldKind::Text => {
                    sample.insert(spec.key, FieldValue::Text(token.to_string()));
                }
            }
        }

        Ok(sample)
    }

    fn warn_missing(&mut self, spec: &FieldSpec) {
        if spec.optional {
            // Inverters with fewer PV strings never report these elements.
            if self.missing_optional.insert(spec.key) {
                warn!("missing PV sensor XML element: {}", spec.tag);
            }
        } else {
            warn!("missing XML element: {}", spec.tag);
        }
    }
}

/// Parses one `equipment_data.xml` document into the device identity.
///
/// Missing elements fall back to `"unknown"` rather than failing.
pub fn parse_device_info(xml: &str) -> Result<DeviceInfo, ParseError> {
    let doc = Document::parse(xml)?;
    let root = doc.root_element();
    let text = |tag: &str| {
        root.descendants()
            .find(|node| node.is_element() && node.has_tag_name(tag))
            .and_then(|node| node.text())
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .unwrap_or("unknown")
            .to_string()
    };

    Ok(DeviceInfo {
        model: text("Model"),
        model_id: text("Product_Code"),
        serial_number: text("SN"),
        sw_version: text("MFMW"),
    })
}
