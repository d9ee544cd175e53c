use std::collections::HashMap;

use tracing::debug;

use crate::fields::{averaged_keys, FieldValue, Sample};

/// Accumulates numeric samples between publishes.
///
/// The per-field buffers, the last-sample cache, and the has-sample flag are
/// only ever mutated together through this API, so callers holding the
/// coordinator's lock cannot observe them out of step.
#[derive(Debug)]
pub struct SampleBuffer {
    buffer: HashMap<&'static str, Vec<f64>>,
    last_sample: Option<Sample>,
    has_sample: bool,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self {
            buffer: averaged_keys().map(|key| (key, Vec::new())).collect(),
            last_sample: None,
            has_sample: false,
        }
    }

    /// Records one successfully parsed sample for the current interval.
    ///
    /// Numeric values of averaged fields are appended to their buffers; a text
    /// value under an averaged key is skipped, not an error.
    pub fn record_sample(&mut self, sample: Sample) {
        for (key, values) in self.buffer.iter_mut() {
            match sample.get(key) {
                Some(FieldValue::Float(value)) => values.push(*value),
                Some(FieldValue::Text(text)) => {
                    debug!("skipping non-numeric sample for {key}: {text:?}");
                }
                None => {}
            }
        }
        self.last_sample = Some(sample);
        self.has_sample = true;
    }

    /// True iff at least one sample was recorded since the last reset.
    pub fn has_sample(&self) -> bool {
        self.has_sample
    }

    /// Mean-merged view of the current interval without resetting it.
    ///
    /// Starts from the last raw sample and overwrites every averaged field
    /// that collected values with its arithmetic mean. Fields that collected
    /// nothing keep the last raw value, or stay absent if they already were.
    pub fn aggregate(&self) -> Option<Sample> {
        if !self.has_sample {
            return None;
        }
        let mut aggregate = self.last_sample.clone()?;
        for (key, values) in &self.buffer {
            if !values.is_empty() {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                aggregate.insert(*key, FieldValue::Float(mean));
            }
        }
        Some(aggregate)
    }

    /// Builds the interval aggregate and clears buffers, last-sample cache,
    /// and has-sample flag as one unit.
    ///
    /// Returns `None` when nothing was recorded since the last reset, leaving
    /// the (already empty) state untouched.
    pub fn drain_and_reset(&mut self) -> Option<Sample> {
        let aggregate = self.aggregate()?;
        for values in self.buffer.values_mut() {
            values.clear();
        }
        self.last_sample = None;
        self.has_sample = false;
        Some(aggregate)
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_sample(v_pv1: f64, i_pv1: f64) -> Sample {
        let mut sample = Sample::new();
        sample.insert("state", FieldValue::Text("OK".to_string()));
        sample.insert("v-grid", FieldValue::Float(230.0));
        sample.insert("i-grid", FieldValue::Float(5.0));
        sample.insert("f-grid", FieldValue::Float(50.0));
        sample.insert("p-ac", FieldValue::Float(1000.0));
        sample.insert("temp", FieldValue::Float(34.0));
        sample.insert("e-today", FieldValue::Float(10.0));
        sample.insert("t-today", FieldValue::Float(240.0));
        sample.insert("e-total", FieldValue::Float(1200.0));
        sample.insert("CO2", FieldValue::Float(44.0));
        sample.insert("t-total", FieldValue::Float(3600.0));
        sample.insert("v-pv1", FieldValue::Float(v_pv1));
        sample.insert("i-pv1", FieldValue::Float(i_pv1));
        sample.insert("v-pv2", FieldValue::Float(155.0));
        sample.insert("i-pv2", FieldValue::Float(7.8));
        sample.insert("v-bus", FieldValue::Float(400.0));
        sample
    }

    #[test]
    fn test_empty_buffer_yields_nothing() {
        let mut buffer = SampleBuffer::new();
        assert!(!buffer.has_sample());
        assert!(buffer.aggregate().is_none());
        assert!(buffer.drain_and_reset().is_none());
        // Draining twice in a row must stay empty, never fabricate data.
        assert!(buffer.drain_and_reset().is_none());
    }

    #[test]
    fn test_mean_over_successful_samples() {
        let mut buffer = SampleBuffer::new();
        buffer.record_sample(make_sample(150.0, 8.0));
        // A failed poll in between contributes nothing.
        buffer.record_sample(make_sample(149.0, 8.2));

        let aggregate = buffer.drain_and_reset().expect("samples were recorded");
        let v_pv1 = aggregate.get("v-pv1").and_then(FieldValue::as_f64).unwrap();
        let i_pv1 = aggregate.get("i-pv1").and_then(FieldValue::as_f64).unwrap();
        assert!((v_pv1 - 149.5).abs() < 0.01);
        assert!((i_pv1 - 8.1).abs() < 0.01);
    }

    #[test]
    fn test_mean_over_many_samples() {
        let mut buffer = SampleBuffer::new();
        let values = [148.0, 149.0, 150.0, 151.0, 152.0];
        for value in values {
            buffer.record_sample(make_sample(value, 8.0));
        }

        let aggregate = buffer.drain_and_reset().unwrap();
        let expected = values.iter().sum::<f64>() / values.len() as f64;
        let v_pv1 = aggregate.get("v-pv1").and_then(FieldValue::as_f64).unwrap();
        assert!((v_pv1 - expected).abs() < f64::EPSILON);
    }

    #[test]
    fn test_pass_through_fields_keep_last_raw_value() {
        let mut buffer = SampleBuffer::new();
        buffer.record_sample(make_sample(150.0, 8.0));

        let mut second = make_sample(149.0, 8.2);
        second.insert("e-today", FieldValue::Float(10.4));
        second.insert("state", FieldValue::Text("Standby".to_string()));
        buffer.record_sample(second);

        let aggregate = buffer.drain_and_reset().unwrap();
        // Never averaged: taken verbatim from the most recent sample.
        assert_eq!(aggregate.get("e-today"), Some(&FieldValue::Float(10.4)));
        assert_eq!(
            aggregate.get("state"),
            Some(&FieldValue::Text("Standby".to_string()))
        );
    }

    #[test]
    fn test_missing_optional_strings_stay_absent() {
        let mut buffer = SampleBuffer::new();
        buffer.record_sample(make_sample(150.0, 8.0));

        let aggregate = buffer.drain_and_reset().unwrap();
        assert!(!aggregate.contains_key("v-pv3"));
        assert!(!aggregate.contains_key("i-pv4"));
    }

    #[test]
    fn test_drain_clears_everything() {
        let mut buffer = SampleBuffer::new();
        buffer.record_sample(make_sample(150.0, 8.0));
        buffer.drain_and_reset().unwrap();

        assert!(!buffer.has_sample());
        assert!(buffer.buffer.values().all(Vec::is_empty));
        assert!(buffer.last_sample.is_none());
    }

    #[test]
    fn test_non_numeric_value_for_averaged_key_is_skipped() {
        let mut buffer = SampleBuffer::new();
        let mut sample = make_sample(150.0, 8.0);
        sample.insert("v-grid", FieldValue::Text("fault".to_string()));
        buffer.record_sample(sample);
        buffer.record_sample(make_sample(149.0, 8.2));

        let aggregate = buffer.drain_and_reset().unwrap();
        // Only the second sample's numeric v-grid entered the buffer.
        assert_eq!(aggregate.get("v-grid"), Some(&FieldValue::Float(230.0)));
    }

    #[test]
    fn test_aggregate_preview_does_not_reset() {
        let mut buffer = SampleBuffer::new();
        buffer.record_sample(make_sample(150.0, 8.0));

        let preview = buffer.aggregate().unwrap();
        assert_eq!(preview.get("v-pv1"), Some(&FieldValue::Float(150.0)));
        assert!(buffer.has_sample());

        buffer.record_sample(make_sample(149.0, 8.2));
        let aggregate = buffer.drain_and_reset().unwrap();
        let v_pv1 = aggregate.get("v-pv1").and_then(FieldValue::as_f64).unwrap();
        assert!((v_pv1 - 149.5).abs() < 0.01);
    }
}
