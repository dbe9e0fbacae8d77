//! Processing metadata and provenance of a flight's products

use crate::types::{HampResult, VERSION_ATTR};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStep {
    pub step_number: u32,
    pub step_name: String,
    /// Channel the step ran on
    pub channel: String,
    pub processing_duration: f64, // seconds
    /// Fraction of finite values after the step
    pub valid_fraction: Option<f64>,
    pub warnings: Vec<String>,
}

/// Metadata written next to the processed products
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub processing_timestamp: DateTime<Utc>,
    pub processor_version: String,
    /// Semantic version stamped on every product
    pub product_version: String,
    pub flight: String,
    pub navigation_source: String,
    /// Full configuration the run used
    pub parameters: serde_json::Value,
    pub processing_history: Vec<ProcessingStep>,
    pub channel_attributes: BTreeMap<String, BTreeMap<String, String>>,
}

/// Accumulates provenance while a flight is processed
pub struct ProvenanceTracker {
    metadata: ProcessingMetadata,
    step_counter: u32,
}

impl ProvenanceTracker {
    pub fn new<C: Serialize>(
        flight: &str,
        product_version: &str,
        navigation_source: &str,
        config: &C,
    ) -> HampResult<Self> {
        Ok(Self {
            metadata: ProcessingMetadata {
                processing_timestamp: Utc::now(),
                processor_version: env!("CARGO_PKG_VERSION").to_string(),
                product_version: product_version.to_string(),
                flight: flight.to_string(),
                navigation_source: navigation_source.to_string(),
                parameters: serde_json::to_value(config)?,
                processing_history: Vec::new(),
                channel_attributes: BTreeMap::new(),
            },
            step_counter: 0,
        })
    }

    pub fn record_step(
        &mut self,
        step_name: &str,
        channel: &str,
        processing_duration: f64,
        valid_fraction: Option<f64>,
        warnings: Vec<String>,
    ) {
        self.step_counter += 1;
        log::debug!("Recorded processing step {}: {} ({})", self.step_counter, step_name, channel);
        self.metadata.processing_history.push(ProcessingStep {
            step_number: self.step_counter,
            step_name: step_name.to_string(),
            channel: channel.to_string(),
            processing_duration,
            valid_fraction,
            warnings,
        });
    }

    /// Keep the final attributes of a product channel
    pub fn record_channel(&mut self, channel: &str, attrs: &BTreeMap<String, String>) {
        let mut attrs = attrs.clone();
        attrs
            .entry(VERSION_ATTR.to_string())
            .or_insert_with(|| self.metadata.product_version.clone());
        self.metadata.channel_attributes.insert(channel.to_string(), attrs);
    }

    pub fn finish(self) -> ProcessingMetadata {
        self.metadata
    }
}

impl ProcessingMetadata {
    pub fn export_json(&self) -> HampResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> HampResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> HampResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.export_json()?)?;
        log::info!("Processing metadata written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Params {
        spacing_m: f64,
    }

    #[test]
    fn test_steps_are_numbered_and_exported() {
        let mut tracker = ProvenanceTracker::new("HALO-20240811a", "0.3.0", "BAHAMAS", &Params { spacing_m: 30.0 }).unwrap();
        tracker.record_step("georeference", "radar", 0.1, Some(0.9), vec![]);
        tracker.record_step("height correction", "radar", 0.4, Some(0.8), vec![]);
        let metadata = tracker.finish();
        assert_eq!(metadata.processing_history[1].step_number, 2);
        assert_eq!(metadata.parameters["spacing_m"], 30.0);

        let json = metadata.export_json().unwrap();
        let parsed = ProcessingMetadata::from_json(&json).unwrap();
        assert_eq!(parsed.flight, "HALO-20240811a");
        assert_eq!(parsed.processing_history.len(), 2);
    }
}
