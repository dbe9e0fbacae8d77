use crate::core::bands::Band;
use crate::types::{HampError, HampResult};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

const TIME_FORMAT: &str = "%H:%M:%S";

/// Raw per-band entry of an error file
#[derive(Debug, Deserialize)]
struct BandEntry {
    #[serde(default)]
    times: Vec<[String; 2]>,
}

/// How window boundaries are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindowBoundary {
    #[default]
    Inclusive,
    Exclusive,
}

/// Excluded interval of time-of-day (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn parse(start: &str, end: &str) -> HampResult<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|e| {
                HampError::Configuration(format!("invalid time of day '{}': {}", s, e))
            })
        };
        Ok(Self {
            start: parse(start)?,
            end: parse(end)?,
        })
    }

    /// Whether the time of day falls in the window. A window whose end is
    /// before its start wraps through midnight.
    pub fn contains(&self, time: &DateTime<Utc>, boundary: WindowBoundary) -> bool {
        let t = time.time();
        let (after_start, before_end) = match boundary {
            WindowBoundary::Inclusive => (t >= self.start, t <= self.end),
            WindowBoundary::Exclusive => (t > self.start, t < self.end),
        };
        if self.start <= self.end {
            after_start && before_end
        } else {
            after_start || before_end
        }
    }
}

/// Operator-curated radiometer exclusion windows for one flight
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QualityAnnotations {
    windows: BTreeMap<Band, Vec<TimeWindow>>,
}

impl QualityAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an error file of the form `{K: {times: [[HH:MM:SS, HH:MM:SS]]}}`
    pub fn from_yaml_str(text: &str) -> HampResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::new());
        }
        let raw: Option<HashMap<String, Option<BandEntry>>> = serde_yaml::from_str(text)?;
        let mut annotations = Self::new();
        for (key, entry) in raw.unwrap_or_default() {
            let band: Band = key.parse()?;
            for [start, end] in entry.map(|e| e.times).unwrap_or_default() {
                annotations.add_window(band, TimeWindow::parse(&start, &end)?);
            }
        }
        log::debug!(
            "Loaded {} exclusion windows across {} bands",
            annotations.window_count(),
            annotations.windows.len()
        );
        Ok(annotations)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> HampResult<Self> {
        let path = path.as_ref();
        log::info!("Reading quality annotations from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn add_window(&mut self, band: Band, window: TimeWindow) {
        self.windows.entry(band).or_default().push(window);
    }

    pub fn windows(&self, band: Band) -> &[TimeWindow] {
        self.windows.get(&band).map(|w| w.as_slice()).unwrap_or(&[])
    }

    pub fn bands(&self) -> impl Iterator<Item = Band> + '_ {
        self.windows.keys().copied()
    }

    pub fn window_count(&self) -> usize {
        self.windows.values().map(|w| w.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.window_count() == 0
    }

    /// Per-sample flag: true where `band` is excluded
    pub fn excluded(&self, band: Band, time: &[DateTime<Utc>], boundary: WindowBoundary) -> Vec<bool> {
        let windows = self.windows(band);
        time.iter()
            .map(|t| windows.iter().any(|w| w.contains(t, boundary)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const ERROR_FILE: &str = r#"
K:
  times:
    - ["10:00:00", "10:05:00"]
"183":
  times:
    - ["23:59:00", "00:01:00"]
    - ["12:00:00", "12:00:30"]
"#;

    #[test]
    fn test_parse_error_file() {
        let annotations = QualityAnnotations::from_yaml_str(ERROR_FILE).unwrap();
        assert_eq!(annotations.window_count(), 3);
        assert_eq!(annotations.windows(Band::G183).len(), 2);
        assert!(annotations.windows(Band::V).is_empty());
    }

    #[test]
    fn test_boundaries_and_midnight_wrap() {
        let annotations = QualityAnnotations::from_yaml_str(ERROR_FILE).unwrap();
        let times = vec![
            Utc.with_ymd_and_hms(2024, 8, 11, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 8, 11, 10, 5, 1).unwrap(),
            Utc.with_ymd_and_hms(2024, 8, 11, 0, 0, 30).unwrap(),
        ];
        assert_eq!(
            annotations.excluded(Band::K, &times, WindowBoundary::Inclusive),
            vec![true, false, false]
        );
        assert_eq!(
            annotations.excluded(Band::K, &times, WindowBoundary::Exclusive),
            vec![false, false, false]
        );
        assert_eq!(
            annotations.excluded(Band::G183, &times, WindowBoundary::Inclusive),
            vec![false, false, true]
        );
    }

    #[test]
    fn test_unknown_band_is_configuration_error() {
        let text = "W:\n  times: []\n";
        assert!(matches!(
            QualityAnnotations::from_yaml_str(text),
            Err(HampError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_file() {
        assert!(QualityAnnotations::from_yaml_str("").unwrap().is_empty());
    }
}
