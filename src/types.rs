use chrono::{DateTime, TimeZone, Utc};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Missing-value marker used by every numeric channel
pub const MISSING: f64 = f64::NAN;

/// Attribute key naming the navigation source a series was georeferenced with
pub const GEOREFERENCE_SOURCE_ATTR: &str = "georeference_source";

/// Attribute key carrying the processed-product version
pub const VERSION_ATTR: &str = "version";

/// Attribute key carrying the ordered processing history
pub const HISTORY_ATTR: &str = "history";

/// Seconds since the Unix epoch with sub-second precision
pub fn epoch_seconds(time: &DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9
}

/// Inverse of [`epoch_seconds`], rounded to the nearest microsecond
pub fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    let micros = (seconds * 1e6).round() as i64;
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Convert a time axis into epoch seconds
pub fn time_axis_seconds(time: &[DateTime<Utc>]) -> Array1<f64> {
    time.iter().map(epoch_seconds).collect()
}

/// Unit convention of attitude angles (pitch, roll, heading)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

impl AngleUnit {
    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Degrees => value.to_radians(),
            AngleUnit::Radians => value,
        }
    }

    pub fn to_degrees(self, value: f64) -> f64 {
        match self {
            AngleUnit::Degrees => value,
            AngleUnit::Radians => value.to_degrees(),
        }
    }

    /// Reject angle channels that cannot be expressed in this unit.
    ///
    /// Radian attitude beyond ±π or degree attitude beyond ±360 means the
    /// caller declared the wrong convention.
    pub fn validate(self, values: ArrayView1<f64>, channel: &str) -> HampResult<()> {
        let limit = match self {
            AngleUnit::Degrees => 360.0,
            AngleUnit::Radians => std::f64::consts::PI,
        };
        let worst = values
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        if worst > limit {
            return Err(HampError::Configuration(format!(
                "{} reaches {:.3} which is outside ±{} for {:?}",
                channel, worst, limit, self
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AngleUnit::Degrees => write!(f, "degrees"),
            AngleUnit::Radians => write!(f, "radians"),
        }
    }
}

/// HAMP radiometer modules, each delivered as its own raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RadiometerModule {
    /// 183 GHz water vapour line
    G183,
    /// 90 GHz window plus 119 GHz oxygen line
    WF11990,
    /// K and V band module, also delivering integrated water vapour
    KV,
}

impl RadiometerModule {
    pub const ALL: [RadiometerModule; 3] =
        [RadiometerModule::G183, RadiometerModule::WF11990, RadiometerModule::KV];

    /// Directory name used by the raw radiometer archive
    pub fn directory(&self) -> &'static str {
        match self {
            RadiometerModule::G183 => "183",
            RadiometerModule::WF11990 => "11990",
            RadiometerModule::KV => "KV",
        }
    }
}

impl std::fmt::Display for RadiometerModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.directory())
    }
}

/// Named channels held by a [`crate::core::PostProcessedDataset`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Navigation,
    Radar,
    Radiometer(RadiometerModule),
    ColumnWaterVapour,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Navigation => write!(f, "navigation"),
            Channel::Radar => write!(f, "radar"),
            Channel::Radiometer(module) => write!(f, "radiometer {}", module),
            Channel::ColumnWaterVapour => write!(f, "column_water_vapour"),
        }
    }
}

/// Inclusive time interval used for slicing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> HampResult<Self> {
        if end < start {
            return Err(HampError::Processing(format!(
                "time range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// Interval of `window` centred on `centre`
    pub fn centred(centre: DateTime<Utc>, window: chrono::Duration) -> Self {
        let half = window / 2;
        Self {
            start: centre - half,
            end: centre + half,
        }
    }

    pub fn contains(&self, time: &DateTime<Utc>) -> bool {
        *time >= self.start && *time <= self.end
    }

    /// Indices of a sorted time axis falling inside the range
    pub fn indices_in(&self, time: &[DateTime<Utc>]) -> Vec<usize> {
        let first = time.partition_point(|t| *t < self.start);
        let last = time.partition_point(|t| *t <= self.end);
        (first..last.max(first)).collect()
    }
}

/// Shared geometric height grid (metres above ground), strictly increasing
#[derive(Debug, Clone, PartialEq)]
pub struct HeightGrid {
    heights: Array1<f64>,
}

impl HeightGrid {
    pub fn new(heights: Array1<f64>) -> HampResult<Self> {
        if heights.is_empty() {
            return Err(HampError::Configuration("height grid is empty".to_string()));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(HampError::Configuration(
                "height grid contains non-finite values".to_string(),
            ));
        }
        if heights.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            return Err(HampError::Configuration(
                "height grid must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { heights })
    }

    /// Regular grid `bottom, bottom + spacing, ...` stopping before `top`
    pub fn regular(bottom: f64, top: f64, spacing: f64) -> HampResult<Self> {
        if !(spacing > 0.0) || !bottom.is_finite() || !top.is_finite() || top <= bottom {
            return Err(HampError::Configuration(format!(
                "invalid regular height grid: bottom={} top={} spacing={}",
                bottom, top, spacing
            )));
        }
        let count = ((top - bottom) / spacing).ceil() as usize;
        let heights = Array1::from_iter((0..count).map(|k| bottom + k as f64 * spacing));
        Self::new(heights)
    }

    pub fn heights(&self) -> &Array1<f64> {
        &self.heights
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }
}

/// Vertical coordinate of a profiling instrument
#[derive(Debug, Clone, PartialEq)]
pub enum VerticalAxis {
    /// Range gates in metres from the antenna, identical for every sample
    Range(Array1<f64>),
    /// Geometric height above ground on the shared grid
    Height(HeightGrid),
}

impl VerticalAxis {
    pub fn len(&self) -> usize {
        match self {
            VerticalAxis::Range(range) => range.len(),
            VerticalAxis::Height(grid) => grid.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> &Array1<f64> {
        match self {
            VerticalAxis::Range(range) => range,
            VerticalAxis::Height(grid) => grid.heights(),
        }
    }
}

/// A measured variable; the first axis is always time
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    /// (time)
    Series(Array1<f64>),
    /// (time, vertical)
    Profile(Array2<f64>),
    /// (time, frequency)
    Spectrum(Array2<f64>),
}

impl Variable {
    pub fn time_len(&self) -> usize {
        match self {
            Variable::Series(data) => data.len(),
            Variable::Profile(data) | Variable::Spectrum(data) => data.nrows(),
        }
    }

    pub fn select_time(&self, indices: &[usize]) -> Variable {
        match self {
            Variable::Series(data) => Variable::Series(data.select(Axis(0), indices)),
            Variable::Profile(data) => Variable::Profile(data.select(Axis(0), indices)),
            Variable::Spectrum(data) => Variable::Spectrum(data.select(Axis(0), indices)),
        }
    }

    /// Set every sample where `keep` is false to missing
    pub fn mask_time(&mut self, keep: &[bool]) {
        match self {
            Variable::Series(data) => {
                for (value, &ok) in data.iter_mut().zip(keep) {
                    if !ok {
                        *value = MISSING;
                    }
                }
            }
            Variable::Profile(data) | Variable::Spectrum(data) => {
                for (mut row, &ok) in data.rows_mut().into_iter().zip(keep) {
                    if !ok {
                        row.fill(MISSING);
                    }
                }
            }
        }
    }

    pub fn valid_count(&self) -> usize {
        match self {
            Variable::Series(data) => data.iter().filter(|v| v.is_finite()).count(),
            Variable::Profile(data) | Variable::Spectrum(data) => {
                data.iter().filter(|v| v.is_finite()).count()
            }
        }
    }

    pub fn is_all_missing(&self) -> bool {
        self.valid_count() == 0
    }
}

/// Anything with a sorted time axis that can be subset by index
pub trait TimeIndexed: Sized {
    fn times(&self) -> &[DateTime<Utc>];

    fn select_indices(&self, indices: &[usize]) -> Self;

    /// New owned copy restricted to `range`; never mutates `self`
    fn slice(&self, range: &TimeRange) -> Self {
        let indices = range.indices_in(self.times());
        self.select_indices(&indices)
    }
}

/// Instrument time series: one channel of radar, radiometer or IWV data
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    pub time: Vec<DateTime<Utc>>,
    pub vertical: Option<VerticalAxis>,
    /// Channel centre frequencies in GHz
    pub frequency: Option<Array1<f64>>,
    pub variables: BTreeMap<String, Variable>,
    pub attrs: BTreeMap<String, String>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, time: Vec<DateTime<Utc>>) -> Self {
        Self {
            name: name.into(),
            time,
            vertical: None,
            frequency: None,
            variables: BTreeMap::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time_seconds(&self) -> Array1<f64> {
        time_axis_seconds(&self.time)
    }

    /// Insert a variable after checking it against the series dimensions
    pub fn insert_variable(&mut self, name: impl Into<String>, variable: Variable) -> HampResult<()> {
        let name = name.into();
        if variable.time_len() != self.len() {
            return Err(HampError::MalformedRecord(format!(
                "{}: variable '{}' has {} samples, time axis has {}",
                self.name,
                name,
                variable.time_len(),
                self.len()
            )));
        }
        match &variable {
            Variable::Profile(data) => {
                let expected = self.vertical.as_ref().map(|v| v.len());
                if expected != Some(data.ncols()) {
                    return Err(HampError::MalformedRecord(format!(
                        "{}: profile '{}' has {} gates, vertical axis has {:?}",
                        self.name,
                        name,
                        data.ncols(),
                        expected
                    )));
                }
            }
            Variable::Spectrum(data) => {
                let expected = self.frequency.as_ref().map(|f| f.len());
                if expected != Some(data.ncols()) {
                    return Err(HampError::MalformedRecord(format!(
                        "{}: spectrum '{}' has {} channels, frequency axis has {:?}",
                        self.name,
                        name,
                        data.ncols(),
                        expected
                    )));
                }
            }
            Variable::Series(_) => {}
        }
        self.variables.insert(name, variable);
        Ok(())
    }

    pub fn variable(&self, name: &str) -> HampResult<&Variable> {
        self.variables.get(name).ok_or_else(|| {
            HampError::MalformedRecord(format!("{}: no variable named '{}'", self.name, name))
        })
    }

    pub fn series(&self, name: &str) -> HampResult<&Array1<f64>> {
        match self.variable(name)? {
            Variable::Series(data) => Ok(data),
            _ => Err(HampError::MalformedRecord(format!(
                "{}: '{}' is not a (time) variable",
                self.name, name
            ))),
        }
    }

    pub fn profile(&self, name: &str) -> HampResult<&Array2<f64>> {
        match self.variable(name)? {
            Variable::Profile(data) => Ok(data),
            _ => Err(HampError::MalformedRecord(format!(
                "{}: '{}' is not a (time, vertical) variable",
                self.name, name
            ))),
        }
    }

    pub fn spectrum(&self, name: &str) -> HampResult<&Array2<f64>> {
        match self.variable(name)? {
            Variable::Spectrum(data) => Ok(data),
            _ => Err(HampError::MalformedRecord(format!(
                "{}: '{}' is not a (time, frequency) variable",
                self.name, name
            ))),
        }
    }

    pub fn is_georeferenced(&self) -> bool {
        self.attrs.contains_key(GEOREFERENCE_SOURCE_ATTR)
    }

    /// Append a step to the processing history attribute
    pub fn record_step(&mut self, step: &str) {
        let entry = self.attrs.entry(HISTORY_ATTR.to_string()).or_default();
        if !entry.is_empty() {
            entry.push_str("; ");
        }
        entry.push_str(step);
    }

    /// Check the level-0 invariants: non-empty, unique increasing time
    pub fn validate(&self) -> HampResult<()> {
        if self.is_empty() {
            return Err(HampError::MalformedRecord(format!(
                "{}: zero-length time axis",
                self.name
            )));
        }
        if self.time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HampError::MalformedRecord(format!(
                "{}: time axis is not strictly increasing",
                self.name
            )));
        }
        if !self.variables.is_empty() && self.variables.values().all(|v| v.is_all_missing()) {
            return Err(HampError::MalformedRecord(format!(
                "{}: every variable is missing",
                self.name
            )));
        }
        Ok(())
    }
}

impl TimeIndexed for TimeSeries {
    fn times(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    fn select_indices(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            time: indices.iter().map(|&i| self.time[i]).collect(),
            vertical: self.vertical.clone(),
            frequency: self.frequency.clone(),
            variables: self
                .variables
                .iter()
                .map(|(name, var)| (name.clone(), var.select_time(indices)))
                .collect(),
            attrs: self.attrs.clone(),
        }
    }
}

/// Aircraft state sampled on its own clock
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRecord {
    pub time: Vec<DateTime<Utc>>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    /// Altitude above sea level in metres
    pub altitude: Array1<f64>,
    pub pitch: Array1<f64>,
    pub roll: Array1<f64>,
    /// True heading, clockwise from north
    pub heading: Option<Array1<f64>>,
    pub angle_unit: AngleUnit,
    /// Name of the navigation system, carried as provenance
    pub source: String,
}

impl NavigationRecord {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time_seconds(&self) -> Array1<f64> {
        time_axis_seconds(&self.time)
    }

    pub fn validate(&self) -> HampResult<()> {
        let n = self.len();
        if n == 0 {
            return Err(HampError::MalformedRecord(format!(
                "navigation '{}' has a zero-length time axis",
                self.source
            )));
        }
        let lengths = [
            ("lat", self.lat.len()),
            ("lon", self.lon.len()),
            ("altitude", self.altitude.len()),
            ("pitch", self.pitch.len()),
            ("roll", self.roll.len()),
            ("heading", self.heading.as_ref().map_or(n, |h| h.len())),
        ];
        for (channel, len) in lengths {
            if len != n {
                return Err(HampError::MalformedRecord(format!(
                    "navigation '{}': {} has {} samples, time axis has {}",
                    self.source, channel, len, n
                )));
            }
        }
        if self.time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HampError::MalformedRecord(format!(
                "navigation '{}': time axis is not strictly increasing",
                self.source
            )));
        }
        self.angle_unit.validate(self.pitch.view(), "pitch")?;
        self.angle_unit.validate(self.roll.view(), "roll")?;
        if let Some(heading) = &self.heading {
            self.angle_unit.validate(heading.view(), "heading")?;
        }
        Ok(())
    }

    /// Aircraft ground track as a trajectory
    pub fn trajectory(&self) -> Trajectory {
        Trajectory {
            name: self.source.clone(),
            time: self.time.clone(),
            lat: self.lat.clone(),
            lon: self.lon.clone(),
        }
    }
}

impl TimeIndexed for NavigationRecord {
    fn times(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    fn select_indices(&self, indices: &[usize]) -> Self {
        Self {
            time: indices.iter().map(|&i| self.time[i]).collect(),
            lat: self.lat.select(Axis(0), indices),
            lon: self.lon.select(Axis(0), indices),
            altitude: self.altitude.select(Axis(0), indices),
            pitch: self.pitch.select(Axis(0), indices),
            roll: self.roll.select(Axis(0), indices),
            heading: self.heading.as_ref().map(|h| h.select(Axis(0), indices)),
            angle_unit: self.angle_unit,
            source: self.source.clone(),
        }
    }
}

/// Time-ordered positions of a moving platform
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub name: String,
    pub time: Vec<DateTime<Utc>>,
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
}

impl Trajectory {
    pub fn new(
        name: impl Into<String>,
        time: Vec<DateTime<Utc>>,
        lat: Array1<f64>,
        lon: Array1<f64>,
    ) -> HampResult<Self> {
        let trajectory = Self {
            name: name.into(),
            time,
            lat,
            lon,
        };
        trajectory.validate()?;
        Ok(trajectory)
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn validate(&self) -> HampResult<()> {
        if self.is_empty() {
            return Err(HampError::MalformedRecord(format!(
                "trajectory '{}' is empty",
                self.name
            )));
        }
        if self.lat.len() != self.len() || self.lon.len() != self.len() {
            return Err(HampError::MalformedRecord(format!(
                "trajectory '{}': {} times but {} lat / {} lon",
                self.name,
                self.len(),
                self.lat.len(),
                self.lon.len()
            )));
        }
        if self.time.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HampError::MalformedRecord(format!(
                "trajectory '{}': time axis is not strictly increasing",
                self.name
            )));
        }
        Ok(())
    }

    /// Median sampling interval in seconds, `None` for a single sample
    pub fn median_interval(&self) -> Option<f64> {
        let mut steps: Vec<f64> = self
            .time
            .windows(2)
            .map(|w| (w[1] - w[0]).num_microseconds().unwrap_or(i64::MAX) as f64 * 1e-6)
            .collect();
        if steps.is_empty() {
            return None;
        }
        steps.sort_by(|a, b| a.total_cmp(b));
        Some(steps[steps.len() / 2])
    }
}

impl TimeIndexed for Trajectory {
    fn times(&self) -> &[DateTime<Utc>] {
        &self.time
    }

    fn select_indices(&self, indices: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            time: indices.iter().map(|&i| self.time[i]).collect(),
            lat: self.lat.select(Axis(0), indices),
            lon: self.lon.select(Axis(0), indices),
        }
    }
}

/// Error types for HAMP processing
#[derive(Debug, thiserror::Error)]
pub enum HampError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing coverage: {0}")]
    MissingCoverage(String),

    #[error("No colocation within the plausibility radius (closest: {min_distance_m:?} m)")]
    NoColocation { min_distance_m: Option<f64> },

    #[error("Malformed instrument record: {0}")]
    MalformedRecord(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Channel '{0}' is not populated")]
    ChannelMissing(Channel),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for HAMP operations
pub type HampResult<T> = Result<T, HampError>;
