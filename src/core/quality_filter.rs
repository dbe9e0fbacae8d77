use crate::core::georeference::names;
use crate::io::annotations::{QualityAnnotations, WindowBoundary};
use crate::io::sea_land_mask::SeaLandMask;
use crate::types::{HampError, HampResult, TimeSeries, Variable, VerticalAxis};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ground clutter detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClutterConfig {
    pub enabled: bool,
    /// Reflectivity threshold in dBZ
    pub threshold_dbz: f64,
    /// Number of lowest height bins searched for a drop
    pub levels: usize,
    /// Profile variable the signature is detected on
    pub variable: String,
}

impl Default for ClutterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_dbz: -30.0,
            levels: 3,
            variable: "dBZg".to_string(),
        }
    }
}

/// Quality filter thresholds; `None` disables a rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_abs_roll_deg: Option<f64>,
    pub max_abs_pitch_deg: Option<f64>,
    pub radiometer_min_altitude_m: Option<f64>,
    pub radar_min_altitude_m: Option<f64>,
    /// Exclude radiometer samples not known to be over sea
    pub mask_over_land: bool,
    pub mask_above_platform: bool,
    pub clutter: ClutterConfig,
    pub window_boundary: WindowBoundary,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_abs_roll_deg: Some(5.0),
            max_abs_pitch_deg: None,
            radiometer_min_altitude_m: Some(4800.0),
            radar_min_altitude_m: None,
            mask_over_land: true,
            mask_above_platform: true,
            clutter: ClutterConfig::default(),
            window_boundary: WindowBoundary::Inclusive,
        }
    }
}

/// Individual masking rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rule {
    Attitude,
    Altitude,
    SeaLand,
    KnownBadWindow,
    GroundClutter,
    AbovePlatform,
}

/// Auxiliary channels aligned on the filtered series' time axis.
/// Angles in degrees. Absent inputs skip the rules that need them.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterInputs<'a> {
    pub altitude: Option<ArrayView1<'a, f64>>,
    pub roll: Option<ArrayView1<'a, f64>>,
    pub pitch: Option<ArrayView1<'a, f64>>,
    pub lat: Option<ArrayView1<'a, f64>>,
    pub lon: Option<ArrayView1<'a, f64>>,
    pub sea_land_mask: Option<&'a SeaLandMask>,
    pub annotations: Option<&'a QualityAnnotations>,
}

impl<'a> FilterInputs<'a> {
    /// Inputs taken from the georeference variables of `series`
    pub fn from_series(series: &'a TimeSeries) -> Self {
        let get = move |name: &str| series.series(name).ok().map(|values| values.view());
        Self {
            altitude: get(names::PLANE_ALTITUDE),
            roll: get(names::PLANE_ROLL),
            pitch: get(names::PLANE_PITCH),
            lat: get(names::LAT),
            lon: get(names::LON),
            sea_land_mask: None,
            annotations: None,
        }
    }

    pub fn with_sea_land_mask(mut self, mask: &'a SeaLandMask) -> Self {
        self.sea_land_mask = Some(mask);
        self
    }

    pub fn with_annotations(mut self, annotations: &'a QualityAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }

    fn check_lengths(&self, series: &TimeSeries) -> HampResult<()> {
        let channels = [
            ("altitude", self.altitude),
            ("roll", self.roll),
            ("pitch", self.pitch),
            ("lat", self.lat),
            ("lon", self.lon),
        ];
        for (channel, values) in channels {
            if let Some(values) = values {
                if values.len() != series.len() {
                    return Err(HampError::MalformedRecord(format!(
                        "{}: filter input {} has {} samples, series has {}",
                        series.name,
                        channel,
                        values.len(),
                        series.len()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Every evaluated rule with its keep flags
#[derive(Debug, Clone, Default)]
pub struct MaskReport {
    pub samples: usize,
    /// Per-sample keep flags
    pub time_rules: BTreeMap<Rule, Vec<bool>>,
    /// Per-cell keep flags over (time, height) or (time, frequency)
    pub cell_rules: BTreeMap<Rule, Array2<bool>>,
    /// Rules skipped for lack of inputs
    pub skipped: Vec<Rule>,
}

impl MaskReport {
    fn new(samples: usize) -> Self {
        Self {
            samples,
            ..Self::default()
        }
    }

    /// AND of every per-sample rule
    pub fn keep_time(&self) -> Vec<bool> {
        let mut keep = vec![true; self.samples];
        for flags in self.time_rules.values() {
            for (k, &f) in keep.iter_mut().zip(flags) {
                *k &= f;
            }
        }
        keep
    }

    /// AND of every per-cell rule of width `columns`
    pub fn keep_cells(&self, columns: usize) -> Option<Array2<bool>> {
        let mut combined: Option<Array2<bool>> = None;
        for cells in self.cell_rules.values().filter(|c| c.ncols() == columns) {
            combined = Some(match combined {
                Some(mut acc) => {
                    Zip::from(&mut acc).and(cells).for_each(|a, &c| *a &= c);
                    acc
                }
                None => cells.clone(),
            });
        }
        combined
    }

    /// Samples or cells removed by `rule` alone
    pub fn excluded_count(&self, rule: Rule) -> usize {
        if let Some(flags) = self.time_rules.get(&rule) {
            return flags.iter().filter(|&&k| !k).count();
        }
        self.cell_rules
            .get(&rule)
            .map_or(0, |cells| cells.iter().filter(|&&k| !k).count())
    }

    /// Null every non-coordinate variable where the combined mask says so.
    /// Axes and coordinates are left untouched.
    pub fn apply(&self, series: &TimeSeries) -> TimeSeries {
        let keep = self.keep_time();
        let mut output = series.clone();
        for (name, variable) in output.variables.iter_mut() {
            if names::is_coordinate(name) {
                continue;
            }
            variable.mask_time(&keep);
            if let Variable::Profile(data) | Variable::Spectrum(data) = variable {
                if let Some(cells) = self.keep_cells(data.ncols()) {
                    if cells.dim() == data.dim() {
                        Zip::from(data).and(&cells).for_each(|v, &k| {
                            if !k {
                                *v = f64::NAN;
                            }
                        });
                    }
                }
            }
        }
        output
    }

    fn log(&self, name: &str) {
        for rule in self.time_rules.keys().chain(self.cell_rules.keys()) {
            log::info!(
                "{}: {:?} rule excludes {} values",
                name,
                rule,
                self.excluded_count(*rule)
            );
        }
        for rule in &self.skipped {
            log::debug!("{}: {:?} rule skipped, inputs not supplied", name, rule);
        }
    }
}

/// Cells flagged as surface clutter, `true` = clutter.
///
/// A cell is clutter when the lowest `levels` bins show a return above
/// `threshold` followed by a drop below it in the next bin up. A drop at
/// bin `l` flags bins `0..=l + 1`. Missing reflectivity counts as below
/// threshold.
pub fn ground_clutter_mask(values: ArrayView2<f64>, threshold: f64, levels: usize) -> Array2<bool> {
    let (n_time, n_bins) = values.dim();
    let mut clutter = Array2::from_elem((n_time, n_bins), false);
    let search = levels.min(n_bins.saturating_sub(1));
    for (column, mut flags) in values.axis_iter(Axis(0)).zip(clutter.axis_iter_mut(Axis(0))) {
        let strong = |bin: usize| column[bin] > threshold;
        let top = (0..search).filter(|&l| strong(l) && !strong(l + 1)).max();
        if let Some(l) = top {
            flags.slice_mut(ndarray::s![..=l + 1]).fill(true);
        }
    }
    clutter
}

/// Keep flags for grid heights at or below the aircraft
pub fn below_platform(heights: ArrayView1<f64>, altitude: ArrayView1<f64>) -> Array2<bool> {
    Array2::from_shape_fn((altitude.len(), heights.len()), |(t, k)| heights[k] <= altitude[t])
}

fn within(values: ArrayView1<f64>, limit: f64) -> Vec<bool> {
    values.iter().map(|v| v.abs() <= limit).collect()
}

/// Applies validity masks to radar and radiometer series
pub struct QualityFilter {
    config: FilterConfig,
}

impl QualityFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn evaluate_attitude(&self, inputs: &FilterInputs, report: &mut MaskReport) {
        let mut flags: Option<Vec<bool>> = None;
        let gates = [
            (self.config.max_abs_roll_deg, inputs.roll),
            (self.config.max_abs_pitch_deg, inputs.pitch),
        ];
        for (limit, values) in gates {
            if let (Some(limit), Some(values)) = (limit, values) {
                let gate = within(values, limit);
                flags = Some(match flags {
                    Some(acc) => acc.iter().zip(&gate).map(|(a, b)| *a && *b).collect(),
                    None => gate,
                });
            }
        }
        match flags {
            Some(flags) => {
                report.time_rules.insert(Rule::Attitude, flags);
            }
            None => report.skipped.push(Rule::Attitude),
        }
    }

    fn evaluate_altitude(&self, min_altitude: Option<f64>, inputs: &FilterInputs, report: &mut MaskReport) {
        match (min_altitude, inputs.altitude) {
            (Some(min), Some(altitude)) => {
                let flags = altitude.iter().map(|&a| a >= min).collect();
                report.time_rules.insert(Rule::Altitude, flags);
            }
            _ => report.skipped.push(Rule::Altitude),
        }
    }

    /// Evaluate every radar rule without applying them
    pub fn evaluate_radar(&self, radar: &TimeSeries, inputs: &FilterInputs) -> HampResult<MaskReport> {
        inputs.check_lengths(radar)?;
        let heights = match &radar.vertical {
            Some(VerticalAxis::Height(grid)) => grid.heights(),
            _ => {
                return Err(HampError::Processing(format!(
                    "{}: radar filtering requires a geometric height axis",
                    radar.name
                )))
            }
        };
        let mut report = MaskReport::new(radar.len());
        self.evaluate_attitude(inputs, &mut report);
        self.evaluate_altitude(self.config.radar_min_altitude_m, inputs, &mut report);

        let clutter = &self.config.clutter;
        match radar.variables.get(&clutter.variable) {
            Some(Variable::Profile(values)) if clutter.enabled => {
                let flagged = ground_clutter_mask(values.view(), clutter.threshold_dbz, clutter.levels);
                report.cell_rules.insert(Rule::GroundClutter, flagged.mapv(|c| !c));
            }
            _ => {
                if clutter.enabled {
                    log::warn!(
                        "{}: no profile '{}' to detect ground clutter on",
                        radar.name,
                        clutter.variable
                    );
                }
                report.skipped.push(Rule::GroundClutter);
            }
        }

        match inputs.altitude {
            Some(altitude) if self.config.mask_above_platform => {
                report
                    .cell_rules
                    .insert(Rule::AbovePlatform, below_platform(heights.view(), altitude));
            }
            _ => report.skipped.push(Rule::AbovePlatform),
        }
        Ok(report)
    }

    /// Evaluate every radiometer rule without applying them
    pub fn evaluate_radiometer(&self, series: &TimeSeries, inputs: &FilterInputs) -> HampResult<MaskReport> {
        inputs.check_lengths(series)?;
        let mut report = MaskReport::new(series.len());
        self.evaluate_attitude(inputs, &mut report);
        self.evaluate_altitude(self.config.radiometer_min_altitude_m, inputs, &mut report);

        match (inputs.sea_land_mask, inputs.lat, inputs.lon) {
            (Some(mask), Some(lat), Some(lon)) if self.config.mask_over_land => {
                report.time_rules.insert(Rule::SeaLand, mask.sea_mask(lat, lon));
            }
            _ => report.skipped.push(Rule::SeaLand),
        }

        match (inputs.annotations, &series.frequency) {
            (Some(annotations), Some(frequency)) if !annotations.is_empty() => {
                let mut keep = Array2::from_elem((series.len(), frequency.len()), true);
                for band in annotations.bands() {
                    let excluded = annotations.excluded(band, &series.time, self.config.window_boundary);
                    let columns = band.channel_mask(frequency.view());
                    Self::exclude_band(&mut keep, &excluded, &columns);
                    log::debug!(
                        "{}: band {} excludes {} samples on {} channels",
                        series.name,
                        band,
                        excluded.iter().filter(|&&e| e).count(),
                        columns.iter().filter(|&&c| c).count()
                    );
                }
                report.cell_rules.insert(Rule::KnownBadWindow, keep);
            }
            _ => report.skipped.push(Rule::KnownBadWindow),
        }
        Ok(report)
    }

    fn exclude_band(keep: &mut Array2<bool>, excluded: &[bool], columns: &[bool]) {
        for (mut row, &bad) in keep.axis_iter_mut(Axis(0)).zip(excluded) {
            if !bad {
                continue;
            }
            for (k, &in_band) in row.iter_mut().zip(columns) {
                if in_band {
                    *k = false;
                }
            }
        }
    }

    /// Mask a radar series on the geometric height grid
    pub fn filter_radar(&self, radar: &TimeSeries, inputs: &FilterInputs) -> HampResult<TimeSeries> {
        log::info!("Filtering radar {} ({} samples)", radar.name, radar.len());
        let report = self.evaluate_radar(radar, inputs)?;
        report.log(&radar.name);
        let mut output = report.apply(radar);
        output.record_step("radar quality filter");
        Ok(output)
    }

    /// Mask a radiometer or water-vapour series
    pub fn filter_radiometer(&self, series: &TimeSeries, inputs: &FilterInputs) -> HampResult<TimeSeries> {
        log::info!("Filtering radiometer {} ({} samples)", series.name, series.len());
        let report = self.evaluate_radiometer(series, inputs)?;
        report.log(&series.name);
        let mut output = report.apply(series);
        output.record_step("radiometer quality filter");
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_clutter_drop_at_lowest_bin() {
        let values = array![[-10.0, -40.0, -40.0, -40.0, -40.0]];
        let mask = ground_clutter_mask(values.view(), -30.0, 3);
        assert_eq!(mask.row(0).to_vec(), vec![true, true, false, false, false]);
    }

    #[test]
    fn test_sustained_column_is_not_clutter() {
        let values = array![[-10.0, -5.0, 0.0, 5.0, 3.0]];
        let mask = ground_clutter_mask(values.view(), -30.0, 3);
        assert!(mask.iter().all(|&c| !c));
    }

    #[test]
    fn test_highest_drop_wins() {
        // drops at bins 0 and 2
        let values = array![[-10.0, -40.0, -10.0, -40.0, 10.0]];
        let mask = ground_clutter_mask(values.view(), -30.0, 3);
        assert_eq!(mask.row(0).to_vec(), vec![true, true, true, true, false]);
    }

    #[test]
    fn test_missing_reflectivity_is_below_threshold() {
        let values = array![[f64::NAN, f64::NAN, 0.0]];
        assert!(ground_clutter_mask(values.view(), -30.0, 3).iter().all(|&c| !c));
    }

    #[test]
    fn test_attitude_gate_masks_missing_attitude() {
        let filter = QualityFilter::new(FilterConfig::default());
        let roll = array![1.0, -6.0, f64::NAN];
        let inputs = FilterInputs {
            roll: Some(roll.view()),
            ..FilterInputs::default()
        };
        let mut report = MaskReport::new(3);
        filter.evaluate_attitude(&inputs, &mut report);
        assert_eq!(report.keep_time(), vec![true, false, false]);
    }

    #[test]
    fn test_below_platform() {
        let heights = array![0.0, 100.0, 200.0];
        let altitude = array![150.0];
        let keep = below_platform(heights.view(), altitude.view());
        assert_eq!(keep.row(0).to_vec(), vec![true, true, false]);
    }
}
