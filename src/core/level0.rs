//! Level-0 normalisation: raw instrument readings onto clean time axes

use crate::core::georeference::names;
use crate::core::interpolation::resample_mean;
use crate::types::{
    from_epoch_seconds, time_axis_seconds, HampError, HampResult, NavigationRecord,
    RadiometerModule, TimeIndexed, TimeSeries, Variable, VerticalAxis,
};
use chrono::{DateTime, Utc};
use ndarray::{concatenate, Array1, Array2, Axis};
use std::collections::BTreeMap;

/// Linear reflectivities and their dB counterparts
pub const LINEAR_REFLECTIVITY: [(&str, &str); 2] = [("Zg", "dBZg"), ("Ze", "dBZe")];

/// Brightness temperature variable of radiometer series
pub const BRIGHTNESS_TEMPERATURE: &str = "TBs";

/// Integrated water vapour variable
pub const IWV: &str = "IWV";

/// Line-of-sight length variable added to navigation-derived series
pub const LINE_OF_SIGHT: &str = "LOS";

/// Radiometer resampling interval in seconds
pub const RADIOMETER_INTERVAL_S: f64 = 1.0;

/// Cloud radar file contents
#[derive(Debug, Clone)]
pub struct RawRadar {
    /// Whole seconds since the Unix epoch
    pub seconds: Array1<f64>,
    pub microseconds: Array1<f64>,
    /// Range gates in metres
    pub range: Array1<f64>,
    /// (time, range) variables, linear units
    pub variables: BTreeMap<String, Array2<f64>>,
}

/// One radiometer module file
#[derive(Debug, Clone)]
pub struct RawRadiometer {
    pub module: RadiometerModule,
    pub time: Vec<DateTime<Utc>>,
    /// GHz
    pub frequency: Array1<f64>,
    /// (time, frequency) variables
    pub variables: BTreeMap<String, Array2<f64>>,
}

/// Retrieved integrated water vapour
#[derive(Debug, Clone)]
pub struct RawWaterVapour {
    pub time: Vec<DateTime<Utc>>,
    /// kg m-2
    pub iwv: Array1<f64>,
}

/// Indices that put `time` in increasing order, keeping the first of any
/// duplicated timestamps
pub fn sorted_unique_indices(time: &[DateTime<Utc>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..time.len()).collect();
    order.sort_by_key(|&i| time[i]);
    order.dedup_by_key(|i| time[*i]);
    order
}

fn log_dropped(name: &str, before: usize, after: usize) {
    if after < before {
        log::warn!("{}: dropped {} duplicated timestamps", name, before - after);
    }
}

/// `10 log10(x)`, missing for non-positive input
pub fn to_decibel(values: &Array2<f64>) -> Array2<f64> {
    values.mapv(|v| if v > 0.0 && v.is_finite() { 10.0 * v.log10() } else { f64::NAN })
}

/// Radar time axis from split seconds, sorted and de-duplicated, with dB
/// reflectivities added
pub fn fix_radar(raw: &RawRadar) -> HampResult<TimeSeries> {
    let n = raw.seconds.len();
    if n == 0 {
        return Err(HampError::MalformedRecord("radar: zero-length time axis".to_string()));
    }
    if raw.microseconds.len() != n {
        return Err(HampError::MalformedRecord(format!(
            "radar: {} seconds but {} microseconds",
            n,
            raw.microseconds.len()
        )));
    }
    let time = raw
        .seconds
        .iter()
        .zip(raw.microseconds.iter())
        .map(|(&s, &us)| {
            from_epoch_seconds(s + us * 1e-6).ok_or_else(|| {
                HampError::MalformedRecord(format!("radar: invalid timestamp {} s {} us", s, us))
            })
        })
        .collect::<HampResult<Vec<_>>>()?;

    let mut series = TimeSeries::new("radar", time);
    series.vertical = Some(VerticalAxis::Range(raw.range.clone()));
    for (name, values) in &raw.variables {
        series.insert_variable(name.as_str(), Variable::Profile(values.clone()))?;
    }
    for (linear, decibel) in LINEAR_REFLECTIVITY {
        if let Some(values) = raw.variables.get(linear) {
            series.insert_variable(decibel, Variable::Profile(to_decibel(values)))?;
        }
    }

    let order = sorted_unique_indices(&series.time);
    log_dropped(&series.name, n, order.len());
    let mut series = series.select_indices(&order);
    series.record_step("level0: time axis fixed, dB reflectivity added");
    series.validate()?;
    log::info!("Radar level 0: {} profiles x {} gates", series.len(), raw.range.len());
    Ok(series)
}

fn resample_spectrum(seconds: &Array1<f64>, values: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let mut starts = Array1::zeros(0);
    let mut columns = Vec::with_capacity(values.ncols());
    for column in values.axis_iter(Axis(1)) {
        let (s, means) = resample_mean(seconds.view(), column, RADIOMETER_INTERVAL_S);
        starts = s;
        columns.push(means);
    }
    let mut out = Array2::from_elem((starts.len(), columns.len()), f64::NAN);
    for (k, column) in columns.iter().enumerate() {
        out.column_mut(k).assign(column);
    }
    (starts, out)
}

fn resampled_time(name: &str, starts: &Array1<f64>) -> HampResult<Vec<DateTime<Utc>>> {
    starts
        .iter()
        .map(|&s| {
            from_epoch_seconds(s).ok_or_else(|| {
                HampError::MalformedRecord(format!("{}: invalid resampled time {}", name, s))
            })
        })
        .collect()
}

/// Radiometer module sorted, de-duplicated and averaged onto 1 s bins
/// anchored at the first sample
pub fn fix_radiometer(raw: &RawRadiometer) -> HampResult<TimeSeries> {
    let name = format!("radiometer {}", raw.module);
    if raw.time.is_empty() {
        return Err(HampError::MalformedRecord(format!("{}: zero-length time axis", name)));
    }
    let order = sorted_unique_indices(&raw.time);
    log_dropped(&name, raw.time.len(), order.len());
    let time: Vec<_> = order.iter().map(|&i| raw.time[i]).collect();
    let seconds = time_axis_seconds(&time);

    let mut resampled = BTreeMap::new();
    let mut starts = Array1::zeros(0);
    for (variable, values) in &raw.variables {
        if values.dim() != (raw.time.len(), raw.frequency.len()) {
            return Err(HampError::MalformedRecord(format!(
                "{}: '{}' has shape {:?}, expected ({}, {})",
                name,
                variable,
                values.dim(),
                raw.time.len(),
                raw.frequency.len()
            )));
        }
        let (s, means) = resample_spectrum(&seconds, &values.select(Axis(0), &order));
        starts = s;
        resampled.insert(variable.clone(), means);
    }
    if resampled.is_empty() {
        return Err(HampError::MalformedRecord(format!("{}: no variables", name)));
    }

    let mut series = TimeSeries::new(name.clone(), resampled_time(&name, &starts)?);
    series.frequency = Some(raw.frequency.clone());
    series.attrs.insert("module".to_string(), raw.module.directory().to_string());
    for (variable, values) in resampled {
        series.insert_variable(variable, Variable::Spectrum(values))?;
    }
    series.record_step("level0: sorted and resampled to 1 s");
    series.validate()?;
    log::info!("{} level 0: {} samples x {} channels", name, series.len(), raw.frequency.len());
    Ok(series)
}

/// Water vapour retrieval onto the same 1 s bins as the radiometers
pub fn fix_iwv(raw: &RawWaterVapour) -> HampResult<TimeSeries> {
    let name = "column_water_vapour";
    if raw.time.is_empty() || raw.iwv.len() != raw.time.len() {
        return Err(HampError::MalformedRecord(format!(
            "{}: {} times, {} values",
            name,
            raw.time.len(),
            raw.iwv.len()
        )));
    }
    let order = sorted_unique_indices(&raw.time);
    log_dropped(name, raw.time.len(), order.len());
    let time: Vec<_> = order.iter().map(|&i| raw.time[i]).collect();
    let values = raw.iwv.select(Axis(0), &order);
    let (starts, means) = resample_mean(time_axis_seconds(&time).view(), values.view(), RADIOMETER_INTERVAL_S);

    let mut series = TimeSeries::new(name, resampled_time(name, &starts)?);
    series.insert_variable(IWV, Variable::Series(means))?;
    series.record_step("level0: sorted and resampled to 1 s");
    series.validate()?;
    Ok(series)
}

/// Navigation sorted, de-duplicated and checked for unit consistency
pub fn fix_navigation(raw: &NavigationRecord) -> HampResult<NavigationRecord> {
    let order = sorted_unique_indices(&raw.time);
    log_dropped(&raw.source, raw.len(), order.len());
    let navigation = raw.select_indices(&order);
    navigation.validate()?;
    if navigation.lat.iter().all(|v| !v.is_finite()) {
        return Err(HampError::MalformedRecord(format!(
            "navigation '{}' has no valid positions",
            navigation.source
        )));
    }
    log::info!(
        "Navigation level 0: {} samples from {} ({})",
        navigation.len(),
        navigation.source,
        navigation.angle_unit
    );
    Ok(navigation)
}

/// Slant length from the aircraft to the surface along the nadir beam,
/// `altitude / cos(pitch) / cos(roll)`, from the georeference of `series`
pub fn line_of_sight(series: &TimeSeries) -> HampResult<Array1<f64>> {
    let altitude = series.series(names::PLANE_ALTITUDE)?;
    let pitch = series.series(names::PLANE_PITCH)?;
    let roll = series.series(names::PLANE_ROLL)?;
    Ok(Array1::from_iter((0..series.len()).map(|i| {
        altitude[i] / pitch[i].to_radians().cos() / roll[i].to_radians().cos()
    })))
}

/// Join radiometer modules along frequency on the union of their time axes.
///
/// Spectrum variables present in every module are concatenated; samples a
/// module did not record are missing. Series variables present in every
/// module take the first finite value across modules.
pub fn concat_radiometers(modules: &[&TimeSeries]) -> HampResult<TimeSeries> {
    let first = modules
        .first()
        .ok_or_else(|| HampError::MalformedRecord("no radiometer modules to join".to_string()))?;

    let mut time: Vec<DateTime<Utc>> = modules.iter().flat_map(|m| m.time.iter().copied()).collect();
    time.sort();
    time.dedup();

    let mut frequencies = Vec::new();
    for module in modules {
        let frequency = module.frequency.as_ref().ok_or_else(|| {
            HampError::MalformedRecord(format!("{}: no frequency axis", module.name))
        })?;
        frequencies.push(frequency.view());
    }
    let frequency = concatenate(Axis(0), &frequencies)
        .map_err(|e| HampError::Processing(format!("frequency concatenation failed: {}", e)))?;

    // row of each union timestamp in each module
    let rows: Vec<Vec<Option<usize>>> = modules
        .iter()
        .map(|m| time.iter().map(|t| m.time.binary_search(t).ok()).collect())
        .collect();

    let mut output = TimeSeries::new("radiometers", time);
    output.frequency = Some(frequency);
    output.attrs = first.attrs.clone();
    output.attrs.remove("module");

    for (name, variable) in &first.variables {
        let shared = modules.iter().all(|m| {
            matches!(
                (m.variables.get(name), variable),
                (Some(Variable::Spectrum(_)), Variable::Spectrum(_))
                    | (Some(Variable::Series(_)), Variable::Series(_))
            )
        });
        if !shared {
            log::debug!("'{}' is not shared by every radiometer module, dropped", name);
            continue;
        }
        let joined = match variable {
            Variable::Spectrum(_) => {
                let mut blocks = Vec::with_capacity(modules.len());
                for (module, module_rows) in modules.iter().zip(&rows) {
                    let values = module.spectrum(name)?;
                    let mut block = Array2::from_elem((output.len(), values.ncols()), f64::NAN);
                    for (t, row) in module_rows.iter().enumerate() {
                        if let Some(r) = row {
                            block.row_mut(t).assign(&values.row(*r));
                        }
                    }
                    blocks.push(block);
                }
                let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
                Variable::Spectrum(concatenate(Axis(1), &views).map_err(|e| {
                    HampError::Processing(format!("'{}' concatenation failed: {}", name, e))
                })?)
            }
            Variable::Series(_) => {
                let mut values = Array1::from_elem(output.len(), f64::NAN);
                for (module, module_rows) in modules.iter().zip(&rows) {
                    let source = module.series(name)?;
                    for (t, row) in module_rows.iter().enumerate() {
                        if let Some(r) = row {
                            if !values[t].is_finite() {
                                values[t] = source[*r];
                            }
                        }
                    }
                }
                Variable::Series(values)
            }
            Variable::Profile(_) => continue,
        };
        output.insert_variable(name.clone(), joined)?;
    }
    output.record_step("radiometer modules concatenated along frequency");
    Ok(output)
}
