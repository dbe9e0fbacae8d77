//! Satellite underpass and dropsonde colocation workflows

use crate::core::dataset::PostProcessedDataset;
use crate::core::interpolation::nearest_index;
use crate::core::level0::BRIGHTNESS_TEMPERATURE;
use crate::core::trajectory::{Colocation, NoMatchReason, TrajectoryMatcher};
use crate::types::{
    epoch_seconds, HampError, HampResult, TimeIndexed, TimeRange, TimeSeries, Trajectory,
    VerticalAxis,
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Satellite name used by the track provider for EarthCARE
pub const EARTHCARE: &str = "EARTHCARE";

/// External source of predicted satellite ground tracks
pub trait TrackProvider {
    /// Track covering the UTC day `date`
    fn track(&self, satellite: &str, date: NaiveDate) -> HampResult<Trajectory>;
}

/// Satellite track samples earlier than this after midnight are dropped;
/// predicted tracks carry the previous orbit there.
const TRACK_DAY_OFFSET_HOURS: i64 = 1;

/// Time the satellite passes closest to the aircraft on `date`
pub fn find_underpass(
    provider: &dyn TrackProvider,
    matcher: &TrajectoryMatcher,
    satellite: &str,
    date: NaiveDate,
    aircraft: &Trajectory,
) -> HampResult<Colocation> {
    let track = provider.track(satellite, date)?;
    let midnight = Utc.from_utc_datetime(
        &date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| HampError::Configuration(format!("invalid date {}", date)))?,
    );
    let cutoff = midnight + Duration::hours(TRACK_DAY_OFFSET_HOURS);
    let keep: Vec<usize> = (0..track.len()).filter(|&i| track.time[i] > cutoff).collect();
    if keep.is_empty() {
        log::warn!("{} track for {} has no samples after {}", satellite, date, cutoff);
        return Ok(Colocation::NoMatch(NoMatchReason::NoOverlap));
    }
    let track = track.select_indices(&keep);
    log::info!(
        "Searching {} underpass on {} ({} track samples)",
        satellite,
        date,
        track.len()
    );
    matcher.find_closest_approach(aircraft, &track)
}

/// Window of `window` length centred on an underpass
pub fn underpass_window(time: DateTime<Utc>, window: Duration) -> TimeRange {
    TimeRange::centred(time, window)
}

/// Parameters of the radar cloud flag used to select dropsondes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudFlagConfig {
    pub variable: String,
    /// Only heights above this (metres) are inspected
    pub min_height_m: f64,
    pub threshold_dbz: f64,
    /// Radar profiles further than this from the requested time are not used
    pub max_time_offset_s: f64,
}

impl Default for CloudFlagConfig {
    fn default() -> Self {
        Self {
            variable: "dBZe".to_string(),
            min_height_m: 200.0,
            threshold_dbz: -30.0,
            max_time_offset_s: 5.0,
        }
    }
}

/// Whether the radar profile nearest to `time` sees cloud above
/// `min_height_m`. `None` when no profile is close enough in time.
pub fn radar_cloud_flag(radar: &TimeSeries, time: DateTime<Utc>, config: &CloudFlagConfig) -> HampResult<Option<bool>> {
    let heights = match &radar.vertical {
        Some(VerticalAxis::Height(grid)) => grid.heights(),
        _ => {
            return Err(HampError::Processing(format!(
                "{}: cloud flag needs a geometric height axis",
                radar.name
            )))
        }
    };
    let values = radar.profile(&config.variable)?;
    let seconds = radar.time_seconds().to_vec();
    let target = epoch_seconds(&time);
    let row = match nearest_index(&seconds, target) {
        Some(row) if (seconds[row] - target).abs() <= config.max_time_offset_s => row,
        _ => return Ok(None),
    };
    let cloudy = values
        .row(row)
        .iter()
        .zip(heights.iter())
        .any(|(&v, &h)| h > config.min_height_m && v > config.threshold_dbz);
    Ok(Some(cloudy))
}

/// One dropsonde: its descent track and temperature profile
#[derive(Debug, Clone)]
pub struct Dropsonde {
    pub id: String,
    /// Descent positions; the first sample is the launch
    pub track: Trajectory,
    /// Kelvin; all-missing marks a broken sonde
    pub temperature: Array1<f64>,
}

impl Dropsonde {
    pub fn launch_time(&self) -> Option<DateTime<Utc>> {
        self.track.time.first().copied()
    }

    pub fn check(&self) -> HampResult<()> {
        self.track.validate()?;
        if self.temperature.iter().all(|t| !t.is_finite()) {
            return Err(HampError::MalformedRecord(format!(
                "dropsonde {} is broken (no valid temperature)",
                self.id
            )));
        }
        Ok(())
    }
}

/// Aircraft state and HAMP observations at a sonde launch
#[derive(Debug, Clone, Serialize)]
pub struct SondeColocation {
    pub sonde_id: String,
    pub aircraft_time: DateTime<Utc>,
    pub distance_m: f64,
    pub radar_cloud_flag: Option<bool>,
    /// Brightness temperatures at `aircraft_time`, ordered as `frequency`
    pub brightness_temperature: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SondeReport {
    pub colocated: Vec<SondeColocation>,
    /// Sonde id and reason
    pub skipped: Vec<(String, String)>,
    /// Frequency axis of the brightness temperatures
    pub frequency: Option<Vec<f64>>,
}

impl SondeReport {
    /// Sondes the radar saw no cloud for
    pub fn cloud_free(&self) -> Vec<&SondeColocation> {
        self.colocated
            .iter()
            .filter(|c| c.radar_cloud_flag == Some(false))
            .collect()
    }
}

fn brightness_at(radiometers: &TimeSeries, time: DateTime<Utc>, max_offset_s: f64) -> Option<Vec<f64>> {
    let seconds = radiometers.time_seconds().to_vec();
    let target = epoch_seconds(&time);
    let row = nearest_index(&seconds, target)?;
    if (seconds[row] - target).abs() > max_offset_s {
        return None;
    }
    let tb = radiometers.spectrum(BRIGHTNESS_TEMPERATURE).ok()?;
    Some(tb.row(row).to_vec())
}

/// Colocate every sonde with the aircraft and read the HAMP observations
/// at its launch. Broken or malformed sondes and sondes without a
/// colocation are skipped and reported; other errors abort.
pub fn colocate_sondes(
    sondes: &[Dropsonde],
    aircraft: &Trajectory,
    dataset: &PostProcessedDataset,
    matcher: &TrajectoryMatcher,
    cloud: &CloudFlagConfig,
) -> HampResult<SondeReport> {
    let radiometers = match dataset.concatenated_radiometers() {
        Ok(radiometers) => Some(radiometers),
        Err(HampError::ChannelMissing(channel)) => {
            log::warn!("No {} channel, sonde brightness temperatures left empty", channel);
            None
        }
        Err(e) => return Err(e),
    };
    let radar = dataset.radar().ok();
    let mut report = SondeReport {
        frequency: radiometers
            .as_ref()
            .and_then(|r| r.frequency.as_ref().map(|f| f.to_vec())),
        ..SondeReport::default()
    };

    for sonde in sondes {
        if let Err(e) = sonde.check() {
            log::warn!("Skipping dropsonde {}: {}", sonde.id, e);
            report.skipped.push((sonde.id.clone(), e.to_string()));
            continue;
        }
        let approach = match matcher.find_closest_approach(&sonde.track, aircraft) {
            Ok(Colocation::Found(approach)) => approach,
            Ok(Colocation::NoMatch(reason)) => {
                log::warn!("Dropsonde {} not colocated: {:?}", sonde.id, reason);
                report.skipped.push((sonde.id.clone(), format!("{:?}", reason)));
                continue;
            }
            Err(HampError::MalformedRecord(msg)) => {
                log::warn!("Skipping dropsonde {}: {}", sonde.id, msg);
                report.skipped.push((sonde.id.clone(), msg));
                continue;
            }
            Err(e) => return Err(e),
        };

        let radar_cloud_flag = match radar {
            Some(radar) => radar_cloud_flag(radar, approach.time, cloud)?,
            None => None,
        };
        let brightness_temperature = radiometers
            .as_ref()
            .and_then(|r| brightness_at(r, approach.time, cloud.max_time_offset_s));

        log::debug!(
            "Dropsonde {} at {} ({:.0} m from HALO), cloud flag {:?}",
            sonde.id,
            approach.time,
            approach.distance_m,
            radar_cloud_flag
        );
        report.colocated.push(SondeColocation {
            sonde_id: sonde.id.clone(),
            aircraft_time: approach.time,
            distance_m: approach.distance_m,
            radar_cloud_flag,
            brightness_temperature,
        });
    }

    log::info!(
        "Colocated {} of {} dropsondes ({} cloud free, {} skipped)",
        report.colocated.len(),
        sondes.len(),
        report.cloud_free().len(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HeightGrid, Variable};
    use ndarray::{array, Array2};

    fn t(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_724_000_000 + seconds, 0).unwrap()
    }

    fn radar() -> TimeSeries {
        let mut radar = TimeSeries::new("radar", vec![t(0), t(1)]);
        radar.vertical = Some(VerticalAxis::Height(HeightGrid::new(array![0.0, 150.0, 300.0]).unwrap()));
        // surface return only, then a cloud at 300 m
        let dbze = Array2::from_shape_vec((2, 3), vec![10.0, -50.0, -50.0, 10.0, -50.0, 5.0]).unwrap();
        radar.insert_variable("dBZe", Variable::Profile(dbze)).unwrap();
        radar
    }

    #[test]
    fn test_cloud_flag_ignores_low_levels() {
        let config = CloudFlagConfig::default();
        assert_eq!(radar_cloud_flag(&radar(), t(0), &config).unwrap(), Some(false));
        assert_eq!(radar_cloud_flag(&radar(), t(1), &config).unwrap(), Some(true));
        assert_eq!(radar_cloud_flag(&radar(), t(60), &config).unwrap(), None);
    }

    #[test]
    fn test_broken_sonde_is_malformed() {
        let sonde = Dropsonde {
            id: "s1".to_string(),
            track: Trajectory::new("s1", vec![t(0)], array![10.0], array![-40.0]).unwrap(),
            temperature: array![f64::NAN, f64::NAN],
        };
        assert!(matches!(sonde.check(), Err(HampError::MalformedRecord(_))));
    }
}
