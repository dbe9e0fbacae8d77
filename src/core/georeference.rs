use crate::core::geodesy::{initial_bearing, offset_position};
use crate::core::interpolation::{align_periodic, align_to, AlignmentMethod};
use crate::types::{
    AngleUnit, HampResult, NavigationRecord, TimeSeries, Variable, GEOREFERENCE_SOURCE_ATTR,
};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Variable names written by [`GeoreferenceEngine::add_georeference`]
pub mod names {
    pub const PLANE_LAT: &str = "plane_lat";
    pub const PLANE_LON: &str = "plane_lon";
    pub const PLANE_ALTITUDE: &str = "plane_altitude";
    /// Degrees, whatever the navigation unit was
    pub const PLANE_PITCH: &str = "plane_pitch";
    pub const PLANE_ROLL: &str = "plane_roll";
    pub const PLANE_HEADING: &str = "plane_heading";
    /// Ground footprint of the nadir beam
    pub const LAT: &str = "lat";
    pub const LON: &str = "lon";

    pub const ALL: [&str; 8] = [
        PLANE_LAT,
        PLANE_LON,
        PLANE_ALTITUDE,
        PLANE_PITCH,
        PLANE_ROLL,
        PLANE_HEADING,
        LAT,
        LON,
    ];

    /// Georeference variables are coordinates and are never masked
    pub fn is_coordinate(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Beam offsets below this (metres) leave the footprint under the aircraft
const NEGLIGIBLE_OFFSET_M: f64 = 0.01;

/// Carry the last valid value forward, then the first valid value back
/// over any leading gap. All-missing input is left as is.
fn fill_missing(values: &mut Array1<f64>) {
    let mut last = f64::NAN;
    for v in values.iter_mut() {
        if v.is_finite() {
            last = *v;
        } else {
            *v = last;
        }
    }
    if let Some(first) = values.iter().copied().find(|v| v.is_finite()) {
        for v in values.iter_mut().take_while(|v| !v.is_finite()) {
            *v = first;
        }
    }
}

/// Attitude unit of the `plane_*` angle variables
pub const ATTITUDE_UNIT_ATTR: &str = "attitude_unit";

/// Georeferencing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoreferenceConfig {
    /// Alignment of navigation onto the instrument clock
    pub alignment: AlignmentMethod,
    /// Navigation samples further apart than this (seconds) are a gap
    pub max_gap_s: Option<f64>,
    /// Shift the ground position by the attitude-induced beam offset
    pub project_footprint: bool,
    /// Track samples closer than this (metres) carry no course information
    pub min_course_distance_m: f64,
}

impl Default for GeoreferenceConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentMethod::Linear,
            max_gap_s: Some(5.0),
            project_footprint: true,
            min_course_distance_m: 1.0,
        }
    }
}

/// Navigation channels carried onto an instrument time axis
#[derive(Debug, Clone)]
pub struct AlignedNavigation {
    pub lat: Array1<f64>,
    pub lon: Array1<f64>,
    pub altitude: Array1<f64>,
    /// Degrees
    pub pitch: Array1<f64>,
    /// Degrees
    pub roll: Array1<f64>,
    /// Degrees clockwise from north
    pub heading: Array1<f64>,
}

impl AlignedNavigation {
    fn missing(n: usize) -> Self {
        let nan = Array1::from_elem(n, f64::NAN);
        Self {
            lat: nan.clone(),
            lon: nan.clone(),
            altitude: nan.clone(),
            pitch: nan.clone(),
            roll: nan.clone(),
            heading: nan,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.lat
            .iter()
            .zip(self.lon.iter())
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .count()
    }
}

/// Attaches aircraft position and attitude to instrument samples
pub struct GeoreferenceEngine {
    config: GeoreferenceConfig,
}

impl GeoreferenceEngine {
    pub fn new(config: GeoreferenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeoreferenceConfig {
        &self.config
    }

    /// Align every navigation channel onto `target_time` (epoch seconds).
    ///
    /// Attitude angles come back in degrees. Non-overlapping time ranges
    /// give all-missing channels.
    pub fn align_navigation(
        &self,
        navigation: &NavigationRecord,
        target_time: ArrayView1<f64>,
    ) -> HampResult<AlignedNavigation> {
        navigation.validate()?;
        let n = target_time.len();
        let source_time = navigation.time_seconds();

        if !Self::overlaps(source_time.view(), target_time) {
            log::warn!(
                "Navigation '{}' does not overlap the {} target samples; georeference is missing",
                navigation.source,
                n
            );
            return Ok(AlignedNavigation::missing(n));
        }

        let method = self.config.alignment;
        let gap = self.config.max_gap_s;
        let unit = navigation.angle_unit;
        let to_degrees = |values: &Array1<f64>| values.mapv(|v| unit.to_degrees(v));

        let heading_deg = match &navigation.heading {
            Some(heading) => to_degrees(heading),
            None => self.course_from_track(navigation),
        };

        Ok(AlignedNavigation {
            lat: align_to(source_time.view(), navigation.lat.view(), target_time, method, gap),
            lon: align_periodic(source_time.view(), navigation.lon.view(), target_time, method, gap, 360.0),
            altitude: align_to(source_time.view(), navigation.altitude.view(), target_time, method, gap),
            pitch: align_to(source_time.view(), to_degrees(&navigation.pitch).view(), target_time, method, gap),
            roll: align_to(source_time.view(), to_degrees(&navigation.roll).view(), target_time, method, gap),
            heading: align_periodic(source_time.view(), heading_deg.view(), target_time, method, gap, 360.0)
                .mapv(|h| h.rem_euclid(360.0)),
        })
    }

    /// Attach plane position, attitude and ground footprint to `series`.
    ///
    /// Returns a new series carrying the variables listed in [`names`] and
    /// the navigation source as provenance. Samples outside the navigation
    /// coverage get missing georeference instead of an error.
    pub fn add_georeference(
        &self,
        series: &TimeSeries,
        navigation: &NavigationRecord,
    ) -> HampResult<TimeSeries> {
        log::info!(
            "Georeferencing {} ({} samples) with '{}' ({} samples, {})",
            series.name,
            series.len(),
            navigation.source,
            navigation.len(),
            navigation.angle_unit
        );

        let time = series.time_seconds();
        let aligned = self.align_navigation(navigation, time.view())?;
        let (ground_lat, ground_lon) = self.project_footprint(&aligned);

        let mut output = series.clone();
        let variables = [
            (names::PLANE_LAT, aligned.lat),
            (names::PLANE_LON, aligned.lon),
            (names::PLANE_ALTITUDE, aligned.altitude),
            (names::PLANE_PITCH, aligned.pitch),
            (names::PLANE_ROLL, aligned.roll),
            (names::PLANE_HEADING, aligned.heading),
            (names::LAT, ground_lat),
            (names::LON, ground_lon),
        ];
        for (name, values) in variables {
            output.insert_variable(name, Variable::Series(values))?;
        }
        output
            .attrs
            .insert(GEOREFERENCE_SOURCE_ATTR.to_string(), navigation.source.clone());
        output
            .attrs
            .insert(ATTITUDE_UNIT_ATTR.to_string(), AngleUnit::Degrees.to_string());
        output.record_step(&format!("georeferenced with {}", navigation.source));

        let valid = output.series(names::LAT).map(|lat| lat.iter().filter(|v| v.is_finite()).count())?;
        let coverage = if series.is_empty() {
            0.0
        } else {
            valid as f64 / series.len() as f64 * 100.0
        };
        log::info!("Georeference coverage for {}: {:.1}%", series.name, coverage);

        Ok(output)
    }

    /// Ground position hit by a downward-looking beam fixed to the airframe.
    ///
    /// Positive pitch (nose up) tilts the beam aft, positive roll (right
    /// wing down) tilts it to the left of track.
    fn project_footprint(&self, nav: &AlignedNavigation) -> (Array1<f64>, Array1<f64>) {
        if !self.config.project_footprint {
            return (nav.lat.clone(), nav.lon.clone());
        }
        let n = nav.lat.len();
        let mut lat = Array1::from_elem(n, f64::NAN);
        let mut lon = Array1::from_elem(n, f64::NAN);
        for i in 0..n {
            let altitude = nav.altitude[i];
            let heading = nav.heading[i].to_radians();
            let forward = -altitude * nav.pitch[i].to_radians().tan();
            let right = -altitude * nav.roll[i].to_radians().tan();
            if !(forward.is_finite() && right.is_finite()) {
                continue;
            }
            if !heading.is_finite() {
                // without a course only a vertical beam can be placed
                if forward.abs().max(right.abs()) < NEGLIGIBLE_OFFSET_M {
                    lat[i] = nav.lat[i];
                    lon[i] = nav.lon[i];
                }
                continue;
            }
            let north = forward * heading.cos() - right * heading.sin();
            let east = forward * heading.sin() + right * heading.cos();
            let (p_lat, p_lon) = offset_position(nav.lat[i], nav.lon[i], north, east);
            lat[i] = p_lat;
            lon[i] = p_lon;
        }
        (lat, lon)
    }

    /// Course over ground from consecutive track positions, degrees
    fn course_from_track(&self, navigation: &NavigationRecord) -> Array1<f64> {
        let n = navigation.len();
        let mut course = Array1::from_elem(n, f64::NAN);
        if n < 2 {
            return course;
        }
        let min_step = self.config.min_course_distance_m;
        for i in 0..n {
            let (a, b) = if i + 1 < n { (i, i + 1) } else { (i - 1, i) };
            let (lat1, lon1) = (navigation.lat[a], navigation.lon[a]);
            let (lat2, lon2) = (navigation.lat[b], navigation.lon[b]);
            let step = crate::core::geodesy::haversine_distance(lat1, lon1, lat2, lon2);
            if step.is_finite() && step >= min_step {
                course[i] = initial_bearing(lat1, lon1, lat2, lon2);
            }
        }
        fill_missing(&mut course);
        course
    }

    fn overlaps(source: ArrayView1<f64>, target: ArrayView1<f64>) -> bool {
        if source.is_empty() || target.is_empty() {
            return false;
        }
        let (s0, s1) = (source[0], source[source.len() - 1]);
        let (t0, t1) = (target[0], target[target.len() - 1]);
        s0 <= t1 && t0 <= s1
    }
}
