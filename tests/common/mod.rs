//! Synthetic HALO flight shared by the integration tests
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use hamproc::core::level0::{RawRadar, RawRadiometer, RawWaterVapour};
use hamproc::core::pipeline::InstrumentSource;
use hamproc::io::sea_land_mask::GridTransform;
use hamproc::types::{AngleUnit, HampError, HampResult, NavigationRecord, RadiometerModule, TimeSeries, Variable};
use hamproc::{FlightConfig, QualityAnnotations, SeaLandMask};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

pub const FLIGHT_SECONDS: usize = 60;
pub const NAV_RATE_HZ: usize = 4;
pub const ALTITUDE_M: f64 = 10_000.0;
pub const GATE_SPACING_M: f64 = 30.0;
pub const GATES: usize = 335;
/// Seconds with the aircraft banked beyond the attitude limit
pub const BANKED: std::ops::Range<usize> = 20..25;
pub const BANK_ROLL_DEG: f64 = 12.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 11, 12, 0, 0).unwrap()
}

pub fn at(seconds: f64) -> DateTime<Utc> {
    t0() + Duration::milliseconds((seconds * 1000.0).round() as i64)
}

pub fn flight_config(letter: &str) -> FlightConfig {
    let text = format!(
        r#"
flight: RF03
date: "20240811"
flightletter: {}
is_planet: false
paths:
  bahamas: /data/HALO-{{date}}{{flightletter}}/bahamas/QL_HALO-{{date}}{{flightletter}}_BAHAMAS_V01.nc
  radiometer: /data/HALO-{{date}}{{flightletter}}/radiometer
  radar: /data/HALO-{{date}}{{flightletter}}/radar/*{{yymmdd}}*.nc
"#,
        letter
    );
    FlightConfig::from_yaml_str(&text).unwrap()
}

/// Northbound straight leg at 10 km with one banked turn
pub fn navigation() -> NavigationRecord {
    let n = FLIGHT_SECONDS * NAV_RATE_HZ;
    let seconds = |i: usize| i as f64 / NAV_RATE_HZ as f64;
    let roll = Array1::from_iter((0..n).map(|i| {
        if BANKED.contains(&(seconds(i) as usize)) {
            BANK_ROLL_DEG
        } else {
            0.0
        }
    }));
    NavigationRecord {
        time: (0..n).map(|i| at(seconds(i))).collect(),
        lat: Array1::from_iter((0..n).map(|i| plane_lat(seconds(i)))),
        lon: Array1::from_elem(n, -57.0),
        altitude: Array1::from_elem(n, ALTITUDE_M),
        pitch: Array1::from_elem(n, 0.5),
        roll,
        heading: None,
        angle_unit: AngleUnit::Degrees,
        source: "BAHAMAS".to_string(),
    }
}

pub fn plane_lat(seconds: f64) -> f64 {
    13.0 + 0.001 * seconds
}

pub fn range_gates() -> Array1<f64> {
    Array1::from_iter((0..GATES).map(|g| g as f64 * GATE_SPACING_M))
}

/// Linear reflectivity: surface return near 10 km range, a cloud between
/// 7 and 8 km range and clear air elsewhere
pub fn radar() -> RawRadar {
    let range = range_gates();
    let zg = Array2::from_shape_fn((FLIGHT_SECONDS, GATES), |(_, g)| {
        let r = range[g];
        if r >= 9_960.0 {
            1e3
        } else if (7_000.0..=8_000.0).contains(&r) {
            10.0
        } else {
            1e-4
        }
    });
    let mut variables = BTreeMap::new();
    variables.insert("Zg".to_string(), zg);
    let start = t0().timestamp() as f64;
    RawRadar {
        seconds: Array1::from_iter((0..FLIGHT_SECONDS).map(|k| start + k as f64)),
        microseconds: Array1::zeros(FLIGHT_SECONDS),
        range,
        variables,
    }
}

pub fn module_frequencies(module: RadiometerModule) -> Vec<f64> {
    match module {
        RadiometerModule::G183 => vec![183.91, 184.81, 185.81, 186.81, 188.31, 190.81],
        RadiometerModule::WF11990 => vec![90.0, 120.15, 121.05, 122.95, 127.25],
        RadiometerModule::KV => vec![
            22.24, 23.04, 23.84, 25.44, 26.24, 27.84, 31.4, 50.3, 51.76, 52.8, 53.75, 54.94, 56.66, 58.0,
        ],
    }
}

pub fn radiometer(module: RadiometerModule) -> RawRadiometer {
    let frequency = Array1::from(module_frequencies(module));
    let n = FLIGHT_SECONDS * NAV_RATE_HZ;
    let tbs = Array2::from_shape_fn((n, frequency.len()), |(_, k)| 200.0 + frequency[k] * 0.25);
    let mut variables = BTreeMap::new();
    variables.insert("TBs".to_string(), tbs);
    RawRadiometer {
        module,
        time: (0..n).map(|i| at(i as f64 / NAV_RATE_HZ as f64)).collect(),
        frequency,
        variables,
    }
}

pub fn water_vapour() -> RawWaterVapour {
    RawWaterVapour {
        time: (0..FLIGHT_SECONDS).map(|k| at(k as f64)).collect(),
        iwv: Array1::from_elem(FLIGHT_SECONDS, 42.0),
    }
}

/// Ocean everywhere except one 0.01 degree strip of land around 13.045 N
pub fn sea_land_mask() -> SeaLandMask {
    let transform = GridTransform {
        top_left_lon: -58.0,
        pixel_width: 0.01,
        top_left_lat: 14.0,
        pixel_height: -0.01,
    };
    let mut land = Array2::zeros((200, 200));
    land.row_mut(95).fill(1u8);
    SeaLandMask::new(land, transform).unwrap()
}

/// 183 GHz channels excluded between 12:00:10 and 12:00:15
pub fn annotations() -> QualityAnnotations {
    QualityAnnotations::from_yaml_str(
        r#"
"183":
  times:
    - ["12:00:10", "12:00:15"]
"#,
    )
    .unwrap()
}

/// In-memory instrument archive. Flights whose letter is listed in
/// `broken_radar` fail to read their radar file.
#[derive(Default)]
pub struct SyntheticSource {
    pub broken_radar: Vec<String>,
    pub with_surface_data: bool,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self {
            broken_radar: Vec::new(),
            with_surface_data: true,
        }
    }
}

impl InstrumentSource for SyntheticSource {
    fn navigation(&self, _flight: &FlightConfig) -> HampResult<NavigationRecord> {
        Ok(navigation())
    }

    fn radar(&self, flight: &FlightConfig) -> HampResult<RawRadar> {
        if self.broken_radar.contains(&flight.flightletter) {
            return Err(HampError::MalformedRecord(format!(
                "{}: radar file is truncated",
                flight.flightname()
            )));
        }
        Ok(radar())
    }

    fn radiometer(&self, _flight: &FlightConfig, module: RadiometerModule) -> HampResult<RawRadiometer> {
        Ok(radiometer(module))
    }

    fn water_vapour(&self, _flight: &FlightConfig) -> HampResult<RawWaterVapour> {
        Ok(water_vapour())
    }

    fn sea_land_mask(&self) -> HampResult<Option<SeaLandMask>> {
        Ok(self.with_surface_data.then(sea_land_mask))
    }

    fn annotations(&self, _flight: &FlightConfig) -> HampResult<Option<QualityAnnotations>> {
        Ok(self.with_surface_data.then(annotations))
    }
}

fn same_values(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| (x.is_nan() && y.is_nan()) || x == y)
}

/// Equality that treats missing values as equal
pub fn same_series(a: &TimeSeries, b: &TimeSeries) -> bool {
    if a.time != b.time || a.vertical != b.vertical || a.frequency != b.frequency {
        return false;
    }
    if a.variables.keys().ne(b.variables.keys()) {
        return false;
    }
    a.variables.iter().all(|(name, va)| match (va, &b.variables[name]) {
        (Variable::Series(x), Variable::Series(y)) => same_values(&x.to_vec(), &y.to_vec()),
        (Variable::Profile(x), Variable::Profile(y)) | (Variable::Spectrum(x), Variable::Spectrum(y)) => {
            x.dim() == y.dim() && same_values(&x.iter().copied().collect::<Vec<_>>(), &y.iter().copied().collect::<Vec<_>>())
        }
        _ => false,
    })
}
