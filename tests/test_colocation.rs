mod common;

use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use common::*;
use hamproc::core::colocation::{colocate_sondes, find_underpass, underpass_window, Dropsonde, TrackProvider, EARTHCARE};
use hamproc::core::georeference::names;
use hamproc::core::pipeline::{Pipeline, ProcessingConfig};
use hamproc::core::trajectory::{Colocation, MatchConfig, NoMatchReason, TrajectoryMatcher};
use hamproc::types::{HampError, HampResult, Trajectory};
use ndarray::Array1;

/// Eastbound along 10 N, passing 40 W after 500 s
fn aircraft() -> Trajectory {
    let n = 1001;
    Trajectory::new(
        "HALO",
        (0..n).map(|i| at(i as f64)).collect(),
        Array1::from_elem(n, 10.0),
        Array1::from_iter((0..n).map(|i| -40.5 + i as f64 / 1000.0)),
    )
    .unwrap()
}

/// Northbound along `lon`, 0.25 s sampling, reaching 10 N after 500 s
fn satellite(lon: f64) -> Trajectory {
    let n = 4001;
    Trajectory::new(
        EARTHCARE,
        (0..n).map(|i| at(i as f64 * 0.25)).collect(),
        Array1::from_iter((0..n).map(|i| 9.5 + i as f64 * 0.25 / 1000.0)),
        Array1::from_elem(n, lon),
    )
    .unwrap()
}

#[test]
fn test_crossing_is_found() {
    init_logging();
    let matcher = TrajectoryMatcher::new(MatchConfig::default());
    let approach = matcher
        .find_closest_approach(&aircraft(), &satellite(-40.0))
        .unwrap()
        .into_result()
        .unwrap();
    println!("Closest approach at {} ({:.1} m)", approach.time, approach.distance_m);
    assert!((approach.time - at(500.0)).num_milliseconds().abs() <= 1000);
    assert!(approach.distance_m < 1_000.0);
    // the faster sampled track provides the clock
    assert_eq!(approach.reference, EARTHCARE);
}

#[test]
fn test_far_tracks_do_not_colocate() {
    init_logging();
    let matcher = TrajectoryMatcher::new(MatchConfig::default());
    let outcome = matcher.find_closest_approach(&aircraft(), &satellite(-38.9)).unwrap();
    match &outcome {
        Colocation::NoMatch(NoMatchReason::TooFar { min_distance_m }) => {
            assert!(*min_distance_m > 50_000.0);
        }
        other => panic!("expected TooFar, got {:?}", other),
    }
    assert!(matches!(
        outcome.into_result(),
        Err(HampError::NoColocation { min_distance_m: Some(_) })
    ));
}

#[test]
fn test_matching_is_symmetric() {
    let matcher = TrajectoryMatcher::new(MatchConfig::default());
    let ab = matcher.find_closest_approach(&aircraft(), &satellite(-40.0)).unwrap();
    let ba = matcher.find_closest_approach(&satellite(-40.0), &aircraft()).unwrap();
    assert_eq!(ab.time(), ba.time());
}

struct FixedTrack(Trajectory);

impl TrackProvider for FixedTrack {
    fn track(&self, satellite: &str, _date: NaiveDate) -> HampResult<Trajectory> {
        assert_eq!(satellite, EARTHCARE);
        Ok(self.0.clone())
    }
}

#[test]
fn test_underpass_and_window() {
    init_logging();
    let matcher = TrajectoryMatcher::new(MatchConfig::default());
    let date = NaiveDate::from_ymd_opt(2024, 8, 11).unwrap();
    let provider = FixedTrack(satellite(-40.0));
    let underpass = find_underpass(&provider, &matcher, EARTHCARE, date, &aircraft())
        .unwrap()
        .into_result()
        .unwrap();
    let window = underpass_window(underpass.time, Duration::minutes(10));
    assert_eq!(window.end - window.start, Duration::minutes(10));
    assert!(window.contains(&underpass.time));
}

#[test]
fn test_underpass_ignores_previous_orbit() {
    let matcher = TrajectoryMatcher::new(MatchConfig::default());
    let date = NaiveDate::from_ymd_opt(2024, 8, 11).unwrap();
    // track entirely in the first hour of the day
    let mut early = satellite(-40.0);
    early.time = early.time.iter().map(|t| *t - Duration::hours(11) - Duration::minutes(30)).collect();
    let outcome = find_underpass(&FixedTrack(early), &matcher, EARTHCARE, date, &aircraft()).unwrap();
    assert_eq!(outcome, Colocation::NoMatch(NoMatchReason::NoOverlap));
}

fn sonde(id: &str, launch_s: f64, temperature: f64) -> Dropsonde {
    let n = 20;
    let nav = navigation();
    let i = (launch_s as usize) * NAV_RATE_HZ;
    Dropsonde {
        id: id.to_string(),
        track: Trajectory::new(
            id,
            (0..n).map(|k| at(launch_s + k as f64 * 10.0)).collect(),
            Array1::from_elem(n, nav.lat[i]),
            Array1::from_elem(n, nav.lon[i] + 0.001),
        )
        .unwrap(),
        temperature: Array1::from_elem(n, temperature),
    }
}

#[test]
fn test_sondes_are_colocated_and_broken_ones_skipped() {
    init_logging();
    let pipeline = Pipeline::new(ProcessingConfig::default()).unwrap();
    let dataset = pipeline
        .process_flight(&SyntheticSource::new(), &flight_config("a"))
        .unwrap()
        .dataset;
    let aircraft = dataset.navigation().unwrap().trajectory();
    let matcher = TrajectoryMatcher::new(MatchConfig::default());

    let sondes = vec![
        sonde("240811_120005", 5.0, 290.0),
        sonde("240811_120030", 30.0, f64::NAN),
    ];
    let mut cloud = pipeline.config().cloud_flag.clone();
    cloud.variable = "dBZg".to_string();
    let report = colocate_sondes(&sondes, &aircraft, &dataset, &matcher, &cloud).unwrap();

    assert_eq!(report.colocated.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].0, "240811_120030");

    let hit = &report.colocated[0];
    assert!((hit.aircraft_time - at(5.0)).num_milliseconds().abs() <= 250);
    assert!(hit.distance_m < 200.0);
    // the synthetic cloud sits at 2-3 km
    assert_eq!(hit.radar_cloud_flag, Some(true));
    let frequency = report.frequency.as_ref().unwrap();
    let tb = hit.brightness_temperature.as_ref().unwrap();
    assert_eq!(tb.len(), frequency.len());
    assert_abs_diff_eq!(tb[0], 200.0 + frequency[0] * 0.25, epsilon = 1e-9);

    let lat = dataset.radar().unwrap().series(names::PLANE_LAT).unwrap();
    assert_abs_diff_eq!(lat[5], plane_lat(5.0), epsilon = 1e-9);
}
