mod common;

use approx::assert_abs_diff_eq;
use common::*;
use hamproc::core::height_correction::{HeightGridConfig, HeightRegridder};
use hamproc::core::level0::fix_radar;
use hamproc::types::{AngleUnit, HampError, VerticalAxis};
use ndarray::Array1;

fn heights_of(axis: &Option<VerticalAxis>) -> Array1<f64> {
    match axis {
        Some(VerticalAxis::Height(grid)) => grid.heights().clone(),
        other => panic!("expected a height axis, got {:?}", other),
    }
}

#[test]
fn test_grid_is_shared_across_attitudes() {
    init_logging();
    let radar = fix_radar(&radar()).unwrap();
    let regridder = HeightRegridder::new(HeightGridConfig::default());
    let altitude = Array1::from_elem(FLIGHT_SECONDS, ALTITUDE_M);

    let attitudes = [(0.0, 0.0), (2.5, 0.0), (0.0, 8.0), (-1.0, -15.0)];
    let corrected: Vec<_> = attitudes
        .iter()
        .map(|&(pitch, roll)| {
            regridder
                .correct_radar_height(
                    &radar,
                    Array1::from_elem(FLIGHT_SECONDS, pitch).view(),
                    Array1::from_elem(FLIGHT_SECONDS, roll).view(),
                    altitude.view(),
                    AngleUnit::Degrees,
                )
                .unwrap()
        })
        .collect();

    let reference = heights_of(&corrected[0].vertical);
    for series in &corrected[1..] {
        assert_eq!(heights_of(&series.vertical), reference);
        assert_eq!(series.profile("dBZg").unwrap().ncols(), reference.len());
    }
    println!("{} attitudes share a {}-level grid", attitudes.len(), reference.len());

    // tilting the beam shortens the vertical reach of each gate, so the
    // cloud appears higher
    let level = corrected[0].profile("dBZg").unwrap();
    let banked = corrected[3].profile("dBZg").unwrap();
    let top_of_cloud = |row: ndarray::ArrayView1<f64>| {
        row.iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite() && **v > 0.0)
            .map(|(k, _)| k)
            .max()
            .unwrap()
    };
    assert!(top_of_cloud(banked.row(0)) > top_of_cloud(level.row(0)));
}

#[test]
fn test_radians_match_degrees() {
    let radar = fix_radar(&radar()).unwrap();
    let regridder = HeightRegridder::new(HeightGridConfig::default());
    let altitude = Array1::from_elem(FLIGHT_SECONDS, ALTITUDE_M);
    let deg = regridder
        .correct_radar_height(
            &radar,
            Array1::from_elem(FLIGHT_SECONDS, 3.0).view(),
            Array1::from_elem(FLIGHT_SECONDS, 4.0).view(),
            altitude.view(),
            AngleUnit::Degrees,
        )
        .unwrap();
    let rad = regridder
        .correct_radar_height(
            &radar,
            Array1::from_elem(FLIGHT_SECONDS, 3.0_f64.to_radians()).view(),
            Array1::from_elem(FLIGHT_SECONDS, 4.0_f64.to_radians()).view(),
            altitude.view(),
            AngleUnit::Radians,
        )
        .unwrap();
    let a = deg.profile("dBZg").unwrap();
    let b = rad.profile("dBZg").unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        if x.is_nan() {
            assert!(y.is_nan());
        } else {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_degree_values_declared_as_radians_are_rejected() {
    let radar = fix_radar(&radar()).unwrap();
    let regridder = HeightRegridder::new(HeightGridConfig::default());
    let result = regridder.correct_radar_height(
        &radar,
        Array1::from_elem(FLIGHT_SECONDS, 30.0).view(),
        Array1::zeros(FLIGHT_SECONDS).view(),
        Array1::from_elem(FLIGHT_SECONDS, ALTITUDE_M).view(),
        AngleUnit::Radians,
    );
    assert!(result.is_err());
}

#[test]
fn test_attitude_length_mismatch_is_malformed() {
    let radar = fix_radar(&radar()).unwrap();
    let regridder = HeightRegridder::new(HeightGridConfig::default());
    let result = regridder.correct_radar_height(
        &radar,
        Array1::zeros(FLIGHT_SECONDS - 1).view(),
        Array1::zeros(FLIGHT_SECONDS).view(),
        Array1::from_elem(FLIGHT_SECONDS, ALTITUDE_M).view(),
        AngleUnit::Degrees,
    );
    assert!(matches!(result, Err(HampError::MalformedRecord(_))));
}

#[test]
fn test_open_top_follows_highest_altitude() {
    let regridder = HeightRegridder::new(HeightGridConfig {
        top_m: None,
        ..HeightGridConfig::default()
    });
    let altitude = Array1::from(vec![8_000.0, f64::NAN, 9_005.0]);
    let grid = regridder.grid_for_altitude(altitude.view()).unwrap();
    let top = grid.heights()[grid.len() - 1];
    assert!(top >= 9_005.0);
    assert!(top <= 9_005.0 + 60.0);
}
