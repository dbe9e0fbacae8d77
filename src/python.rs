//! Python bindings for the array-level operations

use crate::core::geodesy;
use crate::core::height_correction::{HeightGridConfig, HeightRegridder};
use crate::core::trajectory::{Colocation, MatchConfig, TrajectoryMatcher};
use crate::types::{epoch_seconds, from_epoch_seconds, AngleUnit, HampError, TimeSeries, Trajectory, Variable, VerticalAxis};
use chrono::{DateTime, Utc};
use numpy::{PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

fn to_py_err(e: HampError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn angle_unit(degrees: bool) -> AngleUnit {
    if degrees {
        AngleUnit::Degrees
    } else {
        AngleUnit::Radians
    }
}

fn to_times(seconds: &[f64]) -> PyResult<Vec<DateTime<Utc>>> {
    seconds
        .iter()
        .map(|&s| {
            from_epoch_seconds(s).ok_or_else(|| PyValueError::new_err(format!("Invalid epoch time: {}", s)))
        })
        .collect()
}

/// Geometric height of every radar gate
#[pyfunction]
#[pyo3(signature = (range, pitch, roll, altitude, degrees = true))]
fn gate_heights(
    py: Python,
    range: PyReadonlyArray1<f64>,
    pitch: PyReadonlyArray1<f64>,
    roll: PyReadonlyArray1<f64>,
    altitude: PyReadonlyArray1<f64>,
    degrees: bool,
) -> PyResult<PyObject> {
    if pitch.len() != roll.len() || pitch.len() != altitude.len() {
        return Err(PyValueError::new_err("pitch, roll and altitude must have equal length"));
    }
    let heights = HeightRegridder::gate_heights(
        range.as_array(),
        pitch.as_array(),
        roll.as_array(),
        altitude.as_array(),
        angle_unit(degrees),
    );
    Ok(heights.to_pyarray(py).into())
}

/// Regrid a range-gated profile onto a regular height grid.
/// Returns `(heights, values)`.
#[pyfunction]
#[pyo3(signature = (time, range, values, pitch, roll, altitude, spacing_m = 30.0, top_m = 15000.0, degrees = true))]
#[allow(clippy::too_many_arguments)]
fn correct_radar_height(
    py: Python,
    time: PyReadonlyArray1<f64>,
    range: PyReadonlyArray1<f64>,
    values: PyReadonlyArray2<f64>,
    pitch: PyReadonlyArray1<f64>,
    roll: PyReadonlyArray1<f64>,
    altitude: PyReadonlyArray1<f64>,
    spacing_m: f64,
    top_m: f64,
    degrees: bool,
) -> PyResult<(PyObject, PyObject)> {
    let time = time.as_array().to_vec();
    let mut radar = TimeSeries::new("radar", to_times(&time)?);
    radar.vertical = Some(VerticalAxis::Range(range.as_array().to_owned()));
    radar
        .insert_variable("values", Variable::Profile(values.as_array().to_owned()))
        .map_err(to_py_err)?;

    let regridder = HeightRegridder::new(HeightGridConfig {
        spacing_m,
        top_m: Some(top_m),
        ..HeightGridConfig::default()
    });
    let corrected = regridder
        .correct_radar_height(&radar, pitch.as_array(), roll.as_array(), altitude.as_array(), angle_unit(degrees))
        .map_err(to_py_err)?;
    let heights = corrected
        .vertical
        .as_ref()
        .map(|axis| axis.values().clone())
        .ok_or_else(|| PyValueError::new_err("Height correction produced no height axis"))?;
    let regridded = corrected.profile("values").map_err(to_py_err)?;
    Ok((heights.to_pyarray(py).into(), regridded.to_pyarray(py).into()))
}

/// Closest approach of two tracks given as epoch seconds and degrees.
/// Returns `(epoch_seconds, distance_m)` or `None` without a colocation.
#[pyfunction]
#[pyo3(signature = (time_a, lat_a, lon_a, time_b, lat_b, lon_b, max_distance_m = 50000.0))]
#[allow(clippy::too_many_arguments)]
fn closest_approach(
    time_a: PyReadonlyArray1<f64>,
    lat_a: PyReadonlyArray1<f64>,
    lon_a: PyReadonlyArray1<f64>,
    time_b: PyReadonlyArray1<f64>,
    lat_b: PyReadonlyArray1<f64>,
    lon_b: PyReadonlyArray1<f64>,
    max_distance_m: f64,
) -> PyResult<Option<(f64, f64)>> {
    let a = Trajectory::new(
        "a",
        to_times(&time_a.as_array().to_vec())?,
        lat_a.as_array().to_owned(),
        lon_a.as_array().to_owned(),
    )
    .map_err(to_py_err)?;
    let b = Trajectory::new(
        "b",
        to_times(&time_b.as_array().to_vec())?,
        lat_b.as_array().to_owned(),
        lon_b.as_array().to_owned(),
    )
    .map_err(to_py_err)?;
    let matcher = TrajectoryMatcher::new(MatchConfig {
        max_colocation_radius_m: max_distance_m,
        ..MatchConfig::default()
    });
    match matcher.find_closest_approach(&a, &b).map_err(to_py_err)? {
        Colocation::Found(approach) => Ok(Some((epoch_seconds(&approach.time), approach.distance_m))),
        Colocation::NoMatch(_) => Ok(None),
    }
}

/// Geodesic distance in metres on the WGS84 ellipsoid
#[pyfunction]
fn geodesic_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    geodesy::geodesic_distance(lat1, lon1, lat2, lon2)
}

#[pymodule]
fn hamproc(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(gate_heights, m)?)?;
    m.add_function(wrap_pyfunction!(correct_radar_height, m)?)?;
    m.add_function(wrap_pyfunction!(closest_approach, m)?)?;
    m.add_function(wrap_pyfunction!(geodesic_distance, m)?)?;
    Ok(())
}
