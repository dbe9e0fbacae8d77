use crate::core::georeference::names;
use crate::core::interpolation::interp1d_extrapolate;
use crate::types::{
    AngleUnit, HampError, HampResult, HeightGrid, TimeSeries, Variable, VerticalAxis,
};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};

/// Geometric height grid configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightGridConfig {
    /// Vertical spacing in metres
    pub spacing_m: f64,
    /// Lowest grid level in metres above ground
    pub bottom_m: f64,
    /// Grid top; `None` derives it from the highest aircraft altitude
    pub top_m: Option<f64>,
    /// Null grid levels above the aircraft after regridding
    pub mask_above_platform: bool,
}

impl Default for HeightGridConfig {
    fn default() -> Self {
        Self {
            spacing_m: 30.0,
            bottom_m: 0.0,
            top_m: Some(15_000.0), // above the HALO service ceiling
            mask_above_platform: true,
        }
    }
}

/// Remaps radar range gates onto a shared geometric height grid
pub struct HeightRegridder {
    config: HeightGridConfig,
}

impl HeightRegridder {
    pub fn new(config: HeightGridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HeightGridConfig {
        &self.config
    }

    /// Height grid for a run with the given aircraft altitudes
    pub fn grid_for_altitude(&self, altitude: ArrayView1<f64>) -> HampResult<HeightGrid> {
        let top = match self.config.top_m {
            Some(top) => top,
            None => {
                let highest = altitude
                    .iter()
                    .filter(|a| a.is_finite())
                    .fold(f64::NEG_INFINITY, |acc, &a| acc.max(a));
                if !highest.is_finite() {
                    return Err(HampError::MalformedRecord(
                        "cannot derive a height grid from all-missing altitude".to_string(),
                    ));
                }
                highest + self.config.spacing_m
            }
        };
        HeightGrid::regular(self.config.bottom_m, top, self.config.spacing_m)
    }

    /// Height above ground of every range gate, shape (time, gate).
    ///
    /// `height = altitude - range * cos(pitch) * cos(roll)`. Timesteps with
    /// missing attitude or a beam pointing at or above the horizon are missing.
    pub fn gate_heights(
        range: ArrayView1<f64>,
        pitch: ArrayView1<f64>,
        roll: ArrayView1<f64>,
        altitude: ArrayView1<f64>,
        unit: AngleUnit,
    ) -> Array2<f64> {
        let mut heights = Array2::from_elem((altitude.len(), range.len()), f64::NAN);
        for (t, mut row) in heights.axis_iter_mut(Axis(0)).enumerate() {
            let projection = unit.to_radians(pitch[t]).cos() * unit.to_radians(roll[t]).cos();
            if !projection.is_finite() || projection <= 0.0 || !altitude[t].is_finite() {
                continue;
            }
            for (gate, h) in row.iter_mut().enumerate() {
                *h = altitude[t] - range[gate] * projection;
            }
        }
        heights
    }

    /// Regrid a radar series using explicit attitude channels aligned on
    /// its time axis. The grid is derived from `altitude`.
    pub fn correct_radar_height(
        &self,
        radar: &TimeSeries,
        pitch: ArrayView1<f64>,
        roll: ArrayView1<f64>,
        altitude: ArrayView1<f64>,
        unit: AngleUnit,
    ) -> HampResult<TimeSeries> {
        let grid = self.grid_for_altitude(altitude)?;
        self.correct_onto(radar, pitch, roll, altitude, unit, &grid)
    }

    /// Regrid a georeferenced radar series using its `plane_*` variables.
    ///
    /// Fails when the series has not been georeferenced yet.
    pub fn correct_georeferenced(&self, radar: &TimeSeries, grid: &HeightGrid) -> HampResult<TimeSeries> {
        if !radar.is_georeferenced() {
            return Err(HampError::Processing(format!(
                "{}: height correction requires a georeferenced series",
                radar.name
            )));
        }
        let pitch = radar.series(names::PLANE_PITCH)?;
        let roll = radar.series(names::PLANE_ROLL)?;
        let altitude = radar.series(names::PLANE_ALTITUDE)?;
        self.correct_onto(
            radar,
            pitch.view(),
            roll.view(),
            altitude.view(),
            AngleUnit::Degrees,
            grid,
        )
    }

    /// Regrid every (time, range) variable of `radar` onto `grid`
    pub fn correct_onto(
        &self,
        radar: &TimeSeries,
        pitch: ArrayView1<f64>,
        roll: ArrayView1<f64>,
        altitude: ArrayView1<f64>,
        unit: AngleUnit,
        grid: &HeightGrid,
    ) -> HampResult<TimeSeries> {
        let range = match &radar.vertical {
            Some(VerticalAxis::Range(range)) => range,
            Some(VerticalAxis::Height(_)) => {
                return Err(HampError::Processing(format!(
                    "{}: already on a geometric height grid",
                    radar.name
                )))
            }
            None => {
                return Err(HampError::MalformedRecord(format!(
                    "{}: no range-gate axis to correct",
                    radar.name
                )))
            }
        };
        let n = radar.len();
        for (channel, len) in [("pitch", pitch.len()), ("roll", roll.len()), ("altitude", altitude.len())] {
            if len != n {
                return Err(HampError::MalformedRecord(format!(
                    "{}: {} has {} samples, radar has {}",
                    radar.name, channel, len, n
                )));
            }
        }
        if range.len() < 2 || range.windows(2).into_iter().any(|w| w[1] <= w[0]) {
            return Err(HampError::MalformedRecord(format!(
                "{}: range gates must be strictly increasing with at least two gates",
                radar.name
            )));
        }
        unit.validate(pitch, "pitch")?;
        unit.validate(roll, "roll")?;

        log::info!(
            "Correcting radar height: {} timesteps x {} gates -> {} levels ({} m spacing)",
            n,
            range.len(),
            grid.len(),
            self.config.spacing_m
        );
        let start_time = std::time::Instant::now();

        let heights = Self::gate_heights(range.view(), pitch, roll, altitude, unit);

        let mut output = radar.clone();
        output.vertical = Some(VerticalAxis::Height(grid.clone()));
        for (name, variable) in radar.variables.iter() {
            if let Variable::Profile(values) = variable {
                let mut regridded = self.regrid_profile(heights.view(), values.view(), grid)?;
                if self.config.mask_above_platform {
                    Self::mask_above_platform(&mut regridded, grid, altitude);
                }
                log::debug!("Regridded '{}' onto {} levels", name, grid.len());
                output.variables.insert(name.clone(), Variable::Profile(regridded));
            }
        }
        if !output.variables.contains_key(names::PLANE_ALTITUDE) {
            output.insert_variable(names::PLANE_ALTITUDE, Variable::Series(altitude.to_owned()))?;
        }
        output.record_step(&format!(
            "height corrected onto {} levels of {} m",
            grid.len(),
            self.config.spacing_m
        ));

        log::info!(
            "Height correction completed in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    /// Per-timestep interpolation of one variable onto the grid.
    ///
    /// Each timestep writes only its own output row.
    fn regrid_profile(
        &self,
        heights: ArrayView2<f64>,
        values: ArrayView2<f64>,
        grid: &HeightGrid,
    ) -> HampResult<Array2<f64>> {
        if heights.dim() != values.dim() {
            return Err(HampError::MalformedRecord(format!(
                "profile shape {:?} does not match gate heights {:?}",
                values.dim(),
                heights.dim()
            )));
        }
        let mut output = Array2::from_elem((values.nrows(), grid.len()), f64::NAN);
        Self::regrid_rows(heights, values, grid.heights(), &mut output);
        Ok(output)
    }

    #[cfg(feature = "parallel")]
    fn regrid_rows(
        heights: ArrayView2<f64>,
        values: ArrayView2<f64>,
        grid: &Array1<f64>,
        output: &mut Array2<f64>,
    ) {
        use ndarray::parallel::prelude::*;

        let grid = grid.as_slice().map(|s| s.to_vec()).unwrap_or_else(|| grid.to_vec());
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each_init(
                || (Vec::new(), Vec::new(), vec![0.0; grid.len()]),
                |(x, y, column), (t, row)| {
                    regrid_column(heights.row(t), values.row(t), &grid, x, y, column, row);
                },
            );
    }

    #[cfg(not(feature = "parallel"))]
    fn regrid_rows(
        heights: ArrayView2<f64>,
        values: ArrayView2<f64>,
        grid: &Array1<f64>,
        output: &mut Array2<f64>,
    ) {
        let grid = grid.to_vec();
        let (mut x, mut y, mut column) = (Vec::new(), Vec::new(), vec![0.0; grid.len()]);
        for (t, row) in output.axis_iter_mut(Axis(0)).enumerate() {
            regrid_column(heights.row(t), values.row(t), &grid, &mut x, &mut y, &mut column, row);
        }
    }

    fn mask_above_platform(field: &mut Array2<f64>, grid: &HeightGrid, altitude: ArrayView1<f64>) {
        for (t, mut row) in field.axis_iter_mut(Axis(0)).enumerate() {
            let ceiling = altitude[t];
            for (value, &h) in row.iter_mut().zip(grid.heights().iter()) {
                if !(h <= ceiling) {
                    *value = f64::NAN;
                }
            }
        }
    }
}

/// Interpolate one timestep. Gate heights fall with range, so the column is
/// reversed into ascending order first; any missing gate height leaves the
/// whole column missing.
fn regrid_column(
    heights: ArrayView1<f64>,
    values: ArrayView1<f64>,
    grid: &[f64],
    x: &mut Vec<f64>,
    y: &mut Vec<f64>,
    column: &mut [f64],
    mut row: ArrayViewMut1<f64>,
) {
    if heights.iter().any(|h| !h.is_finite()) || values.iter().all(|v| !v.is_finite()) {
        row.fill(f64::NAN);
        return;
    }
    x.clear();
    y.clear();
    x.extend(heights.iter().rev());
    y.extend(values.iter().rev());
    interp1d_extrapolate(x, y, grid, column);
    row.assign(&ArrayView1::from(&column[..]));
}
