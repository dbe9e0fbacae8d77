//! hamproc: post-processing of HALO Microwave Package (HAMP) data
//!
//! Turns raw cloud radar, microwave radiometer and navigation records of a
//! research flight into georeferenced, height-corrected and quality-filtered
//! products, and colocates them with satellite overpasses and dropsondes.

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    AngleUnit, Channel, HampError, HampResult, HeightGrid, NavigationRecord, RadiometerModule,
    TimeIndexed, TimeRange, TimeSeries, Trajectory, Variable, VerticalAxis,
};

pub use io::{FlightConfig, QualityAnnotations, SeaLandMask};
pub use core::{Pipeline, PostProcessedDataset, ProcessingConfig};
