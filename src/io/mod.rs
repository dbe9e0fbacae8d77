//! Flight configuration and auxiliary input files

pub mod annotations;
pub mod config;
pub mod sea_land_mask;

pub use annotations::{QualityAnnotations, TimeWindow, WindowBoundary};
pub use config::{FlightConfig, NavigationSource, ResolvedPaths};
pub use sea_land_mask::{GridTransform, SeaLandMask, Surface};
