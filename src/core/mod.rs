//! Core HAMP processing modules

pub mod bands;
pub mod colocation;
pub mod dataset;
pub mod geodesy;
pub mod georeference;
pub mod height_correction;
pub mod interpolation;
pub mod level0;
pub mod pipeline;
pub mod provenance;
pub mod quality_filter;
pub mod trajectory;

// Re-export main types
pub use bands::Band;
pub use colocation::{colocate_sondes, find_underpass, CloudFlagConfig, Dropsonde, SondeReport, TrackProvider};
pub use dataset::PostProcessedDataset;
pub use georeference::{GeoreferenceConfig, GeoreferenceEngine};
pub use height_correction::{HeightGridConfig, HeightRegridder};
pub use level0::{RawRadar, RawRadiometer, RawWaterVapour};
pub use pipeline::{BatchReport, FlightProducts, InstrumentSource, Pipeline, ProcessingConfig};
pub use provenance::{ProcessingMetadata, ProvenanceTracker};
pub use quality_filter::{FilterConfig, FilterInputs, MaskReport, QualityFilter, Rule};
pub use trajectory::{ClosestApproach, Colocation, MatchConfig, NoMatchReason, TrajectoryMatcher};
