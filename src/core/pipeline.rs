//! Level-0 to level-2 processing of whole flights

use crate::core::colocation::CloudFlagConfig;
use crate::core::dataset::PostProcessedDataset;
use crate::core::georeference::{names, GeoreferenceConfig, GeoreferenceEngine};
use crate::core::height_correction::{HeightGridConfig, HeightRegridder};
use crate::core::level0::{
    fix_iwv, fix_navigation, fix_radar, fix_radiometer, line_of_sight, RawRadar, RawRadiometer,
    RawWaterVapour, LINE_OF_SIGHT,
};
use crate::core::provenance::{ProcessingMetadata, ProvenanceTracker};
use crate::core::quality_filter::{FilterConfig, FilterInputs, QualityFilter};
use crate::core::trajectory::MatchConfig;
use crate::io::annotations::QualityAnnotations;
use crate::io::config::FlightConfig;
use crate::io::sea_land_mask::SeaLandMask;
use crate::types::{
    HampError, HampResult, NavigationRecord, RadiometerModule, TimeSeries, Variable, VERSION_ATTR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Configuration of a processing run, built once at the entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Semantic version stamped on every product
    pub version: String,
    pub georeference: GeoreferenceConfig,
    pub height_grid: HeightGridConfig,
    pub filter: FilterConfig,
    pub matching: MatchConfig,
    pub cloud_flag: CloudFlagConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            georeference: GeoreferenceConfig::default(),
            height_grid: HeightGridConfig::default(),
            filter: FilterConfig::default(),
            matching: MatchConfig::default(),
            cloud_flag: CloudFlagConfig::default(),
        }
    }
}

impl ProcessingConfig {
    pub fn validate(&self) -> HampResult<()> {
        if self.version.trim().is_empty() {
            return Err(HampError::Configuration("product version is empty".to_string()));
        }
        if !(self.height_grid.spacing_m > 0.0) {
            return Err(HampError::Configuration(format!(
                "height grid spacing must be positive, got {}",
                self.height_grid.spacing_m
            )));
        }
        if let Some(top) = self.height_grid.top_m {
            if !(top > self.height_grid.bottom_m) {
                return Err(HampError::Configuration(format!(
                    "height grid top {} is not above bottom {}",
                    top, self.height_grid.bottom_m
                )));
            }
        }
        if !(self.matching.max_colocation_radius_m > 0.0) {
            return Err(HampError::Configuration(
                "colocation radius must be positive".to_string(),
            ));
        }
        for (name, limit) in [
            ("max_abs_roll_deg", self.filter.max_abs_roll_deg),
            ("max_abs_pitch_deg", self.filter.max_abs_pitch_deg),
        ] {
            if matches!(limit, Some(l) if !(l >= 0.0)) {
                return Err(HampError::Configuration(format!("{} must be non-negative", name)));
            }
        }
        Ok(())
    }
}

/// External readers adapting raw instrument archives
pub trait InstrumentSource {
    fn navigation(&self, flight: &FlightConfig) -> HampResult<NavigationRecord>;

    fn radar(&self, flight: &FlightConfig) -> HampResult<RawRadar>;

    fn radiometer(&self, flight: &FlightConfig, module: RadiometerModule) -> HampResult<RawRadiometer>;

    fn water_vapour(&self, flight: &FlightConfig) -> HampResult<RawWaterVapour>;

    fn sea_land_mask(&self) -> HampResult<Option<SeaLandMask>> {
        Ok(None)
    }

    /// Error file named by the flight configuration, if any
    fn annotations(&self, flight: &FlightConfig) -> HampResult<Option<QualityAnnotations>> {
        match flight.paths()?.error_file {
            Some(path) if path.exists() => QualityAnnotations::from_file(path).map(Some),
            Some(path) => {
                log::warn!("Error file {} not found, no exclusion windows", path.display());
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

/// Processed channels and provenance of one flight
#[derive(Debug, Clone)]
pub struct FlightProducts {
    pub dataset: PostProcessedDataset,
    pub metadata: ProcessingMetadata,
}

/// Outcome of a multi-flight run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub products: BTreeMap<String, FlightProducts>,
    /// Flight name and error text
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.products.keys().map(|k| k.as_str()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn valid_fraction(series: &TimeSeries) -> Option<f64> {
    let (valid, total) = series
        .variables
        .iter()
        .filter(|(name, _)| !names::is_coordinate(name))
        .fold((0usize, 0usize), |(v, t), (_, var)| {
            let size = match var {
                Variable::Series(data) => data.len(),
                Variable::Profile(data) | Variable::Spectrum(data) => data.len(),
            };
            (v + var.valid_count(), t + size)
        });
    (total > 0).then(|| valid as f64 / total as f64)
}

/// Runs level-0 normalisation, georeferencing, height correction and
/// quality filtering for whole flights
pub struct Pipeline {
    config: ProcessingConfig,
    georeference: GeoreferenceEngine,
    regridder: HeightRegridder,
    filter: QualityFilter,
}

impl Pipeline {
    pub fn new(config: ProcessingConfig) -> HampResult<Self> {
        config.validate()?;
        Ok(Self {
            georeference: GeoreferenceEngine::new(config.georeference.clone()),
            regridder: HeightRegridder::new(config.height_grid.clone()),
            filter: QualityFilter::new(config.filter.clone()),
            config,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    fn stamp(&self, series: &mut TimeSeries) {
        series
            .attrs
            .insert(VERSION_ATTR.to_string(), self.config.version.clone());
    }

    /// Process one flight into a dataset. Any failure aborts this flight only.
    pub fn process_flight<S: InstrumentSource + ?Sized>(
        &self,
        source: &S,
        flight: &FlightConfig,
    ) -> HampResult<FlightProducts> {
        let flightname = flight.flightname();
        log::info!("Processing {} ({} navigation)", flightname, flight.navigation_source());
        let start_time = Instant::now();

        let navigation = fix_navigation(&source.navigation(flight)?)?;
        let mut tracker = ProvenanceTracker::new(
            &flightname,
            &self.config.version,
            &navigation.source,
            &self.config,
        )?;
        let sea_land_mask = source.sea_land_mask()?;
        let annotations = source.annotations(flight)?;
        if sea_land_mask.is_none() {
            log::warn!("{}: no sea/land mask, land samples are kept", flightname);
        }

        let mut dataset = PostProcessedDataset::new();

        // radar: georeference, then height correction, then filtering
        let step = Instant::now();
        let radar = fix_radar(&source.radar(flight)?)?;
        let mut radar = self.georeference.add_georeference(&radar, &navigation)?;
        let los = line_of_sight(&radar)?;
        radar.insert_variable(LINE_OF_SIGHT, Variable::Series(los))?;
        tracker.record_step("georeference", "radar", step.elapsed().as_secs_f64(), valid_fraction(&radar), vec![]);

        let step = Instant::now();
        let grid = self.regridder.grid_for_altitude(navigation.altitude.view())?;
        let radar = self.regridder.correct_georeferenced(&radar, &grid)?;
        tracker.record_step("height correction", "radar", step.elapsed().as_secs_f64(), valid_fraction(&radar), vec![]);

        let step = Instant::now();
        let mut radar = self.filter.filter_radar(&radar, &FilterInputs::from_series(&radar))?;
        tracker.record_step("quality filter", "radar", step.elapsed().as_secs_f64(), valid_fraction(&radar), vec![]);
        self.stamp(&mut radar);
        tracker.record_channel("radar", &radar.attrs);
        dataset.radar = Some(radar);

        for module in RadiometerModule::ALL {
            let step = Instant::now();
            let channel = format!("radiometer {}", module);
            let series = fix_radiometer(&source.radiometer(flight, module)?)?;
            let series = self.georeference.add_georeference(&series, &navigation)?;
            let mut series = self.filter_radiometer(&series, sea_land_mask.as_ref(), annotations.as_ref())?;
            self.stamp(&mut series);
            tracker.record_step("level1", &channel, step.elapsed().as_secs_f64(), valid_fraction(&series), vec![]);
            tracker.record_channel(&channel, &series.attrs);
            dataset.set_radiometer(module, series);
        }

        let step = Instant::now();
        let iwv = fix_iwv(&source.water_vapour(flight)?)?;
        let iwv = self.georeference.add_georeference(&iwv, &navigation)?;
        let mut iwv = self.filter_radiometer(&iwv, sea_land_mask.as_ref(), None)?;
        self.stamp(&mut iwv);
        tracker.record_step("level1", "column_water_vapour", step.elapsed().as_secs_f64(), valid_fraction(&iwv), vec![]);
        tracker.record_channel("column_water_vapour", &iwv.attrs);
        dataset.column_water_vapour = Some(iwv);

        dataset.navigation = Some(navigation);
        log::info!(
            "{} processed in {:.2}s",
            flightname,
            start_time.elapsed().as_secs_f64()
        );
        Ok(FlightProducts {
            dataset,
            metadata: tracker.finish(),
        })
    }

    fn filter_radiometer(
        &self,
        series: &TimeSeries,
        sea_land_mask: Option<&SeaLandMask>,
        annotations: Option<&QualityAnnotations>,
    ) -> HampResult<TimeSeries> {
        let mut inputs = FilterInputs::from_series(series);
        if let Some(mask) = sea_land_mask {
            inputs = inputs.with_sea_land_mask(mask);
        }
        if let Some(annotations) = annotations {
            inputs = inputs.with_annotations(annotations);
        }
        self.filter.filter_radiometer(series, &inputs)
    }

    /// Process independent flights. Invalid flight configurations abort
    /// before any processing; a failing flight is reported and the batch
    /// carries on.
    pub fn process_batch<S: InstrumentSource + Sync + ?Sized>(
        &self,
        source: &S,
        flights: &[FlightConfig],
    ) -> HampResult<BatchReport> {
        for flight in flights {
            flight.validate()?;
        }

        #[cfg(feature = "parallel")]
        let outcomes: Vec<(String, HampResult<FlightProducts>)> = {
            use rayon::prelude::*;
            flights
                .par_iter()
                .map(|flight| (flight.flightname(), self.process_flight(source, flight)))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<(String, HampResult<FlightProducts>)> = flights
            .iter()
            .map(|flight| (flight.flightname(), self.process_flight(source, flight)))
            .collect();

        let mut report = BatchReport::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(products) => {
                    report.products.insert(name, products);
                }
                Err(e) => {
                    log::error!("{} failed: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        log::info!(
            "Batch finished: {} succeeded, {} failed",
            report.products.len(),
            report.failed.len()
        );
        Ok(report)
    }
}
