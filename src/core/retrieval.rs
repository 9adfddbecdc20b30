//! Per-block retrieval driver.
//!
//! For every output pixel: average the input window, derive the per-view
//! observation geometry, then sweep the candidate aerosol models. Each model
//! reduces its master tables to the pixel geometry and runs the spectral
//! cost search; the sweep controller keeps the lowest-error fit.

use crate::core::aggregate::{FieldSpec, PixelBlock, WindowedPixelAggregator};
use crate::core::cost::{spectral_scale, LandSpectralModel, OceanSpectralModel, SpectralCostEngine};
use crate::core::geometry::{cox_munk_glint, pressure_from_altitude, radiance_to_reflectance, relative_azimuth};
use crate::core::subsection::{ChannelTable, LutAxisReduction, ObservationGeometry};
use crate::core::sweep::{Candidate, ModelSweepController};
use crate::core::wind::WindSolution;
use crate::io::config::RetrievalConfig;
use crate::io::lut_cache::{ModelLutCache, ModelLuts};
use crate::types::{
    AerosolError, AerosolModelId, AerosolResult, PixelRetrievalResult, RetrievalFlags, SurfaceType, View,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives finished pixels, e.g. output raster bands
pub trait ResultSink {
    fn write_result(&mut self, x: usize, y: usize, result: &PixelRetrievalResult);
}

/// Block fields holding the geometry of one instrument view (degrees)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewGeometryFields {
    pub sun_zenith: FieldSpec,
    pub view_zenith: FieldSpec,
    pub sun_azimuth: FieldSpec,
    pub view_azimuth: FieldSpec,
}

/// Where each quantity lives in a `PixelBlock`
///
/// `channels` follows the configured channel order. Elevation-angle inputs
/// are declared with `FieldSpec::elevation` and averaged as zenith angles.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLayout {
    pub channels: Vec<FieldSpec>,
    pub views: [Option<ViewGeometryFields>; 3],
    /// Surface pressure in hPa
    pub pressure: Option<FieldSpec>,
    /// Terrain altitude in m, used when no pressure field is present
    pub altitude: Option<FieldSpec>,
    /// Reference (ECMWF) wind speed in m/s
    pub reference_wind: Option<FieldSpec>,
}

impl BlockLayout {
    pub fn new(channels: Vec<FieldSpec>) -> Self {
        Self {
            channels,
            views: [None; 3],
            pressure: None,
            altitude: None,
            reference_wind: None,
        }
    }

    pub fn with_view(mut self, view: View, fields: ViewGeometryFields) -> Self {
        self.views[view.index()] = Some(fields);
        self
    }

    pub fn with_pressure(mut self, field: FieldSpec) -> Self {
        self.pressure = Some(field);
        self
    }

    pub fn with_altitude(mut self, field: FieldSpec) -> Self {
        self.altitude = Some(field);
        self
    }

    pub fn with_reference_wind(mut self, field: FieldSpec) -> Self {
        self.reference_wind = Some(field);
        self
    }

    /// Check the layout against the configured channels
    pub fn validate(&self, config: &RetrievalConfig) -> AerosolResult<()> {
        if self.channels.len() != config.channels.len() {
            return Err(AerosolError::Configuration(format!(
                "Block layout has {} channel fields, configuration has {} channels",
                self.channels.len(),
                config.channels.len()
            )));
        }
        for view in config.views() {
            if self.views[view.index()].is_none() {
                return Err(AerosolError::Configuration(format!(
                    "Missing geometry fields for view {}",
                    view
                )));
            }
        }
        Ok(())
    }

    /// Check that every field the layout names exists in a block of `field_count` fields
    pub fn check_fields(&self, field_count: usize) -> AerosolResult<()> {
        let named = self
            .channels
            .iter()
            .map(|spec| ("channel", spec))
            .chain(self.views.iter().flatten().flat_map(|g| {
                [
                    ("sun zenith", &g.sun_zenith),
                    ("view zenith", &g.view_zenith),
                    ("sun azimuth", &g.sun_azimuth),
                    ("view azimuth", &g.view_azimuth),
                ]
            }))
            .chain(self.pressure.iter().map(|spec| ("pressure", spec)))
            .chain(self.altitude.iter().map(|spec| ("altitude", spec)))
            .chain(self.reference_wind.iter().map(|spec| ("reference wind", spec)));
        for (what, spec) in named {
            if spec.field >= field_count {
                return Err(AerosolError::Configuration(format!(
                    "{} field {} missing from block with {} fields",
                    what, spec.field, field_count
                )));
            }
        }
        Ok(())
    }

    /// Fields averaged together: channels first, then 4 angles per present view
    fn window_fields(&self) -> (Vec<FieldSpec>, [Option<usize>; 3]) {
        let mut fields = self.channels.clone();
        let mut offsets = [None; 3];
        for view in View::ALL {
            if let Some(g) = self.views[view.index()] {
                offsets[view.index()] = Some(fields.len());
                fields.extend([g.sun_zenith, g.view_zenith, g.sun_azimuth, g.view_azimuth]);
            }
        }
        (fields, offsets)
    }
}

/// Counters over the pixels of one or more blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalStats {
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed pixels per failure bit name
    pub failures: BTreeMap<&'static str, usize>,
    /// Successful pixels per winning model
    pub models: BTreeMap<AerosolModelId, usize>,
}

impl RetrievalStats {
    pub fn record(&mut self, result: &PixelRetrievalResult) {
        self.attempted += 1;
        if result.is_success() {
            self.succeeded += 1;
            if let Some(model) = result.model_id {
                *self.models.entry(model).or_insert(0) += 1;
            }
        } else {
            for name in result.flags.intersection(RetrievalFlags::FAILURES).names() {
                *self.failures.entry(name).or_insert(0) += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &RetrievalStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        for (name, count) in &other.failures {
            *self.failures.entry(name).or_insert(0) += count;
        }
        for (model, count) in &other.models {
            *self.models.entry(*model).or_insert(0) += count;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.attempted as f64
        }
    }
}

/// Output pixels of one block, row-major
#[derive(Debug, Clone)]
pub struct BlockRetrieval {
    width: usize,
    height: usize,
    results: Vec<PixelRetrievalResult>,
    stats: RetrievalStats,
    processed_at: DateTime<Utc>,
}

impl BlockRetrieval {
    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn get(&self, x: usize, y: usize) -> Option<&PixelRetrievalResult> {
        if x < self.width && y < self.height {
            self.results.get(y * self.width + x)
        } else {
            None
        }
    }

    pub fn results(&self) -> &[PixelRetrievalResult] {
        &self.results
    }

    pub fn stats(&self) -> &RetrievalStats {
        &self.stats
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    /// Hand every pixel to `sink`, shifted by the block's output offset
    pub fn write_to<S: ResultSink + ?Sized>(&self, sink: &mut S, x_offset: usize, y_offset: usize) {
        for (i, result) in self.results.iter().enumerate() {
            sink.write_result(x_offset + i % self.width, y_offset + i / self.width, result);
        }
    }
}

/// Everything a retrieval run needs, built once and shared by all blocks
pub struct RetrievalSession {
    config: RetrievalConfig,
    cache: Arc<ModelLutCache>,
    aggregator: WindowedPixelAggregator,
    reduction: LutAxisReduction,
    engine: SpectralCostEngine,
    /// Ocean only: (λ / λref)^(−α) per Ångström sample and channel
    scale: Vec<f64>,
    weights: Vec<f64>,
    shapes: Vec<f64>,
    cancel: Arc<AtomicBool>,
    started: DateTime<Utc>,
}

impl RetrievalSession {
    pub fn new(config: RetrievalConfig, cache: Arc<ModelLutCache>) -> AerosolResult<Self> {
        config.validate()?;
        if cache.surface() != config.surface {
            return Err(AerosolError::Configuration(format!(
                "LUT cache holds {} tables, configuration asks for {}",
                cache.surface(),
                config.surface
            )));
        }
        if cache.channel_count() != config.channels.len() {
            return Err(AerosolError::Configuration(format!(
                "LUT cache serves {} channels, configuration has {}",
                cache.channel_count(),
                config.channels.len()
            )));
        }

        let aggregator =
            WindowedPixelAggregator::new(config.average_block, config.no_data_value, config.min_valid_policy())?;
        let reduction = LutAxisReduction::new(config.tau_upsample)?;
        let engine = SpectralCostEngine::new(config.tau_grid, config.second_grid(), config.residual_floor)?;
        let scale = match config.surface {
            SurfaceType::Ocean => {
                spectral_scale(&config.angstrom_grid, &config.wavelengths(), config.reference_wavelength)
            }
            SurfaceType::Land => Vec::new(),
        };
        let started = Utc::now();

        log::info!(
            "{} retrieval session started {}: {} channels, {}x{} averaging, τ grid {} x {} grid {}",
            config.surface,
            started.format("%Y-%m-%d %H:%M:%S UTC"),
            config.channels.len(),
            config.average_block,
            config.average_block,
            config.tau_grid.count,
            match config.surface {
                SurfaceType::Ocean => "Ångström",
                SurfaceType::Land => "albedo",
            },
            config.second_grid().count
        );

        Ok(Self {
            weights: config.weights(),
            shapes: config.surface_shapes(),
            config,
            cache,
            aggregator,
            reduction,
            engine,
            scale,
            cancel: Arc::new(AtomicBool::new(false)),
            started,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started
    }

    /// Shared abort flag, checked once per output pixel
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Load the tables of every configured candidate model
    pub fn preload(&self) -> AerosolResult<()> {
        self.cache.preload(&self.config.candidate_models)
    }

    /// Output grid size (rows, cols) for an input block of the given size
    pub fn output_dim(&self, input: (usize, usize)) -> (usize, usize) {
        self.aggregator.output_dim(input)
    }

    /// Retrieve every output pixel of one block
    pub fn retrieve<B: PixelBlock + ?Sized>(
        &self,
        block: &B,
        layout: &BlockLayout,
        candidates: &[AerosolModelId],
    ) -> AerosolResult<BlockRetrieval> {
        layout.validate(&self.config)?;
        layout.check_fields(block.field_count())?;
        if candidates.is_empty() {
            return Err(AerosolError::Configuration("No candidate aerosol models".to_string()));
        }
        let models = candidates
            .iter()
            .map(|&m| self.cache.get_or_load(m).map(Arc::clone))
            .collect::<AerosolResult<Vec<_>>>()?;

        let (fields, offsets) = layout.window_fields();
        let (height, width) = self.aggregator.output_dim(block.dim());
        let mut results = Vec::with_capacity(width * height);
        let mut stats = RetrievalStats::default();

        for oy in 0..height {
            for ox in 0..width {
                if self.is_cancelled() {
                    log::info!("Retrieval cancelled at output pixel ({}, {})", ox, oy);
                    return Err(AerosolError::Cancelled);
                }
                let result = self.retrieve_pixel(block, layout, &fields, &offsets, &models, ox, oy)?;
                stats.record(&result);
                results.push(result);
            }
        }

        log::debug!(
            "Block {}x{} -> {}x{}: {}/{} pixels retrieved",
            block.dim().1,
            block.dim().0,
            width,
            height,
            stats.succeeded,
            stats.attempted
        );
        if stats.attempted > 0 && stats.succeeded == 0 {
            log::warn!("No successful retrieval in block ({:?})", stats.failures);
        }

        Ok(BlockRetrieval {
            width,
            height,
            results,
            stats,
            processed_at: Utc::now(),
        })
    }

    /// Retrieve independent blocks that share one layout
    pub fn retrieve_blocks<B: PixelBlock + Sync>(
        &self,
        blocks: &[B],
        layout: &BlockLayout,
        candidates: &[AerosolModelId],
    ) -> AerosolResult<Vec<BlockRetrieval>> {
        log::info!(
            "Retrieving {} blocks over {} candidate models",
            blocks.len(),
            candidates.len()
        );
        self.preload_candidates(candidates)?;

        #[cfg(feature = "parallel")]
        let retrieved = {
            use rayon::prelude::*;
            blocks
                .par_iter()
                .map(|block| self.retrieve(block, layout, candidates))
                .collect::<AerosolResult<Vec<_>>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let retrieved = blocks
            .iter()
            .map(|block| self.retrieve(block, layout, candidates))
            .collect::<AerosolResult<Vec<_>>>()?;

        let mut total = RetrievalStats::default();
        for block in &retrieved {
            total.merge(block.stats());
        }
        log::info!(
            "Retrieval finished: {}/{} pixels succeeded ({:.1}%), session started {}",
            total.succeeded,
            total.attempted,
            100.0 * total.success_rate(),
            self.started.format("%Y-%m-%d %H:%M:%S UTC")
        );
        Ok(retrieved)
    }

    fn preload_candidates(&self, candidates: &[AerosolModelId]) -> AerosolResult<()> {
        let missing: Vec<AerosolModelId> = candidates
            .iter()
            .copied()
            .filter(|&m| !self.cache.is_loaded(m))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        self.cache.preload(&missing)
    }

    fn auxiliary_mean<B: PixelBlock + ?Sized>(
        &self,
        block: &B,
        field: Option<FieldSpec>,
        ox: usize,
        oy: usize,
    ) -> Option<f64> {
        let field = field?;
        self.aggregator
            .aggregate(block, &[field], ox, oy)
            .means
            .and_then(|m| m.first().copied())
            .filter(|v| v.is_finite())
    }

    #[allow(clippy::too_many_arguments)]
    fn retrieve_pixel<B: PixelBlock + ?Sized>(
        &self,
        block: &B,
        layout: &BlockLayout,
        fields: &[FieldSpec],
        offsets: &[Option<usize>; 3],
        models: &[Arc<ModelLuts>],
        ox: usize,
        oy: usize,
    ) -> AerosolResult<PixelRetrievalResult> {
        let no_data = self.config.no_data_value;
        let window = self.aggregator.aggregate(block, fields, ox, oy);
        let means = match window.means {
            Some(means) => means,
            None => return Ok(PixelRetrievalResult::no_data(no_data, window.flags)),
        };

        let pressure = match self.auxiliary_mean(block, layout.pressure, ox, oy) {
            Some(p) if p > 0.0 => p,
            _ => match self.auxiliary_mean(block, layout.altitude, ox, oy) {
                Some(z) => pressure_from_altitude(z, self.config.standard_pressure),
                None => self.config.standard_pressure,
            },
        };

        let mut geometries: [Option<ObservationGeometry>; 3] = [None; 3];
        for view in View::ALL {
            if let Some(o) = offsets[view.index()] {
                geometries[view.index()] = Some(ObservationGeometry {
                    sun_zenith: means[o],
                    view_zenith: means[o + 1],
                    relative_azimuth: relative_azimuth(means[o + 2], means[o + 3]),
                    pressure,
                });
            }
        }

        let mut channel_geometry = Vec::with_capacity(self.config.channels.len());
        let mut observed = Vec::with_capacity(self.config.channels.len());
        for (c, channel) in self.config.channels.iter().enumerate() {
            let geometry = geometries[channel.view.index()].ok_or_else(|| {
                AerosolError::Configuration(format!("Missing geometry fields for view {}", channel.view))
            })?;
            let value = match channel.solar_flux {
                Some(flux) => radiance_to_reflectance(means[c], flux, geometry.sun_zenith),
                None => means[c],
            };
            channel_geometry.push(geometry);
            observed.push(value);
        }

        let reference_wind = self.auxiliary_mean(block, layout.reference_wind, ox, oy);
        let mut sweep = ModelSweepController::new(self.config.failure_thresholds(), no_data);
        for luts in models {
            let tables: Vec<ChannelTable<'_>> = luts
                .channels
                .iter()
                .zip(&channel_geometry)
                .map(|(lut, geometry)| ChannelTable {
                    lut,
                    geometry: *geometry,
                })
                .collect();
            let candidate = match self.config.surface {
                SurfaceType::Ocean => self.ocean_candidate(&tables, &observed, reference_wind)?,
                SurfaceType::Land => self.land_candidate(luts, &tables, &observed)?,
            };
            sweep.offer(luts.model, candidate.as_ref());
        }

        let mut result = sweep.finish(window.flags);
        if result.is_success() && self.config.surface == SurfaceType::Ocean {
            let glint_view = geometries[View::Meris.index()].unwrap_or(channel_geometry[0]);
            let glint = cox_munk_glint(
                glint_view.sun_zenith,
                glint_view.view_zenith,
                glint_view.relative_azimuth,
                result.wind_speed,
            );
            result.glint_reflectance = glint;
            if glint > self.config.glint_threshold {
                result.flags.insert(RetrievalFlags::GLINT_RISK);
            }
        }
        Ok(result)
    }

    /// Cost search at every wind node, then ambiguity reduction
    fn ocean_candidate(
        &self,
        tables: &[ChannelTable<'_>],
        observed: &[f64],
        reference_wind: Option<f64>,
    ) -> AerosolResult<Option<Candidate>> {
        let reduced = self.reduction.reduce(tables)?;
        let solutions: Vec<WindSolution> = reduced
            .surface_nodes()
            .iter()
            .enumerate()
            .filter_map(|(s, &wind_speed)| {
                let model = OceanSpectralModel::new(&reduced, s, self.engine.tau_grid(), &self.scale);
                self.engine
                    .minimize(&model, observed, &self.weights)
                    .map(|minimum| WindSolution { wind_speed, minimum })
            })
            .collect();

        Ok(self
            .config
            .ambiguity
            .select(&solutions, reference_wind)
            .map(|s| Candidate {
                tau: s.minimum.tau,
                tau_error: s.minimum.tau_error,
                angstrom: s.minimum.parameter,
                angstrom_error: s.minimum.parameter_error,
                fit_error: s.minimum.cost,
                wind_speed: s.wind_speed,
                on_boundary: s.minimum.on_boundary,
            }))
    }

    fn land_candidate(
        &self,
        luts: &ModelLuts,
        tables: &[ChannelTable<'_>],
        observed: &[f64],
    ) -> AerosolResult<Option<Candidate>> {
        let no_data = self.config.no_data_value;
        let reduced = self.reduction.reduce(tables)?;
        let model = LandSpectralModel::new(&reduced, self.engine.tau_grid(), self.engine.param_grid(), &self.shapes);
        Ok(self.engine.minimize(&model, observed, &self.weights).map(|m| Candidate {
            tau: m.tau,
            tau_error: m.tau_error,
            angstrom: luts.nominal_angstrom.unwrap_or(no_data),
            angstrom_error: no_data,
            fit_error: m.cost,
            wind_speed: no_data,
            on_boundary: m.on_boundary,
        }))
    }
}

/// One-shot retrieval of a single block with a fresh session
pub fn retrieve<B: PixelBlock + ?Sized>(
    config: &RetrievalConfig,
    cache: Arc<ModelLutCache>,
    block: &B,
    layout: &BlockLayout,
    candidates: &[AerosolModelId],
) -> AerosolResult<BlockRetrieval> {
    let session = RetrievalSession::new(config.clone(), cache)?;
    session.retrieve(block, layout, candidates)
}
