use crate::core::subsection::{MasterLut, SurfaceAxis, AXIS_OPTICAL_THICKNESS, AXIS_SURFACE};
use crate::io::config::ChannelSpec;
use crate::types::{AerosolError, AerosolModelId, AerosolResult, SurfaceType, MAX_MODEL_ID};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Land tables of one aerosol model: one master table per channel
#[derive(Debug, Clone)]
pub struct LandModelLut {
    pub channels: Vec<MasterLut>,
    /// Ångström exponent of the mixture, reported with land retrievals
    pub nominal_angstrom: Option<f64>,
}

/// Source of radiative-transfer tables; file formats live behind this trait
pub trait LutLoader: Send + Sync {
    /// All per-channel land tables of a model
    fn load_model_lut(&self, model: AerosolModelId) -> AerosolResult<LandModelLut>;

    /// Ocean table of a model at one wavelength (pressure axis stored negated)
    fn load_ocean_lut(&self, model: AerosolModelId, wavelength_index: usize) -> AerosolResult<MasterLut>;
}

/// Tables of one model arranged in the configured channel order
#[derive(Debug, Clone)]
pub struct ModelLuts {
    pub model: AerosolModelId,
    pub surface: SurfaceType,
    pub channels: Vec<MasterLut>,
    pub nominal_angstrom: Option<f64>,
}

impl ModelLuts {
    /// Check that every channel shares surface and τ axes of the right kind
    pub fn validate(&self) -> AerosolResult<()> {
        let first = self.channels.first().ok_or_else(|| {
            AerosolError::Lut(format!("{} has no channel tables", self.model))
        })?;
        let expected_axis = match self.surface {
            SurfaceType::Ocean => SurfaceAxis::WindSpeed,
            SurfaceType::Land => SurfaceAxis::Albedo,
        };

        for (c, lut) in self.channels.iter().enumerate() {
            if lut.surface_axis() != expected_axis {
                return Err(AerosolError::Configuration(format!(
                    "{} channel {}: {:?} table used for {} retrieval",
                    self.model,
                    c,
                    lut.surface_axis(),
                    self.surface
                )));
            }
            if lut.table().axis(AXIS_SURFACE) != first.table().axis(AXIS_SURFACE)
                || lut.table().axis(AXIS_OPTICAL_THICKNESS) != first.table().axis(AXIS_OPTICAL_THICKNESS)
            {
                return Err(AerosolError::Configuration(format!(
                    "{} channel {}: surface/τ axes differ from channel 0",
                    self.model, c
                )));
            }
        }
        Ok(())
    }

    pub fn surface_nodes(&self) -> &[f64] {
        self.channels[0].surface_nodes()
    }
}

/// Per-run cache of model tables, populated at most once per model id
///
/// Loading happens in `preload` (or lazily through `get_or_load`) before
/// the parallel pixel loop; lookups afterwards are lock-free reads.
pub struct ModelLutCache {
    loader: Arc<dyn LutLoader>,
    surface: SurfaceType,
    channels: Vec<ChannelSpec>,
    slots: Vec<OnceLock<Arc<ModelLuts>>>,
    load_lock: Mutex<()>,
}

impl ModelLutCache {
    pub fn new(loader: Arc<dyn LutLoader>, surface: SurfaceType, channels: Vec<ChannelSpec>) -> Self {
        Self {
            loader,
            surface,
            channels,
            slots: (0..MAX_MODEL_ID).map(|_| OnceLock::new()).collect(),
            load_lock: Mutex::new(()),
        }
    }

    pub fn surface(&self) -> SurfaceType {
        self.surface
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn slot(&self, model: AerosolModelId) -> &OnceLock<Arc<ModelLuts>> {
        &self.slots[model.get() as usize - 1]
    }

    /// Load every listed model up front
    pub fn preload(&self, models: &[AerosolModelId]) -> AerosolResult<()> {
        log::info!("Preloading {} {} aerosol model LUT sets", models.len(), self.surface);
        for &model in models {
            self.get_or_load(model)?;
        }
        log::debug!("LUT preload complete");
        Ok(())
    }

    /// Cached tables of an already loaded model
    pub fn get(&self, model: AerosolModelId) -> AerosolResult<&Arc<ModelLuts>> {
        self.slot(model)
            .get()
            .ok_or(AerosolError::ModelUnavailable(model.get()))
    }

    pub fn is_loaded(&self, model: AerosolModelId) -> bool {
        self.slot(model).get().is_some()
    }

    /// Cached tables, loading them first if needed (double-checked)
    pub fn get_or_load(&self, model: AerosolModelId) -> AerosolResult<&Arc<ModelLuts>> {
        let slot = self.slot(model);
        if let Some(luts) = slot.get() {
            return Ok(luts);
        }

        let _guard = self
            .load_lock
            .lock()
            .map_err(|_| AerosolError::Lut("LUT cache lock poisoned".to_string()))?;
        if let Some(luts) = slot.get() {
            return Ok(luts);
        }

        let luts = self.load(model)?;
        luts.validate()?;
        let _ = slot.set(Arc::new(luts));
        slot.get().ok_or(AerosolError::ModelUnavailable(model.get()))
    }

    fn load(&self, model: AerosolModelId) -> AerosolResult<ModelLuts> {
        log::debug!("Loading {} tables for {}", self.surface, model);
        match self.surface {
            SurfaceType::Ocean => {
                let channels = self
                    .channels
                    .iter()
                    .map(|c| self.loader.load_ocean_lut(model, c.lut_index))
                    .collect::<AerosolResult<Vec<_>>>()?;
                Ok(ModelLuts {
                    model,
                    surface: self.surface,
                    channels,
                    nominal_angstrom: None,
                })
            }
            SurfaceType::Land => {
                let land = self.loader.load_model_lut(model)?;
                let channels = self
                    .channels
                    .iter()
                    .map(|c| {
                        land.channels.get(c.lut_index).cloned().ok_or_else(|| {
                            AerosolError::Configuration(format!(
                                "{} has {} land tables, channel needs index {}",
                                model,
                                land.channels.len(),
                                c.lut_index
                            ))
                        })
                    })
                    .collect::<AerosolResult<Vec<_>>>()?;
                Ok(ModelLuts {
                    model,
                    surface: self.surface,
                    channels,
                    nominal_angstrom: land.nominal_angstrom,
                })
            }
        }
    }
}

/// Loader over tables already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryLutLoader {
    ocean: HashMap<(AerosolModelId, usize), MasterLut>,
    land: HashMap<AerosolModelId, LandModelLut>,
}

impl InMemoryLutLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ocean(&mut self, model: AerosolModelId, wavelength_index: usize, lut: MasterLut) {
        self.ocean.insert((model, wavelength_index), lut);
    }

    pub fn insert_land(&mut self, model: AerosolModelId, luts: LandModelLut) {
        self.land.insert(model, luts);
    }
}

impl LutLoader for InMemoryLutLoader {
    fn load_model_lut(&self, model: AerosolModelId) -> AerosolResult<LandModelLut> {
        self.land
            .get(&model)
            .cloned()
            .ok_or_else(|| AerosolError::Lut(format!("No land LUT for {}", model)))
    }

    fn load_ocean_lut(&self, model: AerosolModelId, wavelength_index: usize) -> AerosolResult<MasterLut> {
        self.ocean
            .get(&(model, wavelength_index))
            .cloned()
            .ok_or_else(|| {
                AerosolError::Lut(format!("No ocean LUT for {} at wavelength index {}", model, wavelength_index))
            })
    }
}
