use crate::core::aggregate::MinValidPolicy;
use crate::core::cost::UniformGrid;
use crate::core::geometry::STANDARD_PRESSURE;
use crate::core::sweep::FailureThresholds;
use crate::core::wind::AmbiguityStrategy;
use crate::types::{AerosolError, AerosolModelId, AerosolResult, SurfaceType, View, DEFAULT_NO_DATA};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// One spectral channel used in the cost function
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub view: View,
    pub wavelength: f64, // nm
    #[serde(default = "default_weight")]
    pub weight: f64, // inverse of the expected measurement uncertainty
    /// Index of the channel's table in the model's LUT set
    pub lut_index: usize,
    /// Present when the input is radiance and must be converted to reflectance
    #[serde(default)]
    pub solar_flux: Option<f64>,
    /// Land only: surface albedo in this channel relative to the albedo scale
    #[serde(default = "default_weight")]
    pub surface_shape: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl ChannelSpec {
    pub fn new(view: View, wavelength: f64, lut_index: usize) -> Self {
        Self {
            view,
            wavelength,
            weight: 1.0,
            lut_index,
            solar_flux: None,
            surface_shape: 1.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_solar_flux(mut self, solar_flux: f64) -> Self {
        self.solar_flux = Some(solar_flux);
        self
    }

    pub fn with_surface_shape(mut self, shape: f64) -> Self {
        self.surface_shape = shape;
        self
    }
}

/// Retrieval run parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrievalConfig {
    pub surface: SurfaceType,
    /// Output pixel = mean over an n×n window of input pixels (n odd)
    pub average_block: usize,
    pub no_data_value: f64,
    pub tau_grid: UniformGrid,
    pub angstrom_grid: UniformGrid,
    pub albedo_grid: UniformGrid,
    /// Fine τ samples per native LUT τ interval
    pub tau_upsample: usize,
    /// Overrides the surface-specific failure thresholds
    pub thresholds: Option<FailureThresholds>,
    /// Land windows need ceil(fraction · in-bounds samples) valid pixels
    pub land_valid_fraction: f64,
    pub ambiguity: AmbiguityStrategy,
    pub standard_pressure: f64, // hPa
    pub reference_wavelength: f64, // nm
    pub residual_floor: f64,
    pub glint_threshold: f64,
    #[serde(rename = "candidateModel")]
    pub candidate_models: Vec<AerosolModelId>,
    #[serde(rename = "channel")]
    pub channels: Vec<ChannelSpec>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            surface: SurfaceType::Ocean,
            average_block: 3,
            no_data_value: DEFAULT_NO_DATA,
            tau_grid: UniformGrid { start: 0.0, step: 0.01, count: 201 },
            angstrom_grid: UniformGrid { start: -0.5, step: 0.05, count: 91 },
            albedo_grid: UniformGrid { start: 0.0, step: 0.01, count: 51 },
            tau_upsample: 10,
            thresholds: None,
            land_valid_fraction: 8.0 / 9.0,
            ambiguity: AmbiguityStrategy::MinimumCost,
            standard_pressure: STANDARD_PRESSURE,
            reference_wavelength: 550.0,
            residual_floor: 1e-8,
            glint_threshold: 0.02,
            candidate_models: AerosolModelId::all().collect(),
            channels: Vec::new(),
        }
    }
}

impl RetrievalConfig {
    /// Defaults for the given variant
    pub fn for_surface(surface: SurfaceType) -> Self {
        Self {
            surface,
            ..Self::default()
        }
    }

    /// Parse and validate a configuration document
    pub fn from_xml_str(xml_content: &str) -> AerosolResult<Self> {
        log::debug!("Parsing retrieval configuration (length: {})", xml_content.len());
        let config: RetrievalConfig = from_str(xml_content)
            .map_err(|e| AerosolError::XmlParsing(format!("Failed to parse retrieval configuration: {}", e)))?;
        config.validate()?;
        log::info!(
            "Loaded {} retrieval configuration: {} channels, {} candidate models",
            config.surface,
            config.channels.len(),
            config.candidate_models.len()
        );
        Ok(config)
    }

    pub fn from_xml_file<P: AsRef<Path>>(path: P) -> AerosolResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_xml_str(&content)
    }

    /// Reject configurations that cannot drive a retrieval
    pub fn validate(&self) -> AerosolResult<()> {
        if self.average_block == 0 || self.average_block % 2 == 0 {
            return Err(AerosolError::Configuration(format!(
                "averageBlock must be odd and positive, got {}",
                self.average_block
            )));
        }
        if !self.no_data_value.is_finite() {
            return Err(AerosolError::Configuration("noDataValue must be finite".to_string()));
        }
        if self.tau_upsample == 0 {
            return Err(AerosolError::Configuration("tauUpsample must be at least 1".to_string()));
        }
        self.tau_grid.validate()?;
        self.second_grid().validate()?;

        if self.channels.is_empty() {
            return Err(AerosolError::Configuration("No channels configured".to_string()));
        }
        for (i, channel) in self.channels.iter().enumerate() {
            if !(channel.wavelength > 0.0) {
                return Err(AerosolError::Configuration(format!(
                    "Channel {} has invalid wavelength {}",
                    i, channel.wavelength
                )));
            }
            if !channel.weight.is_finite() || channel.weight < 0.0 {
                return Err(AerosolError::Configuration(format!(
                    "Channel {} has invalid weight {}",
                    i, channel.weight
                )));
            }
            if let Some(flux) = channel.solar_flux {
                if !(flux > 0.0) {
                    return Err(AerosolError::Configuration(format!(
                        "Channel {} has invalid solar flux {}",
                        i, flux
                    )));
                }
            }
        }
        if self.candidate_models.is_empty() {
            return Err(AerosolError::Configuration("No candidate aerosol models configured".to_string()));
        }
        if !(self.reference_wavelength > 0.0) {
            return Err(AerosolError::Configuration("referenceWavelength must be positive".to_string()));
        }
        if !(self.land_valid_fraction > 0.0 && self.land_valid_fraction <= 1.0) {
            return Err(AerosolError::Configuration(format!(
                "landValidFraction must be in (0, 1], got {}",
                self.land_valid_fraction
            )));
        }
        Ok(())
    }

    /// Grid of the second search parameter: Ångström (ocean) or albedo scale (land)
    pub fn second_grid(&self) -> UniformGrid {
        match self.surface {
            SurfaceType::Ocean => self.angstrom_grid,
            SurfaceType::Land => self.albedo_grid,
        }
    }

    pub fn failure_thresholds(&self) -> FailureThresholds {
        self.thresholds.unwrap_or(match self.surface {
            SurfaceType::Ocean => FailureThresholds::OCEAN,
            SurfaceType::Land => FailureThresholds::LAND,
        })
    }

    pub fn min_valid_policy(&self) -> MinValidPolicy {
        match self.surface {
            SurfaceType::Ocean => MinValidPolicy::AllButOne,
            SurfaceType::Land => MinValidPolicy::EdgeAdjusted {
                fraction: self.land_valid_fraction,
            },
        }
    }

    pub fn wavelengths(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.wavelength).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.weight).collect()
    }

    pub fn surface_shapes(&self) -> Vec<f64> {
        self.channels.iter().map(|c| c.surface_shape).collect()
    }

    /// Views that at least one channel is observed from
    pub fn views(&self) -> Vec<View> {
        View::ALL
            .iter()
            .copied()
            .filter(|v| self.channels.iter().any(|c| c.view == *v))
            .collect()
    }
}
