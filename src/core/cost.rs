use crate::core::subsection::ReducedLut;
use crate::types::{AerosolError, AerosolResult};
use serde::{Deserialize, Serialize};

/// Evenly spaced parameter grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniformGrid {
    pub start: f64,
    pub step: f64,
    pub count: usize,
}

impl UniformGrid {
    pub fn new(start: f64, step: f64, count: usize) -> AerosolResult<Self> {
        let grid = Self { start, step, count };
        grid.validate()?;
        Ok(grid)
    }

    pub fn validate(&self) -> AerosolResult<()> {
        if self.count == 0 {
            return Err(AerosolError::Configuration("Grid must have at least one sample".to_string()));
        }
        if !self.start.is_finite() || !self.step.is_finite() {
            return Err(AerosolError::Configuration("Grid start/step must be finite".to_string()));
        }
        if self.count > 1 && self.step <= 0.0 {
            return Err(AerosolError::Configuration(format!(
                "Grid step must be positive, got {}",
                self.step
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn value(&self, i: usize) -> f64 {
        self.start + self.step * i as f64
    }

    pub fn last(&self) -> f64 {
        self.value(self.count - 1)
    }

    /// First or last sample of a grid with more than one sample
    #[inline]
    pub fn is_edge(&self, i: usize) -> bool {
        self.count > 1 && (i == 0 || i + 1 == self.count)
    }

    pub fn values(&self) -> Vec<f64> {
        (0..self.count).map(|i| self.value(i)).collect()
    }
}

/// Predicted channel signals over a (τ, second parameter) search grid
pub trait SpectralModel {
    fn channel_count(&self) -> usize;

    /// Write the predicted signal of every channel at grid cell (i, j)
    fn predict(&self, tau_index: usize, param_index: usize, out: &mut [f64]);
}

/// Per-(Ångström sample, channel) factors (λ / λref)^(−α), row-major by sample
pub fn spectral_scale(angstrom_grid: &UniformGrid, wavelengths: &[f64], reference_wavelength: f64) -> Vec<f64> {
    let mut scale = Vec::with_capacity(angstrom_grid.count * wavelengths.len());
    for j in 0..angstrom_grid.count {
        let alpha = angstrom_grid.value(j);
        for &lambda in wavelengths {
            scale.push((lambda / reference_wavelength).powf(-alpha));
        }
    }
    scale
}

/// Ocean prediction at one wind-speed node
///
/// The Ångström exponent scales τ550 to each channel's wavelength before the
/// reduced table is consulted: τ(λ) = τ550 · (λ / λref)^(−α).
pub struct OceanSpectralModel<'a> {
    reduced: &'a ReducedLut,
    surface_index: usize,
    tau_grid: UniformGrid,
    channels: usize,
    scale: &'a [f64],
}

impl<'a> OceanSpectralModel<'a> {
    /// `scale` comes from [`spectral_scale`] for the same channel order
    pub fn new(
        reduced: &'a ReducedLut,
        surface_index: usize,
        tau_grid: UniformGrid,
        scale: &'a [f64],
    ) -> Self {
        Self {
            reduced,
            surface_index,
            tau_grid,
            channels: reduced.channel_count(),
            scale,
        }
    }
}

impl SpectralModel for OceanSpectralModel<'_> {
    fn channel_count(&self) -> usize {
        self.channels
    }

    #[inline]
    fn predict(&self, tau_index: usize, param_index: usize, out: &mut [f64]) {
        let tau = self.tau_grid.value(tau_index);
        let scale = &self.scale[param_index * self.channels..(param_index + 1) * self.channels];
        for c in 0..self.channels {
            out[c] = self.reduced.value_at(c, self.surface_index, tau * scale[c]);
        }
    }
}

/// Land prediction: surface albedo is a scale times a fixed spectral shape
pub struct LandSpectralModel<'a> {
    reduced: &'a ReducedLut,
    tau_grid: UniformGrid,
    albedo_grid: UniformGrid,
    shapes: &'a [f64],
}

impl<'a> LandSpectralModel<'a> {
    pub fn new(
        reduced: &'a ReducedLut,
        tau_grid: UniformGrid,
        albedo_grid: UniformGrid,
        shapes: &'a [f64],
    ) -> Self {
        Self {
            reduced,
            tau_grid,
            albedo_grid,
            shapes,
        }
    }
}

impl SpectralModel for LandSpectralModel<'_> {
    fn channel_count(&self) -> usize {
        self.shapes.len()
    }

    #[inline]
    fn predict(&self, tau_index: usize, param_index: usize, out: &mut [f64]) {
        let tau = self.tau_grid.value(tau_index);
        let albedo = self.albedo_grid.value(param_index);
        for (c, shape) in self.shapes.iter().enumerate() {
            out[c] = self.reduced.value_at_surface(c, albedo * shape, tau);
        }
    }
}

/// Location and uncertainty of the cost minimum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostMinimum {
    pub tau: f64,
    pub parameter: f64,
    pub cost: f64,
    pub tau_error: f64,
    pub parameter_error: f64,
    pub tau_index: usize,
    pub parameter_index: usize,
    /// Minimum sits on the edge of the τ or parameter grid
    pub on_boundary: bool,
}

impl CostMinimum {
    /// Error propagation failed or the cost is not a usable number
    pub fn is_degenerate(&self) -> bool {
        !self.cost.is_finite() || self.cost < 0.0 || !self.tau_error.is_finite()
    }
}

/// Weighted least-squares grid search over (τ, second parameter)
#[derive(Debug, Clone)]
pub struct SpectralCostEngine {
    tau_grid: UniformGrid,
    param_grid: UniformGrid,
    /// Lower bound on the cost used to scale the error estimates
    residual_floor: f64,
}

impl SpectralCostEngine {
    pub fn new(tau_grid: UniformGrid, param_grid: UniformGrid, residual_floor: f64) -> AerosolResult<Self> {
        tau_grid.validate()?;
        param_grid.validate()?;
        if !(residual_floor >= 0.0) {
            return Err(AerosolError::Configuration(format!(
                "Residual floor must be non-negative, got {}",
                residual_floor
            )));
        }
        Ok(Self {
            tau_grid,
            param_grid,
            residual_floor,
        })
    }

    pub fn tau_grid(&self) -> UniformGrid {
        self.tau_grid
    }

    pub fn param_grid(&self) -> UniformGrid {
        self.param_grid
    }

    /// Find the grid cell minimising Σ w²·(predicted − observed)²
    ///
    /// Channels whose observation or weight is not finite (or whose weight
    /// is zero) are ignored. Returns `None` when no channel is usable or
    /// no grid cell produces a finite cost.
    pub fn minimize<M: SpectralModel>(
        &self,
        model: &M,
        observed: &[f64],
        weights: &[f64],
    ) -> Option<CostMinimum> {
        let n_channels = model.channel_count();
        debug_assert_eq!(observed.len(), n_channels);
        debug_assert_eq!(weights.len(), n_channels);

        let w2: Vec<f64> = (0..n_channels)
            .map(|c| {
                let w = weights[c];
                if observed[c].is_finite() && w.is_finite() && w > 0.0 {
                    w * w
                } else {
                    0.0
                }
            })
            .collect();
        if w2.iter().all(|&w| w == 0.0) {
            return None;
        }

        let mut predicted = vec![0.0; n_channels];
        let mut best: Option<(usize, usize, f64)> = None;

        for i in 0..self.tau_grid.count {
            for j in 0..self.param_grid.count {
                model.predict(i, j, &mut predicted);
                let cost = weighted_cost(&predicted, observed, &w2);
                if !cost.is_finite() {
                    continue;
                }
                // strict comparison keeps the first cell on ties
                if best.map_or(true, |(_, _, c)| cost < c) {
                    best = Some((i, j, cost));
                }
            }
        }

        let (i, j, cost) = best?;
        let residual = cost.max(self.residual_floor).sqrt();

        let mut upper = vec![0.0; n_channels];
        let mut lower = vec![0.0; n_channels];

        let tau_info = self.information(model, &w2, &mut upper, &mut lower, Direction::Tau, i, j);
        let param_info = self.information(model, &w2, &mut upper, &mut lower, Direction::Parameter, i, j);

        let on_boundary = self.tau_grid.is_edge(i) || self.param_grid.is_edge(j);

        Some(CostMinimum {
            tau: self.tau_grid.value(i),
            parameter: self.param_grid.value(j),
            cost,
            tau_error: propagate(residual, tau_info),
            parameter_error: propagate(residual, param_info),
            tau_index: i,
            parameter_index: j,
            on_boundary,
        })
    }

    /// Σ w²·(∂predicted/∂x)² at (i, j) from centered differences, one-sided
    /// at the grid edges
    #[allow(clippy::too_many_arguments)]
    fn information<M: SpectralModel>(
        &self,
        model: &M,
        w2: &[f64],
        upper: &mut [f64],
        lower: &mut [f64],
        direction: Direction,
        i: usize,
        j: usize,
    ) -> f64 {
        let (grid, index) = match direction {
            Direction::Tau => (self.tau_grid, i),
            Direction::Parameter => (self.param_grid, j),
        };
        if grid.count < 2 {
            return 0.0;
        }
        let lo = index.saturating_sub(1);
        let hi = (index + 1).min(grid.count - 1);
        let span = grid.value(hi) - grid.value(lo);

        match direction {
            Direction::Tau => {
                model.predict(hi, j, upper);
                model.predict(lo, j, lower);
            }
            Direction::Parameter => {
                model.predict(i, hi, upper);
                model.predict(i, lo, lower);
            }
        }

        let mut information = 0.0;
        for c in 0..w2.len() {
            if w2[c] > 0.0 {
                let d = (upper[c] - lower[c]) / span;
                information += w2[c] * d * d;
            }
        }
        information
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Tau,
    Parameter,
}

#[inline]
fn weighted_cost(predicted: &[f64], observed: &[f64], w2: &[f64]) -> f64 {
    let mut cost = 0.0;
    for c in 0..predicted.len() {
        if w2[c] > 0.0 {
            let r = predicted[c] - observed[c];
            cost += w2[c] * r * r;
        }
    }
    cost
}

/// σ = residual / sqrt(information); infinite when the cost surface is flat
#[inline]
fn propagate(residual: f64, information: f64) -> f64 {
    if information > 0.0 && information.is_finite() {
        residual / information.sqrt()
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Channel c predicts τ·(1 + c) + α·c
    struct LinearModel {
        tau: UniformGrid,
        alpha: UniformGrid,
        channels: usize,
    }

    impl SpectralModel for LinearModel {
        fn channel_count(&self) -> usize {
            self.channels
        }

        fn predict(&self, i: usize, j: usize, out: &mut [f64]) {
            let t = self.tau.value(i);
            let a = self.alpha.value(j);
            for (c, v) in out.iter_mut().enumerate() {
                *v = t * (1.0 + c as f64) + a * c as f64;
            }
        }
    }

    fn engine() -> (SpectralCostEngine, LinearModel) {
        let tau = UniformGrid::new(0.0, 0.01, 201).unwrap();
        let alpha = UniformGrid::new(-0.5, 0.05, 91).unwrap();
        (
            SpectralCostEngine::new(tau, alpha, 1e-8).unwrap(),
            LinearModel { tau, alpha, channels: 3 },
        )
    }

    #[test]
    fn test_minimum_recovers_grid_point() {
        let (engine, model) = engine();
        let mut observed = vec![0.0; 3];
        model.predict(35, 40, &mut observed);
        let minimum = engine.minimize(&model, &observed, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(minimum.tau_index, 35);
        assert_eq!(minimum.parameter_index, 40);
        assert_abs_diff_eq!(minimum.tau, 0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(minimum.parameter, 1.5, epsilon = 1e-12);
        assert!(!minimum.on_boundary);
        assert!(minimum.tau_error.is_finite());
        assert!(!minimum.is_degenerate());
    }

    #[test]
    fn test_error_scales_with_residual() {
        let (engine, model) = engine();
        let mut observed = vec![0.0; 3];
        model.predict(50, 30, &mut observed);
        observed[0] += 0.02;
        let noisy = engine.minimize(&model, &observed, &[1.0, 1.0, 1.0]).unwrap();

        let mut clean_obs = vec![0.0; 3];
        model.predict(50, 30, &mut clean_obs);
        let clean = engine.minimize(&model, &clean_obs, &[1.0, 1.0, 1.0]).unwrap();
        assert!(noisy.tau_error > clean.tau_error);
    }

    #[test]
    fn test_boundary_minimum_uses_one_sided_difference() {
        let (engine, model) = engine();
        let observed = vec![-1.0, -1.0, -1.0];
        let minimum = engine.minimize(&model, &observed, &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!(minimum.tau_index, 0);
        assert!(minimum.on_boundary);
        assert!(minimum.tau_error.is_finite());
    }

    #[test]
    fn test_single_sample_grids_are_not_boundaries() {
        let tau = UniformGrid::new(0.4, 0.0, 1).unwrap();
        let alpha = UniformGrid::new(1.0, 0.0, 1).unwrap();
        let engine = SpectralCostEngine::new(tau, alpha, 1e-8).unwrap();
        let model = LinearModel { tau, alpha, channels: 3 };
        let minimum = engine.minimize(&model, &[0.4, 1.8, 3.2], &[1.0, 1.0, 1.0]).unwrap();
        assert_eq!((minimum.tau_index, minimum.parameter_index), (0, 0));
        assert!(!minimum.on_boundary);

        let grid = UniformGrid::new(0.0, 0.01, 201).unwrap();
        assert!(grid.is_edge(0) && grid.is_edge(200) && !grid.is_edge(100));
    }

    #[test]
    fn test_no_valid_channel_is_no_data() {
        let (engine, model) = engine();
        assert!(engine
            .minimize(&model, &[f64::NAN, f64::NAN, f64::NAN], &[1.0, 1.0, 1.0])
            .is_none());
        assert!(engine.minimize(&model, &[0.1, 0.2, 0.3], &[0.0, 0.0, 0.0]).is_none());
    }

    #[test]
    fn test_flat_cost_surface_is_degenerate() {
        struct Flat;
        impl SpectralModel for Flat {
            fn channel_count(&self) -> usize {
                2
            }
            fn predict(&self, _: usize, _: usize, out: &mut [f64]) {
                out.fill(0.1);
            }
        }
        let (engine, _) = engine();
        let minimum = engine.minimize(&Flat, &[0.2, 0.2], &[1.0, 1.0]).unwrap();
        assert!(minimum.is_degenerate());
    }

    #[test]
    fn test_grid_validation() {
        assert!(UniformGrid::new(0.0, 0.0, 10).is_err());
        assert!(UniformGrid::new(0.0, 0.1, 0).is_err());
        assert!(UniformGrid::new(1.0, 0.0, 1).is_ok());
    }
}
