//! LUT subsectioning: collapse the geometry axes of a master table so the
//! remaining (surface, optical thickness) dependence can be evaluated
//! cheaply for thousands of trial optical thicknesses.

use crate::core::lut::{lerp, Axis, LookupTable};
use crate::types::{AerosolError, AerosolResult};
use ndarray::Array3;

pub const AXIS_AZIMUTH: usize = 0;
pub const AXIS_VIEW_ZENITH: usize = 1;
pub const AXIS_SUN_ZENITH: usize = 2;
pub const AXIS_SURFACE: usize = 3;
pub const AXIS_OPTICAL_THICKNESS: usize = 4;
pub const AXIS_PRESSURE: usize = 5;

/// Number of axes of a master radiative-transfer table
pub const MASTER_DIMS: usize = 6;

/// Physical meaning of the surface axis of a master table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceAxis {
    /// Wind speed in m/s (ocean tables)
    WindSpeed,
    /// Lambertian surface albedo (land tables)
    Albedo,
}

/// Observation geometry of one instrument view at one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationGeometry {
    pub relative_azimuth: f64, // degrees, 180 = specular direction
    pub view_zenith: f64,      // degrees
    pub sun_zenith: f64,       // degrees
    pub pressure: f64,         // hPa, always positive
}

/// Six-dimensional radiative-transfer table for one aerosol model and channel
///
/// Axis order: relative azimuth, view zenith, sun zenith, surface (wind speed
/// or albedo), optical thickness, surface pressure.
#[derive(Debug, Clone)]
pub struct MasterLut {
    table: LookupTable,
    surface_axis: SurfaceAxis,
    pressure_negated: bool,
}

impl MasterLut {
    /// Wrap a table; `pressure_negated` marks tables that store −p on the
    /// pressure axis to keep it increasing
    pub fn new(
        table: LookupTable,
        surface_axis: SurfaceAxis,
        pressure_negated: bool,
    ) -> AerosolResult<Self> {
        if table.ndim() != MASTER_DIMS {
            return Err(AerosolError::Configuration(format!(
                "Master LUT must have {} axes, got {}",
                MASTER_DIMS,
                table.ndim()
            )));
        }
        Ok(Self {
            table,
            surface_axis,
            pressure_negated,
        })
    }

    pub fn table(&self) -> &LookupTable {
        &self.table
    }

    pub fn surface_axis(&self) -> SurfaceAxis {
        self.surface_axis
    }

    pub fn surface_nodes(&self) -> &[f64] {
        self.table.axis(AXIS_SURFACE).values()
    }

    pub fn tau_nodes(&self) -> &[f64] {
        self.table.axis(AXIS_OPTICAL_THICKNESS).values()
    }

    fn pressure_coordinate(&self, pressure: f64) -> f64 {
        if self.pressure_negated {
            -pressure
        } else {
            pressure
        }
    }

    /// Full six-dimensional evaluation
    pub fn evaluate(&self, geometry: &ObservationGeometry, surface: f64, tau: f64) -> f64 {
        self.table.interpolate(&[
            geometry.relative_azimuth,
            geometry.view_zenith,
            geometry.sun_zenith,
            surface,
            tau,
            self.pressure_coordinate(geometry.pressure),
        ])
    }

    /// Two-dimensional (surface, optical thickness) table at fixed geometry
    pub fn subsection(&self, geometry: &ObservationGeometry) -> AerosolResult<LookupTable> {
        self.table.subsection(&[
            Some(geometry.relative_azimuth),
            Some(geometry.view_zenith),
            Some(geometry.sun_zenith),
            None,
            None,
            Some(self.pressure_coordinate(geometry.pressure)),
        ])
    }
}

/// A master table paired with the geometry of the view its channel sees
#[derive(Debug, Clone, Copy)]
pub struct ChannelTable<'a> {
    pub lut: &'a MasterLut,
    pub geometry: ObservationGeometry,
}

/// Reduced table indexed by (channel, surface node, optical thickness)
///
/// Each native τ interval is split into `upsample` equal sub-steps, so the
/// fine grid contains every native τ node and reproduces the master table
/// exactly there.
#[derive(Debug, Clone)]
pub struct ReducedLut {
    surface: Axis,
    tau: Axis,
    upsample: usize,
    fine: Array3<f64>,
}

impl ReducedLut {
    pub fn channel_count(&self) -> usize {
        self.fine.dim().0
    }

    pub fn surface_nodes(&self) -> &[f64] {
        self.surface.values()
    }

    pub fn tau_nodes(&self) -> &[f64] {
        self.tau.values()
    }

    pub fn fine_len(&self) -> usize {
        self.fine.dim().2
    }

    /// Value at a native (surface, τ) node
    pub fn native(&self, channel: usize, surface_index: usize, tau_index: usize) -> f64 {
        self.fine[[channel, surface_index, tau_index * self.upsample]]
    }

    /// Value at surface node `surface_index`, linear in τ on the fine grid
    #[inline]
    pub fn value_at(&self, channel: usize, surface_index: usize, tau: f64) -> f64 {
        if self.tau.is_degenerate() {
            return self.fine[[channel, surface_index, 0]];
        }
        let (k, w) = self.tau.locate(tau);
        if w.is_nan() {
            return f64::NAN;
        }
        let pos = w * self.upsample as f64;
        let j = (pos.floor() as usize).min(self.upsample - 1);
        let i = k * self.upsample + j;
        lerp(
            self.fine[[channel, surface_index, i]],
            self.fine[[channel, surface_index, i + 1]],
            pos - j as f64,
        )
    }

    /// Value at an arbitrary surface coordinate, linear in surface and τ
    #[inline]
    pub fn value_at_surface(&self, channel: usize, surface: f64, tau: f64) -> f64 {
        let (s, w) = self.surface.locate(surface);
        if self.surface.is_degenerate() {
            return self.value_at(channel, 0, tau);
        }
        lerp(
            self.value_at(channel, s, tau),
            self.value_at(channel, s + 1, tau),
            w,
        )
    }
}

/// Reduces per-channel master tables to a `ReducedLut` at fixed geometry
#[derive(Debug, Clone)]
pub struct LutAxisReduction {
    /// Fine τ samples per native τ interval
    upsample: usize,
}

impl LutAxisReduction {
    pub fn new(upsample: usize) -> AerosolResult<Self> {
        if upsample == 0 {
            return Err(AerosolError::Configuration(
                "τ upsampling factor must be at least 1".to_string(),
            ));
        }
        Ok(Self { upsample })
    }

    /// Collapse azimuth, view zenith, sun zenith and pressure of every channel
    ///
    /// All channels must share the same surface and τ axes.
    pub fn reduce(&self, channels: &[ChannelTable<'_>]) -> AerosolResult<ReducedLut> {
        let first = channels.first().ok_or_else(|| {
            AerosolError::Configuration("LUT reduction needs at least one channel".to_string())
        })?;

        let surface = first.lut.table().axis(AXIS_SURFACE).clone();
        let tau = first.lut.table().axis(AXIS_OPTICAL_THICKNESS).clone();
        let n_surface = surface.len();
        let n_tau = tau.len();

        let n_fine = (n_tau - 1) * self.upsample + 1;
        let mut fine = Array3::zeros((channels.len(), n_surface, n_fine));

        for (c, channel) in channels.iter().enumerate() {
            let table = channel.lut.table();
            if table.axis(AXIS_SURFACE) != &surface || table.axis(AXIS_OPTICAL_THICKNESS) != &tau {
                return Err(AerosolError::Configuration(format!(
                    "Channel {} does not share the surface/τ axes of channel 0",
                    c
                )));
            }

            let reduced = channel.lut.subsection(&channel.geometry)?;
            // reduced is row-major over (surface, τ)
            for s in 0..n_surface {
                let row = &reduced.values()[s * n_tau..(s + 1) * n_tau];
                fine[[c, s, n_fine - 1]] = row[n_tau - 1];
                for (k, pair) in row.windows(2).enumerate() {
                    for j in 0..self.upsample {
                        let w = j as f64 / self.upsample as f64;
                        fine[[c, s, k * self.upsample + j]] = lerp(pair[0], pair[1], w);
                    }
                }
            }
        }

        Ok(ReducedLut {
            surface,
            tau,
            upsample: self.upsample,
            fine,
        })
    }
}
