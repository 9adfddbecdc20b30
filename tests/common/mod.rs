#![allow(dead_code)]

use ndarray::Array3;
use synaero::core::{Axis, LookupTable, MasterLut, SurfaceAxis};
use synaero::io::{ChannelSpec, InMemoryLutLoader, LandModelLut, ModelLutCache, RasterBlock, RetrievalConfig};
use synaero::{AerosolModelId, BlockLayout, FieldSpec, SurfaceType, View, ViewGeometryFields};
use std::sync::Arc;

pub const WAVELENGTHS: [f64; 3] = [550.0, 670.0, 865.0];
pub const WIND_NODES: [f64; 3] = [0.0, 5.0, 10.0];
pub const ALBEDO_NODES: [f64; 3] = [0.0, 0.25, 0.5];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn id(n: u8) -> AerosolModelId {
    AerosolModelId::new(n).unwrap()
}

/// Master table that ignores geometry and pressure: value = f(surface, τ)
pub fn master(surface_axis: SurfaceAxis, surface_nodes: &[f64], f: impl Fn(f64, f64) -> f64) -> MasterLut {
    geometric_master(surface_axis, surface_nodes, |[_, _, _, s, t, _]| f(s, t))
}

/// Master table over [azimuth, vza, sza, surface, τ, pressure]; pressure is
/// stored negated but handed to `f` in hPa
pub fn geometric_master(
    surface_axis: SurfaceAxis,
    surface_nodes: &[f64],
    f: impl Fn([f64; 6]) -> f64,
) -> MasterLut {
    let axes = vec![
        Axis::new(vec![0.0, 180.0]).unwrap(),
        Axis::new(vec![0.0, 70.0]).unwrap(),
        Axis::new(vec![0.0, 80.0]).unwrap(),
        Axis::new(surface_nodes.to_vec()).unwrap(),
        Axis::new(vec![0.0, 0.5, 1.0, 1.5, 2.0]).unwrap(),
        Axis::new(vec![-1100.0, -500.0]).unwrap(),
    ];
    let mut values = Vec::new();
    for &a in axes[0].values() {
        for &v in axes[1].values() {
            for &z in axes[2].values() {
                for &s in axes[3].values() {
                    for &t in axes[4].values() {
                        for &p in axes[5].values() {
                            values.push(f([a, v, z, s, t, -p]));
                        }
                    }
                }
            }
        }
    }
    MasterLut::new(LookupTable::new(axes, values).unwrap(), surface_axis, true).unwrap()
}

/// Ocean reflectance model: offset + 0.001·wind + slope·τλ
pub fn ocean_reflectance(offset: f64, slope: f64, wind: f64, tau_lambda: f64) -> f64 {
    offset + 0.001 * wind + slope * tau_lambda
}

/// Model 1 is (0.02, 0.1), model 2 is (0.03, 0.07)
pub fn ocean_cache(channels: Vec<ChannelSpec>) -> Arc<ModelLutCache> {
    let mut loader = InMemoryLutLoader::new();
    for (model, offset, slope) in [(1u8, 0.02, 0.1), (2u8, 0.03, 0.07)] {
        for c in 0..WAVELENGTHS.len() {
            loader.insert_ocean(
                id(model),
                c,
                master(SurfaceAxis::WindSpeed, &WIND_NODES, |w, t| ocean_reflectance(offset, slope, w, t)),
            );
        }
    }
    Arc::new(ModelLutCache::new(Arc::new(loader), SurfaceType::Ocean, channels))
}

pub fn ocean_config() -> RetrievalConfig {
    RetrievalConfig {
        surface: SurfaceType::Ocean,
        channels: WAVELENGTHS
            .iter()
            .enumerate()
            .map(|(c, &wl)| ChannelSpec::new(View::Meris, wl, c))
            .collect(),
        candidate_models: vec![id(1), id(2)],
        ..RetrievalConfig::default()
    }
}

/// Observed ocean reflectance of model 1 for τ550, Ångström and wind
pub fn ocean_observation(channel: usize, tau: f64, angstrom: f64, wind: f64) -> f64 {
    let tau_lambda = tau * (WAVELENGTHS[channel] / 550.0).powf(-angstrom);
    ocean_reflectance(0.02, 0.1, wind, tau_lambda)
}

pub const LAND_SHAPES: [f64; 3] = [1.0, 1.5, 2.0];
pub const LAND_TAU_SLOPES: [[f64; 3]; 2] = [[0.1, 0.08, 0.06], [0.05, 0.07, 0.02]];
pub const LAND_ALBEDO_SLOPES: [f64; 2] = [0.5, 0.3];

pub fn land_reflectance(model: usize, channel: usize, albedo: f64, tau: f64) -> f64 {
    0.01 + LAND_ALBEDO_SLOPES[model] * albedo + LAND_TAU_SLOPES[model][channel] * tau
}

pub fn land_cache(channels: Vec<ChannelSpec>) -> Arc<ModelLutCache> {
    let mut loader = InMemoryLutLoader::new();
    for model in 0..2 {
        let tables = (0..3)
            .map(|c| master(SurfaceAxis::Albedo, &ALBEDO_NODES, |a, t| land_reflectance(model, c, a, t)))
            .collect();
        loader.insert_land(
            id(model as u8 + 1),
            LandModelLut {
                channels: tables,
                nominal_angstrom: Some(1.3 + model as f64),
            },
        );
    }
    Arc::new(ModelLutCache::new(Arc::new(loader), SurfaceType::Land, channels))
}

pub fn land_config() -> RetrievalConfig {
    RetrievalConfig {
        surface: SurfaceType::Land,
        channels: WAVELENGTHS
            .iter()
            .enumerate()
            .map(|(c, &wl)| ChannelSpec::new(View::Meris, wl, c).with_surface_shape(LAND_SHAPES[c]))
            .collect(),
        candidate_models: vec![id(1), id(2)],
        ..RetrievalConfig::for_surface(SurfaceType::Land)
    }
}

/// Fields 0..3 channels, 3..7 sun zenith, view zenith, sun azimuth, view azimuth
pub fn meris_layout() -> BlockLayout {
    BlockLayout::new(vec![FieldSpec::new(0), FieldSpec::new(1), FieldSpec::new(2)]).with_view(
        View::Meris,
        ViewGeometryFields {
            sun_zenith: FieldSpec::new(3),
            view_zenith: FieldSpec::new(4),
            sun_azimuth: FieldSpec::new(5),
            view_azimuth: FieldSpec::new(6),
        },
    )
}

/// Uniform block whose channel fields hold `observed`; `extra` adds fields after the angles
pub fn uniform_block(rows: usize, cols: usize, observed: &[f64; 3], extra: &[f64]) -> RasterBlock {
    let angles = [30.0, 20.0, 100.0, 50.0];
    let n_fields = 7 + extra.len();
    let mut fields = Array3::zeros((n_fields, rows, cols));
    for f in 0..n_fields {
        let value = if f < 3 {
            observed[f]
        } else if f < 7 {
            angles[f - 3]
        } else {
            extra[f - 7]
        };
        fields.index_axis_mut(ndarray::Axis(0), f).fill(value);
    }
    RasterBlock::from_fields(fields)
}

/// Additive geometry and pressure term; linear, so the tables reproduce it exactly
pub fn geometry_term(relative_azimuth: f64, view_zenith: f64, sun_zenith: f64, pressure: f64) -> f64 {
    0.0001 * relative_azimuth + 0.0003 * view_zenith + 0.0007 * sun_zenith + 0.00002 * pressure
}

/// Model 1 ocean tables with the geometry term added
pub fn ocean_geometry_cache(channels: Vec<ChannelSpec>) -> Arc<ModelLutCache> {
    let mut loader = InMemoryLutLoader::new();
    for c in 0..WAVELENGTHS.len() {
        loader.insert_ocean(
            id(1),
            c,
            geometric_master(SurfaceAxis::WindSpeed, &WIND_NODES, |[a, v, z, w, t, p]| {
                ocean_reflectance(0.02, 0.1, w, t) + geometry_term(a, v, z, p)
            }),
        );
    }
    Arc::new(ModelLutCache::new(Arc::new(loader), SurfaceType::Ocean, channels))
}

/// One channel per view: 550 nm MERIS, 670 nm AATSR nadir, 865 nm AATSR forward
pub const CHANNEL_VIEWS: [View; 3] = [View::Meris, View::AatsrNadir, View::AatsrForward];

/// Sun zenith, view zenith, sun azimuth, view azimuth per view, in `CHANNEL_VIEWS` order
pub const VIEW_ANGLES: [[f64; 4]; 3] = [
    [30.0, 20.0, 100.0, 50.0],
    [32.0, 3.0, 100.0, 280.0],
    [33.0, 55.0, 100.0, 120.0],
];

/// Relative azimuths that `VIEW_ANGLES` fold to
pub const RELATIVE_AZIMUTHS: [f64; 3] = [50.0, 180.0, 20.0];

pub fn multi_view_config() -> RetrievalConfig {
    RetrievalConfig {
        channels: WAVELENGTHS
            .iter()
            .zip(CHANNEL_VIEWS)
            .enumerate()
            .map(|(c, (&wl, view))| ChannelSpec::new(view, wl, c))
            .collect(),
        candidate_models: vec![id(1)],
        ..RetrievalConfig::default()
    }
}

/// Fields 0..3 channels, then 4 angles per view starting at 3, 7 and 11
pub fn multi_view_layout() -> BlockLayout {
    let channels = vec![FieldSpec::new(0), FieldSpec::new(1), FieldSpec::new(2)];
    CHANNEL_VIEWS
        .iter()
        .enumerate()
        .fold(BlockLayout::new(channels), |layout, (v, &view)| {
            let o = 3 + 4 * v;
            layout.with_view(
                view,
                ViewGeometryFields {
                    sun_zenith: FieldSpec::new(o),
                    view_zenith: FieldSpec::new(o + 1),
                    sun_azimuth: FieldSpec::new(o + 2),
                    view_azimuth: FieldSpec::new(o + 3),
                },
            )
        })
}

/// Observed reflectances of the geometry-aware model seen through `VIEW_ANGLES`
pub fn multi_view_observation(tau: f64, angstrom: f64, wind: f64, pressure: f64) -> [f64; 3] {
    let mut observed = [0.0; 3];
    for (c, value) in observed.iter_mut().enumerate() {
        let [sun_zenith, view_zenith, _, _] = VIEW_ANGLES[c];
        *value = ocean_observation(c, tau, angstrom, wind)
            + geometry_term(RELATIVE_AZIMUTHS[c], view_zenith, sun_zenith, pressure);
    }
    observed
}

/// Uniform block laid out for `multi_view_layout`; `extra` adds fields from 15 on
pub fn multi_view_block(rows: usize, cols: usize, observed: &[f64; 3], extra: &[f64]) -> RasterBlock {
    let mut values: Vec<f64> = observed.to_vec();
    for angles in VIEW_ANGLES {
        values.extend(angles);
    }
    values.extend_from_slice(extra);
    let mut fields = Array3::zeros((values.len(), rows, cols));
    for (f, &value) in values.iter().enumerate() {
        fields.index_axis_mut(ndarray::Axis(0), f).fill(value);
    }
    RasterBlock::from_fields(fields)
}
