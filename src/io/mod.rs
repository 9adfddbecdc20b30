//! Configuration, LUT loading and raster adapters

pub mod config;
pub mod lut_cache;
pub mod raster;

pub use config::{ChannelSpec, RetrievalConfig};
pub use lut_cache::{InMemoryLutLoader, LandModelLut, LutLoader, ModelLutCache, ModelLuts};
pub use raster::{OutputRasters, RasterBlock};
