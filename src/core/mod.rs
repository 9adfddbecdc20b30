//! Core retrieval modules

pub mod lut;
pub mod subsection;
pub mod cost;
pub mod aggregate;
pub mod geometry;
pub mod wind;
pub mod sweep;
pub mod retrieval;

// Re-export main types
pub use lut::{Axis, LookupTable};
pub use subsection::{ChannelTable, LutAxisReduction, MasterLut, ObservationGeometry, ReducedLut, SurfaceAxis};
pub use cost::{CostMinimum, LandSpectralModel, OceanSpectralModel, SpectralCostEngine, SpectralModel, UniformGrid};
pub use aggregate::{AngleConvention, FieldSpec, MinValidPolicy, PixelBlock, WindowAverage, WindowedPixelAggregator};
pub use wind::{AmbiguityStrategy, WindSolution};
pub use sweep::{Candidate, FailureThresholds, ModelSweepController, Transition};
pub use retrieval::{
    retrieve, BlockLayout, BlockRetrieval, ResultSink, RetrievalSession, RetrievalStats, ViewGeometryFields,
};
