//! synaero: MERIS/AATSR synergy aerosol retrieval engine
//!
//! Retrieves aerosol optical thickness, Ångström exponent and (over ocean)
//! wind speed and sun glint from co-registered top-of-atmosphere
//! reflectances, by fitting radiative-transfer lookup tables over a sweep
//! of candidate aerosol models.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    AerosolError, AerosolModelId, AerosolResult, PixelRetrievalResult, RetrievalFlags, SurfaceType, View,
};

pub use crate::core::{
    retrieve, Axis, BlockLayout, BlockRetrieval, FieldSpec, LookupTable, MasterLut, PixelBlock, ResultSink,
    RetrievalSession, RetrievalStats, ViewGeometryFields,
};
pub use io::{ChannelSpec, InMemoryLutLoader, LutLoader, ModelLutCache, OutputRasters, RasterBlock, RetrievalConfig};

#[cfg(feature = "python")]
mod python {
    use crate::core::{Axis, LookupTable};
    use crate::types::RetrievalFlags;
    use numpy::{PyArray1, PyReadonlyArray1, PyReadonlyArray2};
    use pyo3::prelude::*;

    fn to_py_err(e: crate::types::AerosolError) -> PyErr {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyLookupTable>()?;
        m.add_function(wrap_pyfunction!(decode_flags, m)?)?;
        Ok(())
    }

    /// Python wrapper for the multilinear lookup table
    #[pyclass(name = "LookupTable")]
    struct PyLookupTable {
        inner: LookupTable,
    }

    #[pymethods]
    impl PyLookupTable {
        #[new]
        fn new(axes: Vec<Vec<f64>>, values: PyReadonlyArray1<f64>) -> PyResult<Self> {
            let axes = axes
                .into_iter()
                .map(Axis::new)
                .collect::<Result<Vec<_>, _>>()
                .map_err(to_py_err)?;
            let values: Vec<f64> = values.as_array().iter().copied().collect();
            let inner = LookupTable::new(axes, values).map_err(to_py_err)?;
            Ok(PyLookupTable { inner })
        }

        #[getter]
        fn ndim(&self) -> usize {
            self.inner.ndim()
        }

        fn evaluate(&self, coords: Vec<f64>) -> PyResult<f64> {
            self.inner.evaluate(&coords).map_err(to_py_err)
        }

        /// Evaluate every row of an (n, ndim) array of query points
        fn evaluate_many<'py>(
            &self,
            py: Python<'py>,
            points: PyReadonlyArray2<'py, f64>,
        ) -> PyResult<&'py PyArray1<f64>> {
            let points = points.as_array();
            let mut out = Vec::with_capacity(points.nrows());
            for row in points.rows() {
                let coords: Vec<f64> = row.iter().copied().collect();
                out.push(self.inner.evaluate(&coords).map_err(to_py_err)?);
            }
            Ok(PyArray1::from_vec(py, out))
        }

        fn __repr__(&self) -> String {
            let shape: Vec<usize> = self.inner.axes().iter().map(|a| a.len()).collect();
            format!("LookupTable(shape={:?})", shape)
        }
    }

    /// Names of the bits set in a retrieval flag word
    #[pyfunction]
    fn decode_flags(bits: u32) -> Vec<String> {
        RetrievalFlags::from_bits_truncate(bits)
            .iter_names()
            .map(|(name, _)| name.to_string())
            .collect()
    }
}
