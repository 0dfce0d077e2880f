//! cropyield: block-level kharif crop yield prediction
//!
//! Builds a five-feature remote-sensing composite (NDVI mean and variability,
//! land surface temperature, seasonal rainfall, soil organic carbon) over
//! cropland, aggregates it per administrative block through a geospatial
//! compute backend, and feeds the result to a random forest regressor.

pub mod types;
pub mod config;
pub mod io;
pub mod engine;
pub mod core;

// Re-export main types and functions for easier access
pub use types::{
    DateWindow, PredictedRegion, PredictionResult, Region, SeasonWindow, YieldError, YieldResult,
    EXPECTED_FEATURES, PREDICTED_YIELD,
};

pub use config::{DatasetCatalog, PipelineConfig, ServiceConfig};
pub use io::{FieldDataReader, FieldObservation, ModelArtifact, RegionSet, ServiceAccountCredentials};
pub use engine::{authenticate, AuthResult, AuthSession, GeoEngine, LocalEngine, RemoteEngine};
pub use crate::core::{
    AreaMasker, FeatureCollector, FeatureExtractor, FeatureTable, ModelTrainer, YieldPredictor,
};

#[cfg(feature = "python")]
mod python {
    use super::*;
    use pyo3::prelude::*;
    use std::sync::Arc;

    fn to_py_err(e: YieldError) -> PyErr {
        match e {
            YieldError::InvalidFormat(_) | YieldError::MissingAttribute { .. } => {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
            }
            YieldError::ModelNotFound(_) => {
                PyErr::new::<pyo3::exceptions::PyFileNotFoundError, _>(format!("{}", e))
            }
            _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
        }
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_class::<PyRegionSet>()?;
        m.add_class::<PyYieldPredictor>()?;
        m.add("EXPECTED_FEATURES", EXPECTED_FEATURES.to_vec())?;
        Ok(())
    }

    /// Python wrapper for RegionSet
    #[pyclass(name = "RegionSet")]
    struct PyRegionSet {
        inner: RegionSet,
    }

    #[pymethods]
    impl PyRegionSet {
        #[new]
        fn new(path: String) -> PyResult<Self> {
            let inner = RegionSet::from_path(&path).map_err(to_py_err)?;
            Ok(PyRegionSet { inner })
        }

        fn states(&self) -> Vec<String> {
            self.inner.states()
        }

        fn districts(&self, state: &str) -> Vec<String> {
            self.inner.districts(state)
        }

        fn blocks(&self, state: &str, district: &str) -> Vec<String> {
            self.inner
                .select(state, district)
                .into_iter()
                .map(|r| r.block)
                .collect()
        }

        fn __len__(&self) -> usize {
            self.inner.len()
        }

        fn __repr__(&self) -> String {
            format!("RegionSet(regions={})", self.inner.len())
        }
    }

    /// Python wrapper for YieldPredictor
    #[pyclass(name = "YieldPredictor")]
    struct PyYieldPredictor {
        inner: YieldPredictor,
    }

    #[pymethods]
    impl PyYieldPredictor {
        #[new]
        fn new(model_path: String) -> PyResult<Self> {
            let artifact = ModelArtifact::load(&model_path).map_err(to_py_err)?;
            Ok(PyYieldPredictor {
                inner: YieldPredictor::new(Arc::new(artifact), PipelineConfig::default()),
            })
        }

        #[getter]
        fn feature_names(&self) -> Vec<String> {
            self.inner.model().feature_names().to_vec()
        }

        /// Predict one yield per row; `None` cells are imputed
        fn predict(&self, columns: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> PyResult<Vec<f64>> {
            let table = FeatureTable::from_rows(columns, rows).map_err(to_py_err)?;
            self.inner.predict_table(&table).map_err(to_py_err)
        }
    }
}
