use crate::core::forest::RandomForestRegressor;
use crate::types::{YieldError, YieldResult};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

pub const ARTIFACT_VERSION: u32 = 1;

/// Fitted yield model plus what prediction needs to feed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: u32,
    /// Column order the forest was fitted on
    pub feature_names: Vec<String>,
    /// Per-feature means of the training rows
    pub training_means: Vec<f64>,
    pub forest: RandomForestRegressor,
}

impl ModelArtifact {
    pub fn new(
        feature_names: Vec<String>,
        training_means: Vec<f64>,
        forest: RandomForestRegressor,
    ) -> YieldResult<Self> {
        let artifact = Self {
            version: ARTIFACT_VERSION,
            feature_names,
            training_means,
            forest,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Consistency of names, means and forest
    pub fn validate(&self) -> YieldResult<()> {
        let n = self.forest.n_features();
        if self.feature_names.len() != n || self.training_means.len() != n {
            return Err(YieldError::InvalidFormat(format!(
                "Model has {} features but {} names and {} means",
                n,
                self.feature_names.len(),
                self.training_means.len()
            )));
        }
        self.forest.validate()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> YieldResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        log::info!("Model saved to: {}", path.display());
        Ok(())
    }

    /// Load a saved model. A missing file is [`YieldError::ModelNotFound`].
    pub fn load<P: AsRef<Path>>(path: P) -> YieldResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(YieldError::ModelNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let artifact: ModelArtifact = serde_json::from_reader(std::io::BufReader::new(file))?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(YieldError::InvalidFormat(format!(
                "Unsupported model version {} (expected {})",
                artifact.version, ARTIFACT_VERSION
            )));
        }
        artifact.validate()?;
        log::info!(
            "Loaded model from {}: {} trees over {:?}",
            path.display(),
            artifact.forest.n_trees(),
            artifact.feature_names
        );
        Ok(artifact)
    }
}
