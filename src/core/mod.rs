//! Core yield pipeline modules

pub mod collector;
pub mod extract;
pub mod forest;
pub mod masking;
pub mod predict;
pub mod render;
pub mod table;
pub mod trainer;

// Re-export main types
pub use collector::{FeatureCollector, SeasonLayers};
pub use extract::FeatureExtractor;
pub use forest::{ForestParams, RandomForestRegressor, RegressionTree};
pub use masking::AreaMasker;
pub use predict::{RegressionModel, YieldPredictor};
pub use render::{bar_chart, to_feature_collection, yield_labels, BarChart, Theme, YieldLabel};
pub use table::FeatureTable;
pub use trainer::{ModelTrainer, TrainingOutcome, TrainingReport};
