//! File and credential I/O

pub mod credentials;
pub mod field_data;
pub mod model_store;
pub mod regions;

pub use credentials::ServiceAccountCredentials;
pub use field_data::{FieldDataReader, FieldObservation};
pub use model_store::ModelArtifact;
pub use regions::RegionSet;
