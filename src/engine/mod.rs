//! Geospatial compute backends
//!
//! The pipeline never talks to a raster store directly. It describes the
//! image it needs as an [`ImageExpr`] and asks a [`GeoEngine`] to aggregate
//! it over a batch of geometries. [`RemoteEngine`] forwards the request to the
//! hosted compute service; [`LocalEngine`] evaluates it in-process.

pub mod auth;
pub mod expr;
pub mod local;
pub mod remote;

pub use auth::{authenticate, authenticate_with, AuthResult, AuthSession};
pub use expr::{
    from_geojson, to_geojson, to_geojson_all, CollectionExpr, CollectionOp, ImageExpr,
    ReduceRegionsRequest, ReduceRegionsResponse, ReducedFeature, Reducer,
};
pub use local::{GridSpec, LocalCatalog, LocalEngine, Raster, Scene};
pub use remote::RemoteEngine;

use crate::types::YieldResult;

/// Submit-geometries-get-band-values contract of a compute backend
pub trait GeoEngine {
    /// Reduce `request.image` over every geometry of the request. The response
    /// carries exactly one feature per geometry, in request order.
    fn reduce_regions(&self, request: &ReduceRegionsRequest) -> YieldResult<ReduceRegionsResponse>;
}
