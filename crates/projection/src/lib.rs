//! Coordinate reference system transformations and extent geometry.
//!
//! Implements map projections from scratch without external dependencies.
//! Every coordinate pair is (x, y) = (easting or longitude, northing or latitude);
//! axis order never changes between CRSs.

pub mod buffer;
pub mod ellipsoid;
pub mod error;
pub mod lambert;
pub mod mercator;
pub mod transform;
pub mod transverse_mercator;

pub use buffer::{buffered_extent, fit_extent_to_canvas};
pub use ellipsoid::Ellipsoid;
pub use error::{ProjectionError, ProjectionResult};
pub use lambert::LambertConformal;
pub use transform::{
    covering_bbox, point_scale, project_point, reproject_bbox, reproject_geometry, reproject_point,
    unproject_point, Projection, Transformer,
};
pub use transverse_mercator::TransverseMercator;
