//! Geometry used for sample points, project polygons and regional filters.
//!
//! # Responsibility
//! - Decode caller-supplied geometries (WKT, GeoJSON, buffered points).
//! - Answer containment questions for points against regions.
//! - Derive project polygons from sample points.
//!
//! # Invariants
//! - Coordinates are decimal degrees, longitude first.
//! - A region of interest is always areal: polygon, multipolygon or circle.

use std::error::Error;
use std::fmt::{Display, Formatter};

mod geometry;
mod parse;

pub use geometry::{convex_hull, Envelope, Geometry, Point, Polygon, Region};
pub use parse::{
    geometry_from_geojson, parse_buffered_point, parse_geometry, parse_region, parse_wkt,
    DEFAULT_BUFFER_RADIUS_M,
};

pub type GeoResult<T> = Result<T, GeoError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoError {
    InvalidWkt(String),
    InvalidGeoJson(String),
    UnsupportedGeometry(String),
    /// The geometry cannot be used as a region of interest.
    NotAPolygon(&'static str),
}

impl Display for GeoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidWkt(details) => write!(f, "invalid WKT: {details}"),
            Self::InvalidGeoJson(details) => write!(f, "invalid GeoJSON: {details}"),
            Self::UnsupportedGeometry(kind) => write!(f, "unsupported geometry type `{kind}`"),
            Self::NotAPolygon(kind) => write!(
                f,
                "region of interest must be a Polygon or MultiPolygon, got {kind}"
            ),
        }
    }
}

impl Error for GeoError {}
