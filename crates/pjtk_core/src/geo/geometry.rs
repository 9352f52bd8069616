//! Planar geometry over WGS84 longitude/latitude pairs.
//!
//! # Invariants
//! - Rings are stored closed (first point equals last point).
//! - `within` excludes the boundary; `intersects` includes it.
//! - Distances are great-circle metres.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const EARTH_RADIUS_M: f64 = 6_371_008.8;
const BOUNDARY_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lon: f64,
    pub lat: f64,
}

impl Point {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Haversine distance in metres.
    pub fn distance_m(&self, other: &Point) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Envelope {
    /// Inclusive containment.
    pub fn contains(&self, point: &Point) -> bool {
        point.lon >= self.min_lon
            && point.lon <= self.max_lon
            && point.lat >= self.min_lat
            && point.lat <= self.max_lat
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
    /// Builds a polygon, closing any open ring.
    pub fn new(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
        Self {
            exterior: close_ring(exterior),
            interiors: interiors.into_iter().map(close_ring).collect(),
        }
    }

    fn location(&self, point: &Point) -> Location {
        match ring_location(&self.exterior, point) {
            Location::Inside => {}
            other => return other,
        }
        for hole in &self.interiors {
            match ring_location(hole, point) {
                Location::Inside => return Location::Outside,
                Location::Boundary => return Location::Boundary,
                Location::Outside => {}
            }
        }
        Location::Inside
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Inside,
    Boundary,
    Outside,
}

/// Any geometry the tracker reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    LineString(Vec<Point>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::LineString(_) => "LineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }
}

impl Display for Geometry {
    /// Well-known text.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Point(point) => write!(f, "POINT ({} {})", point.lon, point.lat),
            Self::LineString(points) => write!(f, "LINESTRING {}", coords_wkt(points)),
            Self::Polygon(polygon) => write!(f, "POLYGON {}", polygon_wkt(polygon)),
            Self::MultiPolygon(polygons) => {
                let parts = polygons.iter().map(polygon_wkt).collect::<Vec<_>>();
                write!(f, "MULTIPOLYGON ({})", parts.join(", "))
            }
        }
    }
}

fn coords_wkt(points: &[Point]) -> String {
    let coords = points
        .iter()
        .map(|p| format!("{} {}", p.lon, p.lat))
        .collect::<Vec<_>>();
    format!("({})", coords.join(", "))
}

fn polygon_wkt(polygon: &Polygon) -> String {
    let rings = std::iter::once(&polygon.exterior)
        .chain(polygon.interiors.iter())
        .map(|ring| coords_wkt(ring))
        .collect::<Vec<_>>();
    format!("({})", rings.join(", "))
}

/// Area used to filter sample points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Region {
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
    /// A point buffered by a radius in metres.
    Circle { center: Point, radius_m: f64 },
}

impl Region {
    /// Promotes a geometry to a region of interest.
    ///
    /// Closed line strings become polygons; points and open lines are refused.
    pub fn from_geometry(geometry: Geometry) -> Option<Self> {
        match geometry {
            Geometry::Polygon(polygon) => Some(Self::Polygon(polygon)),
            Geometry::MultiPolygon(polygons) => Some(Self::MultiPolygon(polygons)),
            Geometry::LineString(points) => {
                let closed = points.len() >= 4 && points.first() == points.last();
                closed.then(|| Self::Polygon(Polygon::new(points, Vec::new())))
            }
            Geometry::Point(_) => None,
        }
    }

    /// Strict interior containment.
    pub fn contains(&self, point: &Point) -> bool {
        match self {
            Self::Polygon(polygon) => polygon.location(point) == Location::Inside,
            Self::MultiPolygon(polygons) => polygons
                .iter()
                .any(|polygon| polygon.location(point) == Location::Inside),
            Self::Circle { center, radius_m } => center.distance_m(point) < *radius_m,
        }
    }

    /// Interior or boundary contact.
    pub fn intersects(&self, point: &Point) -> bool {
        match self {
            Self::Polygon(polygon) => polygon.location(point) != Location::Outside,
            Self::MultiPolygon(polygons) => polygons
                .iter()
                .any(|polygon| polygon.location(point) != Location::Outside),
            Self::Circle { center, radius_m } => center.distance_m(point) <= *radius_m,
        }
    }

    /// Whether a project's point set lies entirely inside the region.
    ///
    /// An empty set is never within.
    pub fn contains_all(&self, points: &[Point]) -> bool {
        !points.is_empty() && points.iter().all(|point| self.contains(point))
    }

    pub fn intersects_any(&self, points: &[Point]) -> bool {
        points.iter().any(|point| self.intersects(point))
    }
}

fn close_ring(mut ring: Vec<Point>) -> Vec<Point> {
    if let (Some(first), Some(last)) = (ring.first().copied(), ring.last().copied()) {
        if first != last {
            ring.push(first);
        }
    }
    ring
}

fn ring_location(ring: &[Point], point: &Point) -> Location {
    let mut inside = false;
    for pair in ring.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if on_segment(&a, &b, point) {
            return Location::Boundary;
        }
        let crosses = (a.lat > point.lat) != (b.lat > point.lat);
        if crosses {
            let lon_at = a.lon + (point.lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
            if point.lon < lon_at {
                inside = !inside;
            }
        }
    }
    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

fn on_segment(a: &Point, b: &Point, p: &Point) -> bool {
    let cross = (b.lon - a.lon) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lon - a.lon);
    if cross.abs() > BOUNDARY_EPSILON {
        return false;
    }
    p.lon >= a.lon.min(b.lon) - BOUNDARY_EPSILON
        && p.lon <= a.lon.max(b.lon) + BOUNDARY_EPSILON
        && p.lat >= a.lat.min(b.lat) - BOUNDARY_EPSILON
        && p.lat <= a.lat.max(b.lat) + BOUNDARY_EPSILON
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.lon - o.lon) * (b.lat - o.lat) - (a.lat - o.lat) * (b.lon - o.lon)
}

/// Convex hull of a point set (monotone chain).
///
/// Degenerates to a point or line string for fewer than three distinct,
/// non-collinear points. Returns `None` for an empty set.
pub fn convex_hull(points: &[Point]) -> Option<Geometry> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.lon.total_cmp(&b.lon).then(a.lat.total_cmp(&b.lat)));
    sorted.dedup();

    match sorted.len() {
        0 => return None,
        1 => return Some(Geometry::Point(sorted[0])),
        _ => {}
    }

    let mut lower: Vec<Point> = Vec::new();
    for p in &sorted {
        while lower.len() >= 2 && cross(&lower[lower.len() - 2], &lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(*p);
    }
    let mut upper: Vec<Point> = Vec::new();
    for p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(&upper[upper.len() - 2], &upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(*p);
    }
    lower.pop();
    upper.pop();
    lower.extend(upper);

    if lower.len() < 3 {
        let first = sorted[0];
        let last = sorted[sorted.len() - 1];
        return Some(Geometry::LineString(vec![first, last]));
    }
    Some(Geometry::Polygon(Polygon::new(lower, Vec::new())))
}
