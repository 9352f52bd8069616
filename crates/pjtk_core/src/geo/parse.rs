//! Text decoders for geometries supplied by callers.
//!
//! Accepted inputs:
//! - WKT `POINT`, `LINESTRING`, `POLYGON`, `MULTIPOLYGON`, optionally prefixed
//!   with `SRID=4326;`.
//! - GeoJSON geometry objects of the same types.
//! - Buffered points `POINT(lon lat)[radius_m]`.

use super::geometry::{Geometry, Point, Polygon, Region};
use super::{GeoError, GeoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;

/// Deepest parenthesis nesting any accepted WKT type uses (`MULTIPOLYGON`).
const MAX_WKT_DEPTH: usize = 3;

/// Buffer radius applied when a buffered point carries no explicit radius.
pub const DEFAULT_BUFFER_RADIUS_M: f64 = 5000.0;

static BUFFERED_POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(POINT\s*\([^)]*\))\s*(?:\[\s*([0-9]+(?:\.[0-9]*)?)\s*\])?\s*$")
        .expect("valid buffered point regex")
});

/// Parses WKT or, when the text starts with `{`, GeoJSON.
pub fn parse_geometry(text: &str) -> GeoResult<Geometry> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        let value: JsonValue = serde_json::from_str(trimmed)
            .map_err(|err| GeoError::InvalidGeoJson(err.to_string()))?;
        return geometry_from_geojson(&value);
    }
    parse_wkt(trimmed)
}

/// Parses a region of interest, promoting closed line strings to polygons.
pub fn parse_region(text: &str) -> GeoResult<Region> {
    let geometry = parse_geometry(text)?;
    let kind = geometry.type_name();
    Region::from_geometry(geometry).ok_or(GeoError::NotAPolygon(kind))
}

/// Parses `POINT(lon lat)[radius_m]` into a circular region.
pub fn parse_buffered_point(text: &str) -> GeoResult<Region> {
    let caps = BUFFERED_POINT_RE
        .captures(text)
        .ok_or_else(|| GeoError::InvalidWkt(format!("not a buffered point: `{}`", text.trim())))?;
    let point_text = caps.get(1).map_or("", |m| m.as_str());
    let Geometry::Point(center) = parse_wkt(point_text)? else {
        return Err(GeoError::InvalidWkt(format!("not a point: `{point_text}`")));
    };
    let radius_m = match caps.get(2) {
        Some(m) => m
            .as_str()
            .parse::<f64>()
            .map_err(|_| GeoError::InvalidWkt(format!("invalid radius `{}`", m.as_str())))?,
        None => DEFAULT_BUFFER_RADIUS_M,
    };
    Ok(Region::Circle { center, radius_m })
}

enum Node {
    Coords(Vec<Point>),
    List(Vec<Node>),
}

struct WktReader<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
    source: &'a str,
}

/// Parses well-known text.
pub fn parse_wkt(text: &str) -> GeoResult<Geometry> {
    let mut body = text.trim();
    if body
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("SRID="))
    {
        body = body
            .split_once(';')
            .map(|(_, rest)| rest.trim())
            .ok_or_else(|| GeoError::InvalidWkt(text.to_string()))?;
    }

    let tag_end = body
        .find(|c: char| c == '(' || c.is_whitespace())
        .ok_or_else(|| GeoError::InvalidWkt(text.to_string()))?;
    let tag = body[..tag_end].to_ascii_uppercase();
    let mut reader = WktReader {
        input: body.as_bytes(),
        pos: tag_end,
        depth: 0,
        source: text,
    };
    let node = reader.node()?;
    reader.skip_ws();
    if reader.pos != reader.input.len() {
        return Err(reader.error("trailing characters"));
    }

    match (tag.as_str(), node) {
        ("POINT", Node::Coords(points)) if points.len() == 1 => Ok(Geometry::Point(points[0])),
        ("LINESTRING", Node::Coords(points)) if points.len() >= 2 => {
            Ok(Geometry::LineString(points))
        }
        ("POLYGON", Node::List(rings)) => Ok(Geometry::Polygon(polygon_from_nodes(rings, text)?)),
        ("MULTIPOLYGON", Node::List(polygons)) => {
            let mut parts = Vec::with_capacity(polygons.len());
            for polygon in polygons {
                let Node::List(rings) = polygon else {
                    return Err(GeoError::InvalidWkt(text.to_string()));
                };
                parts.push(polygon_from_nodes(rings, text)?);
            }
            Ok(Geometry::MultiPolygon(parts))
        }
        (other, _) if !matches!(other, "POINT" | "LINESTRING" | "POLYGON" | "MULTIPOLYGON") => {
            Err(GeoError::UnsupportedGeometry(other.to_string()))
        }
        _ => Err(GeoError::InvalidWkt(text.to_string())),
    }
}

fn polygon_from_nodes(rings: Vec<Node>, source: &str) -> GeoResult<Polygon> {
    let mut coords = Vec::with_capacity(rings.len());
    for ring in rings {
        match ring {
            Node::Coords(points) if points.len() >= 3 => coords.push(points),
            _ => return Err(GeoError::InvalidWkt(source.to_string())),
        }
    }
    let mut iter = coords.into_iter();
    let exterior = iter
        .next()
        .ok_or_else(|| GeoError::InvalidWkt(source.to_string()))?;
    Ok(Polygon::new(exterior, iter.collect()))
}

impl WktReader<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> GeoResult<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected `{}`", byte as char)))
        }
    }

    fn node(&mut self) -> GeoResult<Node> {
        self.expect(b'(')?;
        self.depth += 1;
        if self.depth > MAX_WKT_DEPTH {
            return Err(self.error("parentheses nested too deeply"));
        }
        let node = self.node_body()?;
        self.depth -= 1;
        Ok(node)
    }

    fn node_body(&mut self) -> GeoResult<Node> {
        if self.peek() == Some(b'(') {
            let mut children = vec![self.node()?];
            while self.peek() == Some(b',') {
                self.pos += 1;
                children.push(self.node()?);
            }
            self.expect(b')')?;
            return Ok(Node::List(children));
        }

        let mut points = vec![self.coordinate()?];
        while self.peek() == Some(b',') {
            self.pos += 1;
            points.push(self.coordinate()?);
        }
        self.expect(b')')?;
        Ok(Node::Coords(points))
    }

    fn coordinate(&mut self) -> GeoResult<Point> {
        let lon = self.number()?;
        let lat = self.number()?;
        Ok(Point::new(lon, lat))
    }

    fn number(&mut self) -> GeoResult<f64> {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.input.len()
            && matches!(self.input[self.pos], b'0'..=b'9' | b'.' | b'-' | b'+' | b'e' | b'E')
        {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.error("expected a number"))
    }

    fn error(&self, message: &str) -> GeoError {
        GeoError::InvalidWkt(format!("{message} at offset {} in `{}`", self.pos, self.source))
    }
}

/// Decodes a GeoJSON geometry object.
pub fn geometry_from_geojson(value: &JsonValue) -> GeoResult<Geometry> {
    let kind = value
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| GeoError::InvalidGeoJson("missing `type`".to_string()))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| GeoError::InvalidGeoJson("missing `coordinates`".to_string()))?;

    match kind {
        "Point" => Ok(Geometry::Point(json_point(coords)?)),
        "LineString" => Ok(Geometry::LineString(json_ring(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(json_polygon(coords)?)),
        "MultiPolygon" => {
            let parts = json_array(coords)?
                .iter()
                .map(json_polygon)
                .collect::<GeoResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(parts))
        }
        other => Err(GeoError::UnsupportedGeometry(other.to_string())),
    }
}

fn json_array(value: &JsonValue) -> GeoResult<&Vec<JsonValue>> {
    value
        .as_array()
        .ok_or_else(|| GeoError::InvalidGeoJson(format!("expected an array, got {value}")))
}

fn json_point(value: &JsonValue) -> GeoResult<Point> {
    let pair = json_array(value)?;
    match (
        pair.first().and_then(JsonValue::as_f64),
        pair.get(1).and_then(JsonValue::as_f64),
    ) {
        (Some(lon), Some(lat)) => Ok(Point::new(lon, lat)),
        _ => Err(GeoError::InvalidGeoJson(format!("invalid position {value}"))),
    }
}

fn json_ring(value: &JsonValue) -> GeoResult<Vec<Point>> {
    json_array(value)?.iter().map(json_point).collect()
}

fn json_polygon(value: &JsonValue) -> GeoResult<Polygon> {
    let mut rings = json_array(value)?
        .iter()
        .map(json_ring)
        .collect::<GeoResult<Vec<_>>>()?
        .into_iter();
    let exterior = rings
        .next()
        .filter(|ring| ring.len() >= 3)
        .ok_or_else(|| GeoError::InvalidGeoJson("polygon needs an exterior ring".to_string()))?;
    Ok(Polygon::new(exterior, rings.collect()))
}
