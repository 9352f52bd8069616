//! Sample point uploads and region-of-interest queries.
//!
//! # Responsibility
//! - Validate and store sample point uploads, refreshing the project polygon.
//! - Answer region-of-interest questions over sample points.
//! - Apply geometry filters that SQL cannot express.
//!
//! # Invariants
//! - An upload is stored completely or not at all; every problem found is
//!   reported together.
//! - The stored polygon is always the convex hull of the stored points.

use super::{require_editor, ServiceError, ServiceResult};
use crate::geo::{convex_hull, parse_region, Point};
use crate::model::employee::Actor;
use crate::model::project::{Project, ProjectId};
use crate::model::spatial::{NewSamplePoint, SamplePoint, UploadMode};
use crate::repo::filter::{ProjectFilter, SpatialFilter};
use crate::repo::lookup_repo::{LookupRepository, SqliteLookupRepository};
use crate::repo::point_repo::{PointListing, PointRepository, SqlitePointRepository};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest accepted upload, in bytes.
pub const MAX_UPLOAD_BYTES: usize = 512 * 1024;
/// Largest accepted number of points in one upload.
pub const MAX_UPLOAD_POINTS: usize = 1000;
pub const EXPECTED_HEADER: [&str; 3] = ["POINT_LABEL", "DD_LAT", "DD_LON"];

/// Which points a region-of-interest query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiMode {
    /// Points inside the region, whatever their project.
    PointsIn,
    /// All points of projects lying entirely inside the region.
    #[default]
    Contained,
    /// All points of projects partly inside the region.
    Overlapping,
}

impl RoiMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "points_in" => Some(Self::PointsIn),
            "contained" => Some(Self::Contained),
            "overlapping" => Some(Self::Overlapping),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiQuery {
    pub how: RoiMode,
    pub project_types: Vec<i64>,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
}

/// The service wired to SQLite repositories on one connection.
pub type SqliteSpatialService<'conn> = SpatialService<
    SqliteProjectRepository<'conn>,
    SqliteLookupRepository<'conn>,
    SqlitePointRepository<'conn>,
>;

pub struct SpatialService<P, L, S>
where
    P: ProjectRepository,
    L: LookupRepository,
    S: PointRepository,
{
    projects: P,
    lookups: L,
    points: S,
}

impl<'conn> SqliteSpatialService<'conn> {
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteProjectRepository::new(conn),
            SqliteLookupRepository::new(conn),
            SqlitePointRepository::new(conn),
        )
    }
}

impl<P, L, S> SpatialService<P, L, S>
where
    P: ProjectRepository,
    L: LookupRepository,
    S: PointRepository,
{
    pub fn new(projects: P, lookups: L, points: S) -> Self {
        Self {
            projects,
            lookups,
            points,
        }
    }

    /// Validates a `POINT_LABEL,DD_LAT,DD_LON` CSV upload and stores it.
    ///
    /// Returns the number of points now stored on the project.
    pub fn upload_points(
        &self,
        actor: &Actor,
        slug: &str,
        csv_text: &str,
        mode: UploadMode,
    ) -> ServiceResult<usize> {
        let project = self.project(slug)?;
        require_editor(actor, &project, "upload sample points")?;

        let parsed = parse_points_csv(csv_text)?;
        let lake = self.lookups.get_lake(project.lake_id)?;
        if let Some(lake) = lake {
            if let Some(envelope) = lake.envelope {
                let outside = parsed
                    .iter()
                    .filter(|p| !envelope.contains(&Point::new(p.dd_lon, p.dd_lat)))
                    .count();
                if outside > 0 {
                    return Err(ServiceError::InvalidUpload(vec![format!(
                        "{outside} of the supplied points are not within the bounds of {}.",
                        lake.lake_name
                    )]));
                }
            }
        }

        let new_points: Vec<SamplePoint> = parsed
            .into_iter()
            .map(|point| point.into_point(project.uuid))
            .collect();
        let mut all_points = match mode {
            UploadMode::Replace => Vec::new(),
            UploadMode::Append => self.points.project_points(project.uuid)?,
        };
        all_points.extend(new_points.iter().cloned());
        let hull = convex_hull(&to_geo_points(&all_points)).map(|geometry| geometry.to_string());

        self.points
            .store_points(project.uuid, &new_points, mode, hull.as_deref())?;
        info!(
            "event=points_upload module=service status=ok prj_cd={} mode={mode:?} uploaded={} total={}",
            project.prj_cd,
            new_points.len(),
            all_points.len()
        );
        Ok(all_points.len())
    }

    pub fn project_points(&self, slug: &str) -> ServiceResult<Vec<SamplePoint>> {
        let project = self.project(slug)?;
        Ok(self.points.project_points(project.uuid)?)
    }

    /// Convex hull of the project's points as WKT.
    pub fn project_polygon(&self, slug: &str) -> ServiceResult<Option<String>> {
        let project = self.project(slug)?;
        Ok(self.points.project_polygon(project.uuid)?)
    }

    /// Sample points selected by a region of interest.
    ///
    /// The region must be areal; a closed ring is promoted to a polygon.
    pub fn points_roi(&self, roi: &str, query: &RoiQuery) -> ServiceResult<Vec<PointListing>> {
        let region = parse_region(roi)?;
        let filter = ProjectFilter {
            project_type_ids: query.project_types.clone(),
            year_gte: query.first_year,
            year_lte: query.last_year,
            ..ProjectFilter::default()
        };
        let listings = self.points.list_points(&filter)?;

        let selected = match query.how {
            RoiMode::PointsIn => listings
                .into_iter()
                .filter(|listing| region.contains(&listing_point(listing)))
                .collect(),
            RoiMode::Contained => {
                select_projects(listings, |points| region.contains_all(points))
            }
            RoiMode::Overlapping => select_projects(listings, |points| {
                region.intersects_any(points) && !region.contains_all(points)
            }),
        };
        Ok(selected)
    }

    /// Sample points matching `filter`; geometry filters apply to each point.
    pub fn sample_points(&self, filter: &ProjectFilter) -> ServiceResult<Vec<PointListing>> {
        let mut listings = self.points.list_points(filter)?;
        listings.retain(|listing| {
            let point = [listing_point(listing)];
            filter.spatial.iter().all(|spatial| spatial.matches(&point))
        });
        Ok(listings)
    }

    /// Keeps the items whose project's points satisfy every geometry filter.
    pub fn retain_spatial<T>(
        &self,
        items: Vec<T>,
        spatial: &[SpatialFilter],
        project_of: impl Fn(&T) -> ProjectId,
    ) -> ServiceResult<Vec<T>> {
        if spatial.is_empty() {
            return Ok(items);
        }
        let mut cache: HashMap<ProjectId, bool> = HashMap::new();
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let project = project_of(&item);
            let passes = match cache.get(&project).copied() {
                Some(passes) => passes,
                None => {
                    let points = to_geo_points(&self.points.project_points(project)?);
                    let passes = spatial.iter().all(|filter| filter.matches(&points));
                    cache.insert(project, passes);
                    passes
                }
            };
            if passes {
                kept.push(item);
            }
        }
        Ok(kept)
    }

    /// Projects matching `filter`, geometry filters included.
    pub fn filter_projects(&self, filter: &ProjectFilter) -> ServiceResult<Vec<Project>> {
        let projects = self.projects.list_projects(filter)?;
        self.retain_spatial(projects, &filter.spatial, |project| project.uuid)
    }

    fn project(&self, slug: &str) -> ServiceResult<Project> {
        self.projects
            .get_project(slug)?
            .ok_or_else(|| ServiceError::ProjectNotFound(slug.to_string()))
    }
}

/// Parses an upload into points, collecting every problem found.
pub fn parse_points_csv(text: &str) -> ServiceResult<Vec<NewSamplePoint>> {
    if text.len() > MAX_UPLOAD_BYTES {
        return Err(ServiceError::InvalidUpload(vec![
            "Points file way too large (> 0.5 MiB).".to_string(),
        ]));
    }

    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = text
        .lines()
        .map(|line| {
            line.split(',')
                .map(|cell| cell.replace('"', "").trim().to_string())
                .collect::<Vec<String>>()
        })
        .filter(|cells| cells.iter().any(|cell| !cell.is_empty()));

    let header = rows.next().unwrap_or_default();
    let rows: Vec<Vec<String>> = rows.collect();
    if rows.len() > MAX_UPLOAD_POINTS {
        return Err(ServiceError::InvalidUpload(vec![format!(
            "The points file contains more than {MAX_UPLOAD_POINTS} points! \
             Reduce the number of points and try again."
        )]));
    }

    let mut problems = Vec::new();
    if header != EXPECTED_HEADER {
        let received = header
            .iter()
            .map(|cell| format!("'{cell}'"))
            .collect::<Vec<_>>()
            .join(", ");
        problems.push(format!(
            "Malformed header in submitted file. The header must contain the fields: \
             'POINT_LABEL', 'DD_LAT' and 'DD_LON'. The uploaded header is {received}"
        ));
    }
    if rows.is_empty() {
        problems.push("Points file does not appear to contain any data!".to_string());
        return Err(ServiceError::InvalidUpload(problems));
    }

    if rows
        .iter()
        .any(|row| row.first().map_or(true, |label| label.is_empty()))
    {
        problems.push("At least one point is missing a label.".to_string());
    }

    let mut points = Vec::with_capacity(rows.len());
    let mut bad_coordinates = false;
    for row in &rows {
        let coords = (
            row.get(1).and_then(|value| value.parse::<f64>().ok()),
            row.get(2).and_then(|value| value.parse::<f64>().ok()),
        );
        match coords {
            (Some(dd_lat), Some(dd_lon))
                if dd_lat.is_finite()
                    && dd_lon.is_finite()
                    && (-90.0..=90.0).contains(&dd_lat)
                    && (-180.0..=180.0).contains(&dd_lon) =>
            {
                points.push(NewSamplePoint {
                    label: row.first().cloned().unwrap_or_default(),
                    dd_lat,
                    dd_lon,
                });
            }
            _ => bad_coordinates = true,
        }
    }
    if bad_coordinates {
        problems.push("At least one point has an invalid latitude or longitude.".to_string());
    }

    if problems.is_empty() {
        Ok(points)
    } else {
        Err(ServiceError::InvalidUpload(problems))
    }
}

fn listing_point(listing: &PointListing) -> Point {
    Point::new(listing.dd_lon, listing.dd_lat)
}

fn to_geo_points(points: &[SamplePoint]) -> Vec<Point> {
    points
        .iter()
        .map(|point| Point::new(point.dd_lon, point.dd_lat))
        .collect()
}

/// Keeps every listing of the projects whose point set satisfies `keep`.
fn select_projects(
    listings: Vec<PointListing>,
    keep: impl Fn(&[Point]) -> bool,
) -> Vec<PointListing> {
    let mut by_project: HashMap<ProjectId, Vec<Point>> = HashMap::new();
    for listing in &listings {
        by_project
            .entry(listing.project_uuid)
            .or_default()
            .push(listing_point(listing));
    }
    let selected: HashMap<ProjectId, bool> = by_project
        .into_iter()
        .map(|(project, points)| (project, keep(&points)))
        .collect();
    listings
        .into_iter()
        .filter(|listing| selected.get(&listing.project_uuid).copied().unwrap_or(false))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_upload() {
        let csv = "\u{feff}POINT_LABEL,DD_LAT,DD_LON\r\n1,45.5,-81.5\r\n\"2\",45.6,-81.4\r\n\r\n";
        let points = parse_points_csv(csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].label, "2");
        assert_eq!(points[1].dd_lon, -81.4);
    }

    #[test]
    fn reports_every_problem_together() {
        let csv = "LABEL,LAT,LON\n,45.5,-81.5\n3,north,-81.5\n";
        let ServiceError::InvalidUpload(problems) = parse_points_csv(csv).unwrap_err() else {
            panic!("expected invalid upload");
        };
        assert_eq!(problems.len(), 3);
        assert!(problems[0].starts_with("Malformed header"));
        assert!(problems[0].ends_with("'LABEL', 'LAT', 'LON'"));
        assert_eq!(problems[1], "At least one point is missing a label.");
        assert_eq!(
            problems[2],
            "At least one point has an invalid latitude or longitude."
        );
    }

    #[test]
    fn rejects_header_only_upload() {
        let err = parse_points_csv("POINT_LABEL,DD_LAT,DD_LON\n").unwrap_err();
        assert!(err.to_string().contains("does not appear to contain any data"));
    }

    #[test]
    fn rejects_too_many_points() {
        let mut csv = String::from("POINT_LABEL,DD_LAT,DD_LON\n");
        for i in 0..=MAX_UPLOAD_POINTS {
            csv.push_str(&format!("{i},45.0,-81.0\n"));
        }
        let err = parse_points_csv(&csv).unwrap_err();
        assert!(err.to_string().contains("more than 1000 points"));
    }

    #[test]
    fn rejects_oversized_upload() {
        let csv = "x".repeat(MAX_UPLOAD_BYTES + 1);
        assert!(parse_points_csv(&csv)
            .unwrap_err()
            .to_string()
            .contains("too large"));
    }

    #[test]
    fn roi_mode_parses_url_names() {
        assert_eq!(RoiMode::parse("points_in"), Some(RoiMode::PointsIn));
        assert_eq!(RoiMode::parse("Overlapping"), Some(RoiMode::Overlapping));
        assert_eq!(RoiMode::parse("inside"), None);
    }
}
