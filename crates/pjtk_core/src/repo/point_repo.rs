//! Sample point and project polygon storage.
//!
//! # Invariants
//! - A point upload and the polygon refresh derived from it commit together.
//! - A project without points has no polygon row.

use super::filter::{ProjectFilter, PROJECT_JOINS_SQL};
use super::{parse_uuid, RepoResult, WriteScope};
use crate::model::project::ProjectId;
use crate::model::spatial::{SamplePoint, UploadMode};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A sample point joined with the project attributes the API exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointListing {
    pub project_uuid: ProjectId,
    pub prj_cd: String,
    pub prj_nm: String,
    pub year: i32,
    pub project_type: String,
    pub label: String,
    pub dd_lat: f64,
    pub dd_lon: f64,
}

pub trait PointRepository {
    /// Stores `points` (replacing or appending) and the refreshed polygon.
    fn store_points(
        &self,
        project: ProjectId,
        points: &[SamplePoint],
        mode: UploadMode,
        polygon_wkt: Option<&str>,
    ) -> RepoResult<()>;
    fn project_points(&self, project: ProjectId) -> RepoResult<Vec<SamplePoint>>;
    fn project_polygon(&self, project: ProjectId) -> RepoResult<Option<String>>;
    /// Points of every project matching the SQL part of `filter`.
    fn list_points(&self, filter: &ProjectFilter) -> RepoResult<Vec<PointListing>>;
}

pub struct SqlitePointRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqlitePointRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl PointRepository for SqlitePointRepository<'_> {
    fn store_points(
        &self,
        project: ProjectId,
        points: &[SamplePoint],
        mode: UploadMode,
        polygon_wkt: Option<&str>,
    ) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        if mode == UploadMode::Replace {
            tx.execute(
                "DELETE FROM sample_points WHERE project_uuid = ?1;",
                [project.to_string()],
            )?;
        }
        for point in points {
            tx.execute(
                "INSERT INTO sample_points (uuid, project_uuid, label, dd_lat, dd_lon)
                 VALUES (?1, ?2, ?3, ?4, ?5);",
                params![
                    point.uuid.to_string(),
                    project.to_string(),
                    point.label,
                    point.dd_lat,
                    point.dd_lon,
                ],
            )?;
        }
        match polygon_wkt {
            Some(wkt) => {
                tx.execute(
                    "INSERT INTO project_polygons (project_uuid, geom_wkt) VALUES (?1, ?2)
                     ON CONFLICT(project_uuid) DO UPDATE SET geom_wkt = excluded.geom_wkt;",
                    params![project.to_string(), wkt],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM project_polygons WHERE project_uuid = ?1;",
                    [project.to_string()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn project_points(&self, project: ProjectId) -> RepoResult<Vec<SamplePoint>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, project_uuid, label, dd_lat, dd_lon
             FROM sample_points
             WHERE project_uuid = ?1
             ORDER BY label ASC, rowid ASC;",
        )?;
        let mut rows = stmt.query([project.to_string()])?;
        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            points.push(parse_point_row(row)?);
        }
        Ok(points)
    }

    fn project_polygon(&self, project: ProjectId) -> RepoResult<Option<String>> {
        let wkt = self
            .conn
            .query_row(
                "SELECT geom_wkt FROM project_polygons WHERE project_uuid = ?1;",
                [project.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(wkt)
    }

    fn list_points(&self, filter: &ProjectFilter) -> RepoResult<Vec<PointListing>> {
        let mut sql = format!(
            "SELECT
                p.uuid AS project_uuid,
                p.prj_cd AS prj_cd,
                p.prj_nm AS prj_nm,
                p.year AS year,
                pt.project_type AS project_type,
                sp.label AS label,
                sp.dd_lat AS dd_lat,
                sp.dd_lon AS dd_lon
             FROM {PROJECT_JOINS_SQL}
             JOIN sample_points sp ON sp.project_uuid = p.uuid
             WHERE 1 = 1"
        );
        let mut binds: Vec<Value> = Vec::new();
        filter.push_sql(&mut sql, &mut binds);
        sql.push_str(" ORDER BY p.prj_cd ASC, sp.label ASC, sp.rowid ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut listings = Vec::new();
        while let Some(row) = rows.next()? {
            let project_text: String = row.get("project_uuid")?;
            listings.push(PointListing {
                project_uuid: parse_uuid(&project_text, "projects.uuid")?,
                prj_cd: row.get("prj_cd")?,
                prj_nm: row.get("prj_nm")?,
                year: row.get("year")?,
                project_type: row.get("project_type")?,
                label: row.get("label")?,
                dd_lat: row.get("dd_lat")?,
                dd_lon: row.get("dd_lon")?,
            });
        }
        Ok(listings)
    }
}

fn parse_point_row(row: &Row<'_>) -> RepoResult<SamplePoint> {
    let uuid_text: String = row.get("uuid")?;
    let project_text: String = row.get("project_uuid")?;
    Ok(SamplePoint {
        uuid: parse_uuid(&uuid_text, "sample_points.uuid")?,
        project_uuid: parse_uuid(&project_text, "sample_points.project_uuid")?,
        label: row.get("label")?,
        dd_lat: row.get("dd_lat")?,
        dd_lon: row.get("dd_lon")?,
    })
}
