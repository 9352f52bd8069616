//! Reference tables: lakes, project types, protocols.

use super::{bool_to_int, int_to_bool, is_unique_violation, RepoError, RepoResult};
use crate::geo::Envelope;
use crate::model::lookup::{Lake, ProjectType, Protocol};
use rusqlite::{params, Connection, OptionalExtension, Row};

pub trait LookupRepository {
    fn create_lake(&self, abbrev: &str, lake_name: &str, envelope: Option<Envelope>)
        -> RepoResult<i64>;
    fn get_lake(&self, id: i64) -> RepoResult<Option<Lake>>;
    fn list_lakes(&self) -> RepoResult<Vec<Lake>>;
    fn create_project_type(&self, project_type: &str, scope: &str, field_component: bool)
        -> RepoResult<i64>;
    fn get_project_type(&self, id: i64) -> RepoResult<Option<ProjectType>>;
    fn list_project_types(&self) -> RepoResult<Vec<ProjectType>>;
    fn create_protocol(&self, protocol: &str, abbrev: &str) -> RepoResult<i64>;
    fn list_protocols(&self) -> RepoResult<Vec<Protocol>>;
}

pub struct SqliteLookupRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLookupRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn insert(&self, sql: &str, params: impl rusqlite::Params, what: String) -> RepoResult<i64> {
        match self.conn.execute(sql, params) {
            Ok(_) => Ok(self.conn.last_insert_rowid()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Conflict(what)),
            Err(err) => Err(err.into()),
        }
    }
}

impl LookupRepository for SqliteLookupRepository<'_> {
    fn create_lake(
        &self,
        abbrev: &str,
        lake_name: &str,
        envelope: Option<Envelope>,
    ) -> RepoResult<i64> {
        self.insert(
            "INSERT INTO lakes (abbrev, lake_name, min_lon, min_lat, max_lon, max_lat)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                abbrev,
                lake_name,
                envelope.map(|e| e.min_lon),
                envelope.map(|e| e.min_lat),
                envelope.map(|e| e.max_lon),
                envelope.map(|e| e.max_lat),
            ],
            format!("lake `{abbrev}` already exists"),
        )
    }

    fn get_lake(&self, id: i64) -> RepoResult<Option<Lake>> {
        self.conn
            .query_row(
                "SELECT id, abbrev, lake_name, min_lon, min_lat, max_lon, max_lat
                 FROM lakes WHERE id = ?1;",
                [id],
                parse_lake_row,
            )
            .optional()
            .map_err(RepoError::from)
    }

    fn list_lakes(&self) -> RepoResult<Vec<Lake>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, abbrev, lake_name, min_lon, min_lat, max_lon, max_lat
             FROM lakes ORDER BY abbrev ASC;",
        )?;
        let lakes = stmt
            .query_map([], parse_lake_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lakes)
    }

    fn create_project_type(
        &self,
        project_type: &str,
        scope: &str,
        field_component: bool,
    ) -> RepoResult<i64> {
        self.insert(
            "INSERT INTO project_types (project_type, scope, field_component) VALUES (?1, ?2, ?3);",
            params![project_type, scope, bool_to_int(field_component)],
            format!("project type `{project_type}` already exists"),
        )
    }

    fn get_project_type(&self, id: i64) -> RepoResult<Option<ProjectType>> {
        self.conn
            .query_row(
                "SELECT id, project_type, scope, field_component FROM project_types WHERE id = ?1;",
                [id],
                |row| Ok(parse_project_type_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_project_types(&self) -> RepoResult<Vec<ProjectType>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_type, scope, field_component
             FROM project_types ORDER BY project_type ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut types = Vec::new();
        while let Some(row) = rows.next()? {
            types.push(parse_project_type_row(row)?);
        }
        Ok(types)
    }

    fn create_protocol(&self, protocol: &str, abbrev: &str) -> RepoResult<i64> {
        self.insert(
            "INSERT INTO protocols (protocol, abbrev) VALUES (?1, ?2);",
            params![protocol, abbrev],
            format!("protocol `{abbrev}` already exists"),
        )
    }

    fn list_protocols(&self) -> RepoResult<Vec<Protocol>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, protocol, abbrev, deprecated FROM protocols ORDER BY abbrev ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut protocols = Vec::new();
        while let Some(row) = rows.next()? {
            protocols.push(Protocol {
                id: row.get("id")?,
                protocol: row.get("protocol")?,
                abbrev: row.get("abbrev")?,
                deprecated: int_to_bool(row.get("deprecated")?, "protocols.deprecated")?,
            });
        }
        Ok(protocols)
    }
}

fn parse_lake_row(row: &Row<'_>) -> rusqlite::Result<Lake> {
    let bounds: (Option<f64>, Option<f64>, Option<f64>, Option<f64>) = (
        row.get("min_lon")?,
        row.get("min_lat")?,
        row.get("max_lon")?,
        row.get("max_lat")?,
    );
    let envelope = match bounds {
        (Some(min_lon), Some(min_lat), Some(max_lon), Some(max_lat)) => Some(Envelope {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }),
        _ => None,
    };
    Ok(Lake {
        id: row.get("id")?,
        abbrev: row.get("abbrev")?,
        lake_name: row.get("lake_name")?,
        envelope,
    })
}

fn parse_project_type_row(row: &Row<'_>) -> RepoResult<ProjectType> {
    Ok(ProjectType {
        id: row.get("id")?,
        project_type: row.get("project_type")?,
        scope: row.get("scope")?,
        field_component: int_to_bool(
            row.get("field_component")?,
            "project_types.field_component",
        )?,
    })
}
