//! Project repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist projects with their tags and team.
//! - Assign the core milestone set when a project is created.
//! - Own bookmark storage.
//!
//! # Invariants
//! - `prj_cd` and `slug` are unique; duplicates surface as `Conflict`.
//! - Creation and its core milestone assignment commit atomically.

use super::filter::{ProjectFilter, PROJECT_JOINS_SQL};
use super::{
    bool_to_int, date_to_db, int_to_bool, is_unique_violation, parse_date, parse_uuid, RepoError,
    RepoResult, WriteScope,
};
use crate::model::project::{Project, ProjectId};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Row,
};

pub(crate) const PROJECT_COLUMNS_SQL: &str = "p.uuid AS uuid,
    p.prj_cd AS prj_cd,
    p.slug AS slug,
    p.prj_nm AS prj_nm,
    p.year AS year,
    p.prj_date0 AS prj_date0,
    p.prj_date1 AS prj_date1,
    p.prj_ldr AS prj_ldr,
    p.field_ldr AS field_ldr,
    p.owner AS owner,
    p.dba AS dba,
    p.project_type_id AS project_type_id,
    p.protocol_id AS protocol_id,
    p.lake_id AS lake_id,
    p.abstract AS abstract,
    p.comment AS comment,
    p.risk AS risk,
    p.family_uuid AS family_uuid,
    p.active AS active";

/// Repository interface for project persistence.
pub trait ProjectRepository {
    fn create_project(&self, project: &Project, tags: &[String], team: &[String])
        -> RepoResult<ProjectId>;
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn get_project(&self, slug: &str) -> RepoResult<Option<Project>>;
    fn get_project_by_id(&self, id: ProjectId) -> RepoResult<Option<Project>>;
    fn list_projects(&self, filter: &ProjectFilter) -> RepoResult<Vec<Project>>;
    fn set_tags(&self, project: ProjectId, tags: &[String]) -> RepoResult<()>;
    fn project_tags(&self, project: ProjectId) -> RepoResult<Vec<String>>;
    fn list_tags(&self) -> RepoResult<Vec<String>>;
    fn project_team(&self, project: ProjectId) -> RepoResult<Vec<String>>;
    fn add_bookmark(&self, username: &str, project: ProjectId) -> RepoResult<()>;
    fn remove_bookmark(&self, username: &str, project: ProjectId) -> RepoResult<()>;
    fn bookmarks(&self, username: &str) -> RepoResult<Vec<Project>>;
    fn watchers(&self, project: ProjectId) -> RepoResult<Vec<String>>;
    /// Runs `work` so that every repository write it makes on this
    /// connection commits together or not at all.
    fn atomically<T, E, W>(&self, work: W) -> Result<T, E>
    where
        E: From<RepoError>,
        W: FnOnce() -> Result<T, E>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_projects(&self, sql: &str, binds: Vec<Value>) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }
        Ok(projects)
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn atomically<T, E, W>(&self, work: W) -> Result<T, E>
    where
        E: From<RepoError>,
        W: FnOnce() -> Result<T, E>,
    {
        super::atomically(self.conn, work)
    }

    fn create_project(
        &self,
        project: &Project,
        tags: &[String],
        team: &[String],
    ) -> RepoResult<ProjectId> {
        let tx = WriteScope::begin(self.conn)?;
        let inserted = tx.execute(
            "INSERT INTO projects (
                uuid, prj_cd, slug, prj_nm, year, prj_date0, prj_date1,
                prj_ldr, field_ldr, owner, dba,
                project_type_id, protocol_id, lake_id,
                abstract, comment, risk, family_uuid, active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, NULL, ?18);",
            params![
                project.uuid.to_string(),
                project.prj_cd,
                project.slug,
                project.prj_nm,
                project.year,
                date_to_db(project.prj_date0),
                date_to_db(project.prj_date1),
                project.prj_ldr,
                project.field_ldr,
                project.owner,
                project.dba,
                project.project_type_id,
                project.protocol_id,
                project.lake_id,
                project.abstract_text,
                project.comment,
                project.risk,
                bool_to_int(project.active),
            ],
        );
        if let Err(err) = inserted {
            if is_unique_violation(&err) {
                return Err(RepoError::Conflict(format!(
                    "project code `{}` already exists",
                    project.prj_cd
                )));
            }
            return Err(err.into());
        }

        for member in team {
            tx.execute(
                "INSERT OR IGNORE INTO project_team (project_uuid, username) VALUES (?1, ?2);",
                params![project.uuid.to_string(), member],
            )?;
        }
        replace_tags(&tx, project.uuid, tags)?;
        tx.execute(
            "INSERT INTO project_milestones (project_uuid, milestone_id, required)
             SELECT ?1, id, 1 FROM milestones WHERE category = 'core';",
            [project.uuid.to_string()],
        )?;

        tx.commit()?;
        Ok(project.uuid)
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE projects
             SET prj_nm = ?2,
                 prj_date0 = ?3,
                 prj_date1 = ?4,
                 prj_ldr = ?5,
                 field_ldr = ?6,
                 owner = ?7,
                 dba = ?8,
                 project_type_id = ?9,
                 protocol_id = ?10,
                 lake_id = ?11,
                 abstract = ?12,
                 comment = ?13,
                 risk = ?14,
                 active = ?15,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1;",
            params![
                project.uuid.to_string(),
                project.prj_nm,
                date_to_db(project.prj_date0),
                date_to_db(project.prj_date1),
                project.prj_ldr,
                project.field_ldr,
                project.owner,
                project.dba,
                project.project_type_id,
                project.protocol_id,
                project.lake_id,
                project.abstract_text,
                project.comment,
                project.risk,
                bool_to_int(project.active),
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(format!("project {}", project.prj_cd)));
        }
        Ok(())
    }

    fn get_project(&self, slug: &str) -> RepoResult<Option<Project>> {
        self.conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS_SQL} FROM projects p WHERE p.slug = ?1;"),
                [slug.to_lowercase()],
                |row| Ok(parse_project_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn get_project_by_id(&self, id: ProjectId) -> RepoResult<Option<Project>> {
        self.conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS_SQL} FROM projects p WHERE p.uuid = ?1;"),
                [id.to_string()],
                |row| Ok(parse_project_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn list_projects(&self, filter: &ProjectFilter) -> RepoResult<Vec<Project>> {
        let mut sql = format!("SELECT {PROJECT_COLUMNS_SQL} FROM {PROJECT_JOINS_SQL} WHERE 1 = 1");
        let mut binds = Vec::new();
        filter.push_sql(&mut sql, &mut binds);
        sql.push_str(" ORDER BY p.year DESC, p.prj_cd ASC");
        self.query_projects(&sql, binds)
    }

    fn set_tags(&self, project: ProjectId, tags: &[String]) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        replace_tags(&tx, project, tags)?;
        tx.commit()?;
        Ok(())
    }

    fn project_tags(&self, project: ProjectId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.name
             FROM project_tags pt
             JOIN tags t ON t.id = pt.tag_id
             WHERE pt.project_uuid = ?1
             ORDER BY t.name ASC;",
        )?;
        let tags = stmt
            .query_map([project.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    fn list_tags(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT t.name
             FROM tags t
             JOIN project_tags pt ON pt.tag_id = t.id
             ORDER BY t.name ASC;",
        )?;
        let tags = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tags)
    }

    fn project_team(&self, project: ProjectId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT username FROM project_team WHERE project_uuid = ?1 ORDER BY username ASC;",
        )?;
        let team = stmt
            .query_map([project.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(team)
    }

    fn add_bookmark(&self, username: &str, project: ProjectId) -> RepoResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO bookmarks (username, project_uuid) VALUES (?1, ?2);",
            params![username, project.to_string()],
        )?;
        Ok(())
    }

    fn remove_bookmark(&self, username: &str, project: ProjectId) -> RepoResult<()> {
        self.conn.execute(
            "DELETE FROM bookmarks WHERE username = ?1 AND project_uuid = ?2;",
            params![username, project.to_string()],
        )?;
        Ok(())
    }

    fn bookmarks(&self, username: &str) -> RepoResult<Vec<Project>> {
        self.query_projects(
            &format!(
                "SELECT {PROJECT_COLUMNS_SQL}
                 FROM projects p
                 JOIN bookmarks b ON b.project_uuid = p.uuid
                 WHERE b.username = ?
                 ORDER BY p.year DESC, p.prj_cd ASC;"
            ),
            vec![Value::Text(username.to_string())],
        )
    }

    fn watchers(&self, project: ProjectId) -> RepoResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT username FROM bookmarks WHERE project_uuid = ?1 ORDER BY username ASC;",
        )?;
        let users = stmt
            .query_map([project.to_string()], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }
}

fn replace_tags(conn: &Connection, project: ProjectId, tags: &[String]) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM project_tags WHERE project_uuid = ?1;",
        [project.to_string()],
    )?;
    for tag in tags {
        conn.execute("INSERT OR IGNORE INTO tags (name) VALUES (?1);", [tag])?;
        conn.execute(
            "INSERT OR IGNORE INTO project_tags (project_uuid, tag_id)
             SELECT ?1, id FROM tags WHERE name = ?2;",
            params![project.to_string(), tag],
        )?;
    }
    Ok(())
}

pub(crate) fn parse_project_row(row: &Row<'_>) -> RepoResult<Project> {
    let uuid_text: String = row.get("uuid")?;
    let family = match row.get::<_, Option<String>>("family_uuid")? {
        Some(value) => Some(parse_uuid(&value, "projects.family_uuid")?),
        None => None,
    };
    let date0: String = row.get("prj_date0")?;
    let date1: String = row.get("prj_date1")?;

    Ok(Project {
        uuid: parse_uuid(&uuid_text, "projects.uuid")?,
        prj_cd: row.get("prj_cd")?,
        slug: row.get("slug")?,
        prj_nm: row.get("prj_nm")?,
        year: row.get("year")?,
        prj_date0: parse_date(&date0, "projects.prj_date0")?,
        prj_date1: parse_date(&date1, "projects.prj_date1")?,
        prj_ldr: row.get("prj_ldr")?,
        field_ldr: row.get("field_ldr")?,
        owner: row.get("owner")?,
        dba: row.get("dba")?,
        project_type_id: row.get("project_type_id")?,
        protocol_id: row.get("protocol_id")?,
        lake_id: row.get("lake_id")?,
        abstract_text: row.get("abstract")?,
        comment: row.get("comment")?,
        risk: row.get("risk")?,
        family,
        active: int_to_bool(row.get("active")?, "projects.active")?,
    })
}
