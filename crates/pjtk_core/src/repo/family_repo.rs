//! Sister-project family storage.
//!
//! # Responsibility
//! - Link projects into families and unlink them again.
//! - Find comparable projects that could become sisters.
//!
//! # Invariants
//! - Membership is the `projects.family_uuid` column, so the sister relation
//!   is symmetric and transitive by construction.
//! - Linking two projects from different families merges the families.
//! - A family never survives with fewer than two members.

use super::project_repo::{parse_project_row, PROJECT_COLUMNS_SQL};
use super::{parse_uuid, RepoError, RepoResult, WriteScope};
use crate::model::milestone::APPROVED_LABEL;
use crate::model::project::{FamilyId, Project, ProjectId};
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub trait FamilyRepository {
    /// Members ordered by project code.
    fn family_members(&self, family: FamilyId) -> RepoResult<Vec<Project>>;
    /// Approved projects sharing year, type, lake and protocol with `project`,
    /// excluding the project itself.
    fn comparable_projects(&self, project: &Project) -> RepoResult<Vec<Project>>;
    fn is_approved(&self, project: ProjectId) -> RepoResult<bool>;
    /// Puts both projects in one family and returns it.
    fn link(&self, a: ProjectId, b: ProjectId) -> RepoResult<FamilyId>;
    /// Removes the project from its family, dissolving a family left with one member.
    fn detach(&self, project: ProjectId) -> RepoResult<()>;
}

pub struct SqliteFamilyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteFamilyRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl FamilyRepository for SqliteFamilyRepository<'_> {
    fn family_members(&self, family: FamilyId) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS_SQL}
             FROM projects p
             WHERE p.family_uuid = ?1
             ORDER BY p.prj_cd ASC;"
        ))?;
        let mut rows = stmt.query([family.to_string()])?;
        let mut members = Vec::new();
        while let Some(row) = rows.next()? {
            members.push(parse_project_row(row)?);
        }
        Ok(members)
    }

    fn comparable_projects(&self, project: &Project) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS_SQL}
             FROM projects p
             WHERE p.uuid <> ?1
               AND p.year = ?2
               AND p.project_type_id = ?3
               AND p.lake_id = ?4
               AND p.protocol_id IS ?5
               AND EXISTS (
                   SELECT 1 FROM project_milestones pm
                   JOIN milestones m ON m.id = pm.milestone_id
                   WHERE pm.project_uuid = p.uuid
                     AND m.label = ?6
                     AND pm.completed IS NOT NULL
               )
             ORDER BY p.prj_cd ASC;"
        ))?;
        let mut rows = stmt.query(params![
            project.uuid.to_string(),
            project.year,
            project.project_type_id,
            project.lake_id,
            project.protocol_id,
            APPROVED_LABEL,
        ])?;
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(parse_project_row(row)?);
        }
        Ok(projects)
    }

    fn is_approved(&self, project: ProjectId) -> RepoResult<bool> {
        let approved: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM project_milestones pm
                JOIN milestones m ON m.id = pm.milestone_id
                WHERE pm.project_uuid = ?1
                  AND m.label = ?2
                  AND pm.completed IS NOT NULL
            );",
            params![project.to_string(), APPROVED_LABEL],
            |row| row.get(0),
        )?;
        Ok(approved == 1)
    }

    fn link(&self, a: ProjectId, b: ProjectId) -> RepoResult<FamilyId> {
        let tx = WriteScope::begin(self.conn)?;
        let family_a = family_of(&tx, a)?;
        let family_b = family_of(&tx, b)?;

        let family = match (family_a, family_b) {
            (Some(fa), Some(fb)) if fa == fb => fa,
            (Some(fa), Some(fb)) => {
                tx.execute(
                    "UPDATE projects SET family_uuid = ?1 WHERE family_uuid = ?2;",
                    params![fa.to_string(), fb.to_string()],
                )?;
                tx.execute("DELETE FROM families WHERE uuid = ?1;", [fb.to_string()])?;
                info!("event=family_merge module=repo status=ok kept={fa} absorbed={fb}");
                fa
            }
            (Some(fa), None) => {
                set_family(&tx, b, Some(fa))?;
                fa
            }
            (None, Some(fb)) => {
                set_family(&tx, a, Some(fb))?;
                fb
            }
            (None, None) => {
                let family = Uuid::new_v4();
                tx.execute(
                    "INSERT INTO families (uuid) VALUES (?1);",
                    [family.to_string()],
                )?;
                set_family(&tx, a, Some(family))?;
                set_family(&tx, b, Some(family))?;
                family
            }
        };

        tx.commit()?;
        Ok(family)
    }

    fn detach(&self, project: ProjectId) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        let Some(family) = family_of(&tx, project)? else {
            return Ok(());
        };
        set_family(&tx, project, None)?;

        let remaining: i64 = tx.query_row(
            "SELECT COUNT(*) FROM projects WHERE family_uuid = ?1;",
            [family.to_string()],
            |row| row.get(0),
        )?;
        if remaining < 2 {
            tx.execute(
                "UPDATE projects SET family_uuid = NULL WHERE family_uuid = ?1;",
                [family.to_string()],
            )?;
            tx.execute("DELETE FROM families WHERE uuid = ?1;", [family.to_string()])?;
            info!("event=family_dissolve module=repo status=ok family={family}");
        }

        tx.commit()?;
        Ok(())
    }
}

fn family_of(conn: &Connection, project: ProjectId) -> RepoResult<Option<FamilyId>> {
    let value: Option<Option<String>> = conn
        .query_row(
            "SELECT family_uuid FROM projects WHERE uuid = ?1;",
            [project.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match value {
        None => Err(RepoError::NotFound(format!("project {project}"))),
        Some(None) => Ok(None),
        Some(Some(text)) => Ok(Some(parse_uuid(&text, "projects.family_uuid")?)),
    }
}

fn set_family(conn: &Connection, project: ProjectId, family: Option<FamilyId>) -> RepoResult<()> {
    conn.execute(
        "UPDATE projects SET family_uuid = ?2 WHERE uuid = ?1;",
        params![project.to_string(), family.map(|f| f.to_string())],
    )?;
    Ok(())
}
