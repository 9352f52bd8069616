//! Milestone catalogue and per-project milestone state.
//!
//! # Responsibility
//! - Persist the milestone catalogue.
//! - Read and write `project_milestones` (required flag, completion stamp).
//! - Record a notice for every completion change in the same transaction.
//!
//! # Invariants
//! - `(project_uuid, milestone_id)` is unique; requirement changes upsert.
//! - Notice recipients are the owner, the project lead, watchers and the
//!   owner's supervisor chain, each at most once.

use super::{
    bool_to_int, int_to_bool, is_unique_violation, parse_uuid, RepoError, RepoResult, WriteScope,
};
use crate::model::milestone::{
    Milestone, MilestoneCategory, MilestoneId, NewMilestone, ProjectMilestone, ProjectMilestoneId,
};
use crate::model::notice::MessageLevel;
use crate::model::project::ProjectId;
use rusqlite::{params, Connection, OptionalExtension, Row};

const MILESTONE_COLUMNS_SQL: &str = "m.id AS milestone_id,
    m.label AS label,
    m.label_abbrev AS label_abbrev,
    m.category AS category,
    m.sort_order AS sort_order,
    m.report AS report,
    m.protected AS protected,
    m.shared AS shared";

const NOTICE_RECIPIENTS_SQL: &str = "WITH RECURSIVE
    target(project_uuid, owner, prj_ldr) AS (
        SELECT p.uuid, p.owner, p.prj_ldr
        FROM project_milestones pm
        JOIN projects p ON p.uuid = pm.project_uuid
        WHERE pm.id = ?1
    ),
    chain(username, supervisor) AS (
        SELECT e.username, e.supervisor
        FROM employees e
        JOIN target t ON e.username = t.owner
        UNION
        SELECT e.username, e.supervisor
        FROM employees e
        JOIN chain c ON e.username = c.supervisor
    )
INSERT OR IGNORE INTO message_recipients (message_id, username)
SELECT ?2, username FROM (
    SELECT owner AS username FROM target
    UNION SELECT prj_ldr FROM target
    UNION SELECT username FROM chain
    UNION SELECT b.username FROM bookmarks b JOIN target t ON b.project_uuid = t.project_uuid
);";

/// One completion stamp change and the notice announcing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionChange {
    pub project_milestone_id: ProjectMilestoneId,
    pub completed: Option<i64>,
    pub message: String,
    pub level: MessageLevel,
}

pub trait MilestoneRepository {
    fn create_milestone(&self, milestone: &NewMilestone) -> RepoResult<Milestone>;
    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>>;
    fn get_milestone_by_label(&self, label: &str) -> RepoResult<Option<Milestone>>;
    fn list_milestones(&self) -> RepoResult<Vec<Milestone>>;
    /// Every record for the project, required or not, ordered by milestone order.
    fn project_milestones(&self, project: ProjectId) -> RepoResult<Vec<ProjectMilestone>>;
    /// Upserts `required` for each `(milestone, required)` pair atomically.
    fn apply_requirement_changes(
        &self,
        project: ProjectId,
        changes: &[(MilestoneId, bool)],
    ) -> RepoResult<()>;
    /// Writes completion stamps and their notices atomically.
    fn apply_completion_changes(&self, changes: &[CompletionChange], now: i64) -> RepoResult<()>;
}

pub struct SqliteMilestoneRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMilestoneRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_milestone(
        &self,
        where_sql: &str,
        param: &dyn rusqlite::ToSql,
    ) -> RepoResult<Option<Milestone>> {
        self.conn
            .query_row(
                &format!("SELECT {MILESTONE_COLUMNS_SQL} FROM milestones m WHERE {where_sql};"),
                [param],
                |row| Ok(parse_milestone_row(row)),
            )
            .optional()?
            .transpose()
    }
}

impl MilestoneRepository for SqliteMilestoneRepository<'_> {
    fn create_milestone(&self, milestone: &NewMilestone) -> RepoResult<Milestone> {
        let result = self.conn.execute(
            "INSERT INTO milestones (label, label_abbrev, category, sort_order, report, protected, shared)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                milestone.label,
                milestone.label_abbrev,
                milestone.category.as_str(),
                milestone.order,
                bool_to_int(milestone.report),
                bool_to_int(milestone.protected),
                bool_to_int(milestone.shared),
            ],
        );
        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(RepoError::Conflict(format!(
                    "milestone `{}` already exists",
                    milestone.label
                )));
            }
            Err(err) => return Err(err.into()),
        }

        Ok(Milestone {
            id: self.conn.last_insert_rowid(),
            label: milestone.label.clone(),
            label_abbrev: milestone.label_abbrev.clone(),
            category: milestone.category,
            order: milestone.order,
            report: milestone.report,
            protected: milestone.protected,
            shared: milestone.shared,
        })
    }

    fn get_milestone(&self, id: MilestoneId) -> RepoResult<Option<Milestone>> {
        self.query_milestone("m.id = ?1", &id)
    }

    fn get_milestone_by_label(&self, label: &str) -> RepoResult<Option<Milestone>> {
        self.query_milestone("m.label = ?1", &label)
    }

    fn list_milestones(&self) -> RepoResult<Vec<Milestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MILESTONE_COLUMNS_SQL} FROM milestones m ORDER BY m.sort_order ASC, m.label ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut milestones = Vec::new();
        while let Some(row) = rows.next()? {
            milestones.push(parse_milestone_row(row)?);
        }
        Ok(milestones)
    }

    fn project_milestones(&self, project: ProjectId) -> RepoResult<Vec<ProjectMilestone>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROJECT_MILESTONE_SELECT_SQL}
             WHERE pm.project_uuid = ?1
             ORDER BY m.sort_order ASC, m.label ASC;"
        ))?;
        let mut rows = stmt.query([project.to_string()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(parse_project_milestone_row(row)?);
        }
        Ok(records)
    }

    fn apply_requirement_changes(
        &self,
        project: ProjectId,
        changes: &[(MilestoneId, bool)],
    ) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        for (milestone_id, required) in changes {
            tx.execute(
                "INSERT INTO project_milestones (project_uuid, milestone_id, required)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(project_uuid, milestone_id) DO UPDATE SET required = excluded.required;",
                params![project.to_string(), milestone_id, bool_to_int(*required)],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn apply_completion_changes(&self, changes: &[CompletionChange], now: i64) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        for change in changes {
            let updated = tx.execute(
                "UPDATE project_milestones SET completed = ?2 WHERE id = ?1;",
                params![change.project_milestone_id, change.completed],
            )?;
            if updated == 0 {
                return Err(RepoError::NotFound(format!(
                    "project milestone {}",
                    change.project_milestone_id
                )));
            }
            record_notice(&tx, change, now)?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Inserts one message for a project milestone and fans it out to recipients.
pub(crate) fn record_notice(
    conn: &Connection,
    change: &CompletionChange,
    now: i64,
) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO messages (project_milestone_id, msg, level, created_at) VALUES (?1, ?2, ?3, ?4);",
        params![
            change.project_milestone_id,
            change.message,
            change.level.as_str(),
            now
        ],
    )?;
    let message_id = conn.last_insert_rowid();
    conn.execute(
        NOTICE_RECIPIENTS_SQL,
        params![change.project_milestone_id, message_id],
    )?;
    Ok(())
}

fn parse_milestone_row(row: &Row<'_>) -> RepoResult<Milestone> {
    let category_text: String = row.get("category")?;
    let category = MilestoneCategory::parse(&category_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid category `{category_text}` in milestones.category"
        ))
    })?;
    Ok(Milestone {
        id: row.get("milestone_id")?,
        label: row.get("label")?,
        label_abbrev: row.get("label_abbrev")?,
        category,
        order: row.get("sort_order")?,
        report: int_to_bool(row.get("report")?, "milestones.report")?,
        protected: int_to_bool(row.get("protected")?, "milestones.protected")?,
        shared: int_to_bool(row.get("shared")?, "milestones.shared")?,
    })
}

pub(crate) fn parse_project_milestone_row(row: &Row<'_>) -> RepoResult<ProjectMilestone> {
    let project_text: String = row.get("project_uuid")?;
    Ok(ProjectMilestone {
        id: row.get("id")?,
        project_uuid: parse_uuid(&project_text, "project_milestones.project_uuid")?,
        milestone: parse_milestone_row(row)?,
        required: int_to_bool(row.get("required")?, "project_milestones.required")?,
        completed: row.get("completed")?,
    })
}

pub(crate) const PROJECT_MILESTONE_SELECT_SQL: &str = "SELECT
    pm.id AS id,
    pm.project_uuid AS project_uuid,
    pm.required AS required,
    pm.completed AS completed,
    m.id AS milestone_id,
    m.label AS label,
    m.label_abbrev AS label_abbrev,
    m.category AS category,
    m.sort_order AS sort_order,
    m.report AS report,
    m.protected AS protected,
    m.shared AS shared
FROM project_milestones pm
JOIN milestones m ON m.id = pm.milestone_id";
