//! Report and associated-file storage.
//!
//! # Responsibility
//! - Store uploads and link them to the project milestones they fulfil.
//! - Keep exactly one current report per project milestone.
//!
//! # Invariants
//! - Linking a new report demotes every report previously current for the
//!   same project milestone, within the same transaction.
//! - The fulfilled milestones are stamped complete with the upload time.

use super::filter::{ProjectFilter, PROJECT_JOINS_SQL};
use super::milestone_repo::{record_notice, CompletionChange};
use super::{bool_to_int, int_to_bool, parse_uuid, RepoResult, WriteScope};
use crate::model::milestone::ProjectMilestoneId;
use crate::model::notice::MessageLevel;
use crate::model::project::ProjectId;
use crate::model::report::{AssociatedFile, Report};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const REPORT_COLUMNS_SQL: &str = "r.uuid AS report_uuid,
    r.report_path AS report_path,
    r.report_hash AS report_hash,
    r.uploaded_by AS uploaded_by,
    r.uploaded_on AS uploaded_on,
    r.current AS current";

/// Report filter: project filters plus report type (milestone abbreviation).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub project: ProjectFilter,
    pub report_type: Vec<String>,
    pub report_type_not: Vec<String>,
}

/// A current report as listed across projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportListing {
    #[serde(skip)]
    pub project_uuid: ProjectId,
    pub prj_cd: String,
    pub prj_nm: String,
    pub report_type: String,
    pub current: bool,
    pub report_path: String,
    pub uploaded_on: i64,
    pub uploaded_by: String,
}

/// A current associated file as listed across projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    #[serde(skip)]
    pub project_uuid: ProjectId,
    pub prj_cd: String,
    pub prj_nm: String,
    pub current: bool,
    pub file_path: String,
    pub uploaded_on: i64,
    pub uploaded_by: String,
}

/// A project's report together with the milestone it is linked through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedReport {
    pub project_milestone_id: ProjectMilestoneId,
    pub milestone_label: String,
    pub report: Report,
}

/// One upload target: the project milestone and the notice announcing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub project_milestone_id: ProjectMilestoneId,
    pub message: String,
}

pub trait ReportRepository {
    /// Stores `report`, makes it the single current report of every target
    /// and completes the targets.
    fn record_upload(&self, report: &Report, targets: &[UploadTarget]) -> RepoResult<()>;
    fn current_report(&self, project_milestone: ProjectMilestoneId) -> RepoResult<Option<Report>>;
    fn project_reports(&self, project: ProjectId, current_only: bool)
        -> RepoResult<Vec<LinkedReport>>;
    fn add_associated_file(&self, file: &AssociatedFile) -> RepoResult<()>;
    fn associated_files(&self, project: ProjectId) -> RepoResult<Vec<AssociatedFile>>;
    fn list_reports(&self, filter: &ReportFilter) -> RepoResult<Vec<ReportListing>>;
    fn list_associated_files(&self, filter: &ProjectFilter) -> RepoResult<Vec<FileListing>>;
}

pub struct SqliteReportRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReportRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReportRepository for SqliteReportRepository<'_> {
    fn record_upload(&self, report: &Report, targets: &[UploadTarget]) -> RepoResult<()> {
        let tx = WriteScope::begin(self.conn)?;
        for target in targets {
            tx.execute(
                "UPDATE reports
                 SET current = 0
                 WHERE current = 1
                   AND uuid IN (
                       SELECT report_uuid FROM report_links WHERE project_milestone_id = ?1
                   );",
                [target.project_milestone_id],
            )?;
        }

        tx.execute(
            "INSERT INTO reports (uuid, report_path, report_hash, uploaded_by, uploaded_on, current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                report.uuid.to_string(),
                report.report_path,
                report.report_hash,
                report.uploaded_by,
                report.uploaded_on,
                bool_to_int(report.current),
            ],
        )?;

        for target in targets {
            tx.execute(
                "INSERT OR IGNORE INTO report_links (report_uuid, project_milestone_id)
                 VALUES (?1, ?2);",
                params![report.uuid.to_string(), target.project_milestone_id],
            )?;
            tx.execute(
                "UPDATE project_milestones SET completed = ?2 WHERE id = ?1;",
                params![target.project_milestone_id, report.uploaded_on],
            )?;
            record_notice(
                &tx,
                &CompletionChange {
                    project_milestone_id: target.project_milestone_id,
                    completed: Some(report.uploaded_on),
                    message: target.message.clone(),
                    level: MessageLevel::Info,
                },
                report.uploaded_on,
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn current_report(&self, project_milestone: ProjectMilestoneId) -> RepoResult<Option<Report>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {REPORT_COLUMNS_SQL}
                     FROM reports r
                     JOIN report_links rl ON rl.report_uuid = r.uuid
                     WHERE rl.project_milestone_id = ?1
                       AND r.current = 1
                     ORDER BY r.uploaded_on DESC
                     LIMIT 1;"
                ),
                [project_milestone],
                |row| Ok(parse_report_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn project_reports(
        &self,
        project: ProjectId,
        current_only: bool,
    ) -> RepoResult<Vec<LinkedReport>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT
                pm.id AS project_milestone_id,
                m.label AS milestone_label,
                {REPORT_COLUMNS_SQL}
             FROM reports r
             JOIN report_links rl ON rl.report_uuid = r.uuid
             JOIN project_milestones pm ON pm.id = rl.project_milestone_id
             JOIN milestones m ON m.id = pm.milestone_id
             WHERE pm.project_uuid = ?1
               AND (?2 = 0 OR r.current = 1)
             ORDER BY m.sort_order ASC, r.uploaded_on DESC;"
        ))?;
        let mut rows = stmt.query(params![project.to_string(), bool_to_int(current_only)])?;
        let mut reports = Vec::new();
        while let Some(row) = rows.next()? {
            reports.push(LinkedReport {
                project_milestone_id: row.get("project_milestone_id")?,
                milestone_label: row.get("milestone_label")?,
                report: parse_report_row(row)?,
            });
        }
        Ok(reports)
    }

    fn add_associated_file(&self, file: &AssociatedFile) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO associated_files (
                uuid, project_uuid, file_path, file_hash, uploaded_by, uploaded_on, current
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                file.uuid.to_string(),
                file.project_uuid.to_string(),
                file.file_path,
                file.file_hash,
                file.uploaded_by,
                file.uploaded_on,
                bool_to_int(file.current),
            ],
        )?;
        Ok(())
    }

    fn associated_files(&self, project: ProjectId) -> RepoResult<Vec<AssociatedFile>> {
        let mut stmt = self.conn.prepare(
            "SELECT uuid, project_uuid, file_path, file_hash, uploaded_by, uploaded_on, current
             FROM associated_files
             WHERE project_uuid = ?1
             ORDER BY uploaded_on DESC, file_path ASC;",
        )?;
        let mut rows = stmt.query([project.to_string()])?;
        let mut files = Vec::new();
        while let Some(row) = rows.next()? {
            let uuid_text: String = row.get("uuid")?;
            let project_text: String = row.get("project_uuid")?;
            files.push(AssociatedFile {
                uuid: parse_uuid(&uuid_text, "associated_files.uuid")?,
                project_uuid: parse_uuid(&project_text, "associated_files.project_uuid")?,
                file_path: row.get("file_path")?,
                file_hash: row.get("file_hash")?,
                uploaded_by: row.get("uploaded_by")?,
                uploaded_on: row.get("uploaded_on")?,
                current: int_to_bool(row.get("current")?, "associated_files.current")?,
            });
        }
        Ok(files)
    }

    fn list_reports(&self, filter: &ReportFilter) -> RepoResult<Vec<ReportListing>> {
        let mut sql = format!(
            "SELECT DISTINCT
                p.uuid AS project_uuid,
                p.prj_cd AS prj_cd,
                p.prj_nm AS prj_nm,
                m.label_abbrev AS report_type,
                r.current AS current,
                r.report_path AS report_path,
                r.uploaded_on AS uploaded_on,
                r.uploaded_by AS uploaded_by
             FROM {PROJECT_JOINS_SQL}
             JOIN project_milestones pm ON pm.project_uuid = p.uuid
             JOIN milestones m ON m.id = pm.milestone_id
             JOIN report_links rl ON rl.project_milestone_id = pm.id
             JOIN reports r ON r.uuid = rl.report_uuid
             WHERE r.current = 1"
        );
        let mut binds: Vec<Value> = Vec::new();
        filter.project.push_sql(&mut sql, &mut binds);
        for (values, op) in [(&filter.report_type, "IN"), (&filter.report_type_not, "NOT IN")] {
            if values.is_empty() {
                continue;
            }
            let marks = vec!["?"; values.len()].join(", ");
            sql.push_str(&format!(" AND m.label_abbrev {op} ({marks})"));
            binds.extend(values.iter().cloned().map(Value::Text));
        }
        sql.push_str(" ORDER BY p.prj_cd ASC, m.sort_order ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut listings = Vec::new();
        while let Some(row) = rows.next()? {
            let project_text: String = row.get("project_uuid")?;
            listings.push(ReportListing {
                project_uuid: parse_uuid(&project_text, "projects.uuid")?,
                prj_cd: row.get("prj_cd")?,
                prj_nm: row.get("prj_nm")?,
                report_type: row.get("report_type")?,
                current: int_to_bool(row.get("current")?, "reports.current")?,
                report_path: row.get("report_path")?,
                uploaded_on: row.get("uploaded_on")?,
                uploaded_by: row.get("uploaded_by")?,
            });
        }
        Ok(listings)
    }

    fn list_associated_files(&self, filter: &ProjectFilter) -> RepoResult<Vec<FileListing>> {
        let mut sql = format!(
            "SELECT
                p.uuid AS project_uuid,
                p.prj_cd AS prj_cd,
                p.prj_nm AS prj_nm,
                f.current AS current,
                f.file_path AS file_path,
                f.uploaded_on AS uploaded_on,
                f.uploaded_by AS uploaded_by
             FROM {PROJECT_JOINS_SQL}
             JOIN associated_files f ON f.project_uuid = p.uuid
             WHERE f.current = 1"
        );
        let mut binds: Vec<Value> = Vec::new();
        filter.push_sql(&mut sql, &mut binds);
        sql.push_str(" ORDER BY p.prj_cd ASC, f.file_path ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut listings = Vec::new();
        while let Some(row) = rows.next()? {
            let project_text: String = row.get("project_uuid")?;
            listings.push(FileListing {
                project_uuid: parse_uuid(&project_text, "projects.uuid")?,
                prj_cd: row.get("prj_cd")?,
                prj_nm: row.get("prj_nm")?,
                current: int_to_bool(row.get("current")?, "associated_files.current")?,
                file_path: row.get("file_path")?,
                uploaded_on: row.get("uploaded_on")?,
                uploaded_by: row.get("uploaded_by")?,
            });
        }
        Ok(listings)
    }
}

fn parse_report_row(row: &Row<'_>) -> RepoResult<Report> {
    let uuid_text: String = row.get("report_uuid")?;
    Ok(Report {
        uuid: parse_uuid(&uuid_text, "reports.uuid")?,
        report_path: row.get("report_path")?,
        report_hash: row.get("report_hash")?,
        uploaded_by: row.get("uploaded_by")?,
        uploaded_on: row.get("uploaded_on")?,
        current: int_to_bool(row.get("current")?, "reports.current")?,
    })
}
