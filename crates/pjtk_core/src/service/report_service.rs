//! Report upload use-cases.
//!
//! # Responsibility
//! - Attach uploaded reports to project milestones, propagating shared
//!   reports to sister projects.
//! - List reporting requirements with their current report.
//!
//! # Invariants
//! - An upload leaves exactly one current report on every milestone it
//!   fulfils.
//! - Sister milestones missing a record get one (required) before linking.
//! - An upload commits as a whole: a failure leaves no new requirement rows.

use super::milestone_service::completion_message;
use super::{require_editor, ServiceError, ServiceResult};
use crate::model::employee::Actor;
use crate::model::milestone::{Milestone, ProjectMilestone, RequirementGroup};
use crate::model::project::Project;
use crate::model::report::{content_hash, AssociatedFile, Report, ReportAssignment};
use crate::repo::family_repo::{FamilyRepository, SqliteFamilyRepository};
use crate::repo::milestone_repo::{MilestoneRepository, SqliteMilestoneRepository};
use crate::repo::now_millis;
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use crate::repo::report_repo::{
    LinkedReport, ReportRepository, SqliteReportRepository, UploadTarget,
};
use log::info;
use rusqlite::Connection;
use uuid::Uuid;

pub struct ReportService<P, M, F, R>
where
    P: ProjectRepository,
    M: MilestoneRepository,
    F: FamilyRepository,
    R: ReportRepository,
{
    projects: P,
    milestones: M,
    families: F,
    reports: R,
}

impl<'conn>
    ReportService<
        SqliteProjectRepository<'conn>,
        SqliteMilestoneRepository<'conn>,
        SqliteFamilyRepository<'conn>,
        SqliteReportRepository<'conn>,
    >
{
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteProjectRepository::new(conn),
            SqliteMilestoneRepository::new(conn),
            SqliteFamilyRepository::new(conn),
            SqliteReportRepository::new(conn),
        )
    }
}

impl<P, M, F, R> ReportService<P, M, F, R>
where
    P: ProjectRepository,
    M: MilestoneRepository,
    F: FamilyRepository,
    R: ReportRepository,
{
    pub fn new(projects: P, milestones: M, families: F, reports: R) -> Self {
        Self {
            projects,
            milestones,
            families,
            reports,
        }
    }

    /// Stores a report for the milestone labelled `milestone` on the project.
    ///
    /// Shared milestones also receive the report on every sister project.
    pub fn upload_report(
        &self,
        actor: &Actor,
        slug: &str,
        milestone: &str,
        report_path: &str,
    ) -> ServiceResult<Report> {
        let project = self.project(slug)?;
        require_editor(actor, &project, "upload reports")?;
        let milestone = self
            .milestones
            .get_milestone_by_label(milestone)?
            .ok_or_else(|| ServiceError::MilestoneNotFound(milestone.to_string()))?;
        let record = self
            .record_for(&project, &milestone)?
            .ok_or_else(|| ServiceError::MilestoneNotAssigned {
                prj_cd: project.prj_cd.clone(),
                milestone: milestone.label.clone(),
            })?;

        let report = Report::new(report_path, actor.username.clone(), now_millis());
        let targets = self.projects.atomically(|| -> ServiceResult<usize> {
            let mut targets = vec![UploadTarget {
                project_milestone_id: record.id,
                message: completion_message(&project, &milestone.label, true),
            }];
            if let (true, Some(family)) = (milestone.shared, project.family) {
                for sister in self.families.family_members(family)? {
                    if sister.uuid == project.uuid {
                        continue;
                    }
                    let sister_record = self.ensure_record(&sister, &milestone)?;
                    targets.push(UploadTarget {
                        project_milestone_id: sister_record.id,
                        message: completion_message(&sister, &milestone.label, true),
                    });
                }
            }
            self.reports.record_upload(&report, &targets)?;
            Ok(targets.len())
        })?;
        info!(
            "event=report_upload module=service status=ok prj_cd={} milestone={:?} targets={targets}",
            project.prj_cd, milestone.label
        );
        Ok(report)
    }

    /// Core (`core = true`) or custom reporting requirements with the
    /// current report of each.
    pub fn assignments_with_paths(
        &self,
        slug: &str,
        core: bool,
    ) -> ServiceResult<Vec<ReportAssignment>> {
        let project = self.project(slug)?;
        let group = if core {
            RequirementGroup::Core
        } else {
            RequirementGroup::Custom
        };
        let mut assignments = Vec::new();
        for record in self.milestones.project_milestones(project.uuid)? {
            if !record.required || !group.contains(&record.milestone) {
                continue;
            }
            let report = self.reports.current_report(record.id)?;
            assignments.push(ReportAssignment {
                project_milestone: record,
                report,
            });
        }
        Ok(assignments)
    }

    /// Current reports attached to the project.
    pub fn uploaded_reports(&self, slug: &str) -> ServiceResult<Vec<LinkedReport>> {
        let project = self.project(slug)?;
        Ok(self.reports.project_reports(project.uuid, true)?)
    }

    pub fn upload_associated_file(
        &self,
        actor: &Actor,
        slug: &str,
        file_path: &str,
    ) -> ServiceResult<AssociatedFile> {
        let project = self.project(slug)?;
        require_editor(actor, &project, "upload files")?;
        let file = AssociatedFile {
            uuid: Uuid::new_v4(),
            project_uuid: project.uuid,
            file_path: file_path.to_string(),
            file_hash: content_hash(file_path),
            uploaded_by: actor.username.clone(),
            uploaded_on: now_millis(),
            current: true,
        };
        self.reports.add_associated_file(&file)?;
        info!(
            "event=file_upload module=service status=ok prj_cd={}",
            project.prj_cd
        );
        Ok(file)
    }

    pub fn associated_files(&self, slug: &str) -> ServiceResult<Vec<AssociatedFile>> {
        let project = self.project(slug)?;
        Ok(self.reports.associated_files(project.uuid)?)
    }

    fn record_for(
        &self,
        project: &Project,
        milestone: &Milestone,
    ) -> ServiceResult<Option<ProjectMilestone>> {
        Ok(self
            .milestones
            .project_milestones(project.uuid)?
            .into_iter()
            .find(|record| record.milestone.id == milestone.id))
    }

    fn ensure_record(
        &self,
        project: &Project,
        milestone: &Milestone,
    ) -> ServiceResult<ProjectMilestone> {
        if let Some(record) = self.record_for(project, milestone)? {
            return Ok(record);
        }
        self.milestones
            .apply_requirement_changes(project.uuid, &[(milestone.id, true)])?;
        self.record_for(project, milestone)?
            .ok_or_else(|| ServiceError::MilestoneNotAssigned {
                prj_cd: project.prj_cd.clone(),
                milestone: milestone.label.clone(),
            })
    }

    fn project(&self, slug: &str) -> ServiceResult<Project> {
        self.projects
            .get_project(slug)?
            .ok_or_else(|| ServiceError::ProjectNotFound(slug.to_string()))
    }
}
