//! Milestone bookkeeping and the approval workflow.
//!
//! # Responsibility
//! - Approve, unapprove and sign off projects.
//! - Answer per-project milestone and reporting-requirement questions.
//! - Apply completion and requirement edits with their role rules.
//!
//! # Invariants
//! - Completion is only ever the `completed` stamp of a project milestone.
//! - Protected milestones keep their state unless a manager changes them.
//! - An unapproved project is no longer anyone's sister.

use super::{require_editor, require_manager, ServiceError, ServiceResult};
use crate::model::employee::Actor;
use crate::model::milestone::{
    default_milestones, title_case, Milestone, MilestoneId, NewMilestone, ProjectMilestone,
    RequirementGroup, APPROVED_LABEL, SIGNOFF_LABEL,
};
use crate::model::notice::MessageLevel;
use crate::model::project::Project;
use crate::repo::family_repo::{FamilyRepository, SqliteFamilyRepository};
use crate::repo::milestone_repo::{CompletionChange, MilestoneRepository, SqliteMilestoneRepository};
use crate::repo::now_millis;
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Choices offered for one requirement group and which of them are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportingOptions {
    pub group: RequirementGroup,
    pub choices: Vec<Milestone>,
    pub assigned: Vec<MilestoneId>,
}

pub struct MilestoneService<P, M, F>
where
    P: ProjectRepository,
    M: MilestoneRepository,
    F: FamilyRepository,
{
    projects: P,
    milestones: M,
    families: F,
}

impl<'conn>
    MilestoneService<
        SqliteProjectRepository<'conn>,
        SqliteMilestoneRepository<'conn>,
        SqliteFamilyRepository<'conn>,
    >
{
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteProjectRepository::new(conn),
            SqliteMilestoneRepository::new(conn),
            SqliteFamilyRepository::new(conn),
        )
    }
}

impl<P, M, F> MilestoneService<P, M, F>
where
    P: ProjectRepository,
    M: MilestoneRepository,
    F: FamilyRepository,
{
    pub fn new(projects: P, milestones: M, families: F) -> Self {
        Self {
            projects,
            milestones,
            families,
        }
    }

    pub fn approve(&self, actor: &Actor, slug: &str) -> ServiceResult<()> {
        require_manager(actor, "approve projects")?;
        let project = self.project(slug)?;
        self.set_completion(&project, APPROVED_LABEL, true)?;
        Ok(())
    }

    /// Revokes approval and removes the project from its sister family.
    pub fn unapprove(&self, actor: &Actor, slug: &str) -> ServiceResult<()> {
        require_manager(actor, "unapprove projects")?;
        let project = self.project(slug)?;
        self.projects.atomically(|| -> ServiceResult<()> {
            self.set_completion(&project, APPROVED_LABEL, false)?;
            self.families.detach(project.uuid)?;
            Ok(())
        })
    }

    pub fn signoff(&self, actor: &Actor, slug: &str) -> ServiceResult<()> {
        require_manager(actor, "sign off projects")?;
        let project = self.project(slug)?;
        self.set_completion(&project, SIGNOFF_LABEL, true)?;
        Ok(())
    }

    /// Bulk approval form: each `(slug, approved)` pair is applied in order.
    ///
    /// All or nothing: one failing pair leaves every project as it was.
    pub fn approve_projects(&self, actor: &Actor, changes: &[(String, bool)]) -> ServiceResult<()> {
        require_manager(actor, "approve projects")?;
        self.projects.atomically(|| -> ServiceResult<()> {
            for (slug, approved) in changes {
                if *approved {
                    self.approve(actor, slug)?;
                } else {
                    self.unapprove(actor, slug)?;
                }
            }
            Ok(())
        })
    }

    /// `None` when the milestone is not required on the project, otherwise
    /// whether it is complete.
    pub fn milestone_complete(&self, slug: &str, label: &str) -> ServiceResult<Option<bool>> {
        let project = self.project(slug)?;
        let status = self
            .milestones
            .project_milestones(project.uuid)?
            .into_iter()
            .find(|record| record.required && record.milestone.label == label)
            .map(|record| record.is_complete());
        Ok(status)
    }

    /// Required milestones that are not fulfilled by a report.
    pub fn get_milestones(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        self.required_where(slug, |m| !m.report)
    }

    /// Required milestones fulfilled by a report.
    pub fn get_reporting_requirements(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        self.required_where(slug, |m| m.report)
    }

    pub fn get_core_assignments(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        self.required_where(slug, |m| RequirementGroup::Core.contains(m))
    }

    pub fn get_custom_assignments(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        self.required_where(slug, |m| RequirementGroup::Custom.contains(m))
    }

    /// Reporting requirements that have been fulfilled.
    pub fn get_complete(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        let mut records = self.get_reporting_requirements(slug)?;
        records.retain(ProjectMilestone::is_complete);
        Ok(records)
    }

    /// Reporting requirements still waiting for a report.
    pub fn get_outstanding(&self, slug: &str) -> ServiceResult<Vec<ProjectMilestone>> {
        let mut records = self.get_reporting_requirements(slug)?;
        records.retain(|record| !record.is_complete());
        Ok(records)
    }

    /// Sets the completion state of the project's non-report milestones.
    ///
    /// Milestones listed in `completed` that are outstanding are stamped now;
    /// completed milestones missing from it are cleared. Protected milestones
    /// are skipped for non-managers. Returns the number of changes written.
    pub fn update_milestones(
        &self,
        actor: &Actor,
        slug: &str,
        completed: &[MilestoneId],
    ) -> ServiceResult<usize> {
        let project = self.project(slug)?;
        require_editor(actor, &project, "update milestones")?;

        let wanted: HashSet<MilestoneId> = completed.iter().copied().collect();
        let now = now_millis();
        let changes: Vec<CompletionChange> = self
            .get_milestones(slug)?
            .into_iter()
            .filter(|record| actor.is_manager() || !record.milestone.protected)
            .filter_map(|record| {
                let want = wanted.contains(&record.milestone.id);
                if want == record.is_complete() {
                    return None;
                }
                Some(completion_change(&project, &record, want.then_some(now)))
            })
            .collect();

        self.milestones.apply_completion_changes(&changes, now)?;
        info!(
            "event=milestone_update module=service status=ok prj_cd={} changes={}",
            project.prj_cd,
            changes.len()
        );
        Ok(changes.len())
    }

    /// Available and assigned milestones for each requirement group.
    pub fn reporting_options(&self, slug: &str) -> ServiceResult<Vec<ReportingOptions>> {
        let project = self.project(slug)?;
        let catalogue = self.milestones.list_milestones()?;
        let records = self.milestones.project_milestones(project.uuid)?;

        let options = [
            RequirementGroup::Core,
            RequirementGroup::Custom,
            RequirementGroup::Milestones,
        ]
        .into_iter()
        .map(|group| {
            let assigned: Vec<MilestoneId> = records
                .iter()
                .filter(|record| record.required && group.contains(&record.milestone))
                .map(|record| record.milestone.id)
                .collect();
            let choices = catalogue
                .iter()
                .filter(|milestone| group.contains(milestone))
                .cloned()
                .collect();
            ReportingOptions {
                group,
                choices,
                assigned,
            }
        })
        .collect();
        Ok(options)
    }

    /// Replaces the required set of one group with `selected`.
    pub fn update_requirements(
        &self,
        actor: &Actor,
        slug: &str,
        group: RequirementGroup,
        selected: &[MilestoneId],
    ) -> ServiceResult<()> {
        require_manager(actor, "change reporting requirements")?;
        let project = self.project(slug)?;

        let mut selected_set = HashSet::new();
        for id in selected {
            let milestone = self
                .milestones
                .get_milestone(*id)?
                .filter(|milestone| group.contains(milestone))
                .ok_or_else(|| ServiceError::MilestoneNotFound(id.to_string()))?;
            selected_set.insert(milestone.id);
        }

        let mut changes: Vec<(MilestoneId, bool)> = self
            .milestones
            .project_milestones(project.uuid)?
            .into_iter()
            .filter(|record| group.contains(&record.milestone))
            .filter(|record| record.required && !selected_set.contains(&record.milestone.id))
            .map(|record| (record.milestone.id, false))
            .collect();
        let mut ordered: Vec<MilestoneId> = selected_set.into_iter().collect();
        ordered.sort_unstable();
        changes.extend(ordered.into_iter().map(|id| (id, true)));

        self.milestones
            .apply_requirement_changes(project.uuid, &changes)?;
        info!(
            "event=requirements_update module=service status=ok prj_cd={} group={group:?}",
            project.prj_cd
        );
        Ok(())
    }

    /// Creates every missing entry of the default catalogue. Idempotent;
    /// returns how many entries were created.
    pub fn install_default_milestones(&self) -> ServiceResult<usize> {
        let mut created = 0;
        for milestone in default_milestones() {
            if self
                .milestones
                .get_milestone_by_label(&milestone.label)?
                .is_none()
            {
                self.milestones.create_milestone(&milestone)?;
                created += 1;
            }
        }
        info!("event=milestone_install module=service status=ok created={created}");
        Ok(created)
    }

    /// Returns the catalogue entry for the title-cased label, creating a
    /// custom one when missing.
    pub fn add_milestone(
        &self,
        actor: &Actor,
        label: &str,
        report: bool,
    ) -> ServiceResult<Milestone> {
        require_manager(actor, "add milestones")?;
        let label = title_case(label);
        if label.is_empty() {
            return Err(ServiceError::MilestoneNotFound(label));
        }
        if let Some(existing) = self.milestones.get_milestone_by_label(&label)? {
            return Ok(existing);
        }
        let created = self
            .milestones
            .create_milestone(&NewMilestone::custom(label, report))?;
        info!(
            "event=milestone_create module=service status=ok label={:?}",
            created.label
        );
        Ok(created)
    }

    fn project(&self, slug: &str) -> ServiceResult<Project> {
        self.projects
            .get_project(slug)?
            .ok_or_else(|| ServiceError::ProjectNotFound(slug.to_string()))
    }

    fn required_where(
        &self,
        slug: &str,
        keep: impl Fn(&Milestone) -> bool,
    ) -> ServiceResult<Vec<ProjectMilestone>> {
        let project = self.project(slug)?;
        let mut records = self.milestones.project_milestones(project.uuid)?;
        records.retain(|record| record.required && keep(&record.milestone));
        Ok(records)
    }

    fn set_completion(&self, project: &Project, label: &str, complete: bool) -> ServiceResult<()> {
        let record = self
            .milestones
            .project_milestones(project.uuid)?
            .into_iter()
            .find(|record| record.milestone.label == label)
            .ok_or_else(|| ServiceError::MilestoneNotAssigned {
                prj_cd: project.prj_cd.clone(),
                milestone: label.to_string(),
            })?;
        if record.is_complete() == complete {
            return Ok(());
        }
        let now = now_millis();
        let change = completion_change(project, &record, complete.then_some(now));
        self.milestones.apply_completion_changes(&[change], now)?;
        info!(
            "event=milestone_update module=service status=ok prj_cd={} label={label:?} complete={complete}",
            project.prj_cd
        );
        Ok(())
    }
}

/// Notice text announcing a completion or its revocation.
pub(crate) fn completion_message(project: &Project, label: &str, complete: bool) -> String {
    if complete {
        format!("{label} completed for {project}")
    } else {
        format!("{label} revoked for {project}")
    }
}

fn completion_change(
    project: &Project,
    record: &ProjectMilestone,
    completed: Option<i64>,
) -> CompletionChange {
    let complete = completed.is_some();
    CompletionChange {
        project_milestone_id: record.id,
        completed,
        message: completion_message(project, &record.milestone.label, complete),
        level: if complete {
            MessageLevel::Info
        } else {
            MessageLevel::ActionRequired
        },
    }
}
