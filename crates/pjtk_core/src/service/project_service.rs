//! Project use-case service.
//!
//! # Responsibility
//! - Create, edit and copy projects with owner and permission rules.
//! - Provide project lookups, tag and bookmark operations.
//! - Assemble the per-employee project overview.
//!
//! # Invariants
//! - Non-managers always own the projects they create or copy.
//! - `prj_cd` (and therefore slug and year) never changes after creation.
//! - Tags are stored lowercase and deduplicated.

use super::employee_service::minions;
use super::{require_editor, require_manager, ServiceError, ServiceResult};
use crate::model::employee::Actor;
use crate::model::notice::Notice;
use crate::model::project::{normalize_tags, Project, ProjectDraft};
use crate::repo::filter::{ProjectFilter, ProjectStatus};
use crate::repo::notice_repo::{NoticeRepository, SqliteNoticeRepository};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use chrono::Datelike;
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Everything an employee's project page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOverview {
    /// Usernames of the employee and everyone they supervise.
    pub employees: Vec<String>,
    /// Supervises at least one other employee.
    pub boss: bool,
    pub submitted: Vec<Project>,
    pub approved: Vec<Project>,
    pub complete: Vec<Project>,
    pub bookmarks: Vec<Project>,
    /// Unread notices; only filled for the employee's own overview.
    pub notices: Vec<Notice>,
}

pub struct ProjectService<P, U, N>
where
    P: ProjectRepository,
    U: UserRepository,
    N: NoticeRepository,
{
    projects: P,
    users: U,
    notices: N,
}

impl<'conn>
    ProjectService<
        SqliteProjectRepository<'conn>,
        SqliteUserRepository<'conn>,
        SqliteNoticeRepository<'conn>,
    >
{
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteProjectRepository::new(conn),
            SqliteUserRepository::new(conn),
            SqliteNoticeRepository::new(conn),
        )
    }
}

impl<P, U, N> ProjectService<P, U, N>
where
    P: ProjectRepository,
    U: UserRepository,
    N: NoticeRepository,
{
    pub fn new(projects: P, users: U, notices: N) -> Self {
        Self {
            projects,
            users,
            notices,
        }
    }

    /// Creates a project and assigns it every core milestone.
    ///
    /// # Contract
    /// - Owner is the actor unless the actor may assign owners and the draft
    ///   names one.
    /// - Duplicate codes surface as `ServiceError::Conflict`.
    pub fn create_project(&self, actor: &Actor, draft: &ProjectDraft) -> ServiceResult<Project> {
        let owner = match &draft.owner {
            Some(owner) if actor.may_assign_owner() && !owner.trim().is_empty() => owner.clone(),
            _ => actor.username.clone(),
        };
        let project = Project::from_draft(draft, &owner)?;
        let tags = normalize_tags(&draft.tags);
        self.projects
            .create_project(&project, &tags, &draft.project_team)?;
        info!(
            "event=project_create module=service status=ok prj_cd={} owner={}",
            project.prj_cd, project.owner
        );
        Ok(project)
    }

    /// Applies a draft to an existing project. The draft's code is ignored.
    pub fn edit_project(
        &self,
        actor: &Actor,
        slug: &str,
        draft: &ProjectDraft,
    ) -> ServiceResult<Project> {
        let mut project = self.get_project(slug)?;
        require_editor(actor, &project, "edit this project")?;

        let mut draft = draft.clone();
        draft.prj_cd = project.prj_cd.clone();
        if !actor.may_assign_owner() {
            draft.owner = None;
        }
        draft.validate()?;

        project.apply_edit(&draft);
        self.projects.update_project(&project)?;
        self.projects
            .set_tags(project.uuid, &normalize_tags(&draft.tags))?;
        info!(
            "event=project_edit module=service status=ok prj_cd={}",
            project.prj_cd
        );
        Ok(project)
    }

    /// Creates a new project from `draft`, usually seeded with
    /// `Project::to_draft` of the original. Milestone state is not copied.
    pub fn copy_project(
        &self,
        actor: &Actor,
        slug: &str,
        draft: &ProjectDraft,
    ) -> ServiceResult<Project> {
        let source = self.get_project(slug)?;
        let mut draft = draft.clone();
        draft.owner = Some(actor.username.clone());
        let copy = self.create_project(actor, &draft)?;
        info!(
            "event=project_copy module=service status=ok source={} copy={}",
            source.prj_cd, copy.prj_cd
        );
        Ok(copy)
    }

    pub fn get_project(&self, slug: &str) -> ServiceResult<Project> {
        self.projects
            .get_project(slug)?
            .ok_or_else(|| ServiceError::ProjectNotFound(slug.to_string()))
    }

    /// Projects matching the attribute filters, newest year first.
    ///
    /// Geometry filters are not applied here; see
    /// `SpatialService::filter_projects`.
    pub fn list_projects(&self, filter: &ProjectFilter) -> ServiceResult<Vec<Project>> {
        Ok(self.projects.list_projects(filter)?)
    }

    pub fn projects_this_year(&self) -> ServiceResult<Vec<Project>> {
        self.list_projects(&ProjectFilter::for_year(current_year()))
    }

    pub fn projects_last_year(&self) -> ServiceResult<Vec<Project>> {
        self.list_projects(&ProjectFilter::for_year(current_year() - 1))
    }

    pub fn set_tags(&self, actor: &Actor, slug: &str, tags: &[String]) -> ServiceResult<()> {
        let project = self.get_project(slug)?;
        require_editor(actor, &project, "tag this project")?;
        self.projects.set_tags(project.uuid, &normalize_tags(tags))?;
        Ok(())
    }

    pub fn project_tags(&self, slug: &str) -> ServiceResult<Vec<String>> {
        let project = self.get_project(slug)?;
        Ok(self.projects.project_tags(project.uuid)?)
    }

    /// Every tag used by at least one project.
    pub fn list_tags(&self) -> ServiceResult<Vec<String>> {
        Ok(self.projects.list_tags()?)
    }

    pub fn projects_with_tag(&self, tag: &str) -> ServiceResult<Vec<Project>> {
        self.list_projects(&ProjectFilter {
            tag: Some(tag.to_string()),
            ..ProjectFilter::default()
        })
    }

    pub fn project_team(&self, slug: &str) -> ServiceResult<Vec<String>> {
        let project = self.get_project(slug)?;
        Ok(self.projects.project_team(project.uuid)?)
    }

    /// Idempotent.
    pub fn bookmark(&self, actor: &Actor, slug: &str) -> ServiceResult<()> {
        let project = self.get_project(slug)?;
        self.projects.add_bookmark(&actor.username, project.uuid)?;
        Ok(())
    }

    pub fn unbookmark(&self, actor: &Actor, slug: &str) -> ServiceResult<()> {
        let project = self.get_project(slug)?;
        self.projects
            .remove_bookmark(&actor.username, project.uuid)?;
        Ok(())
    }

    pub fn bookmarks(&self, username: &str) -> ServiceResult<Vec<Project>> {
        Ok(self.projects.bookmarks(username)?)
    }

    pub fn watchers(&self, slug: &str) -> ServiceResult<Vec<String>> {
        let project = self.get_project(slug)?;
        Ok(self.projects.watchers(project.uuid)?)
    }

    /// The actor's own overview, unread notices included.
    pub fn my_projects(&self, actor: &Actor) -> ServiceResult<ProjectOverview> {
        let mut overview = self.overview(&actor.username)?;
        overview.notices = self.notices.notices_for(&actor.username, false)?;
        Ok(overview)
    }

    /// A manager's view of another employee's overview.
    pub fn employee_projects(
        &self,
        actor: &Actor,
        username: &str,
    ) -> ServiceResult<ProjectOverview> {
        require_manager(actor, "view another employee's projects")?;
        self.overview(username)
    }

    fn overview(&self, username: &str) -> ServiceResult<ProjectOverview> {
        let employees: Vec<String> = minions(&self.users, username)?
            .into_iter()
            .map(|employee| employee.username)
            .collect();
        let by_status = |status| {
            self.list_projects(&ProjectFilter {
                owners: employees.clone(),
                status: Some(status),
                ..ProjectFilter::default()
            })
        };

        Ok(ProjectOverview {
            boss: employees.len() > 1,
            submitted: by_status(ProjectStatus::Submitted)?,
            approved: by_status(ProjectStatus::Approved)?,
            complete: by_status(ProjectStatus::Complete)?,
            bookmarks: self.projects.bookmarks(username)?,
            notices: Vec::new(),
            employees,
        })
    }
}

fn current_year() -> i32 {
    chrono::Local::now().year()
}
