//! Sister-project family use-cases.
//!
//! # Responsibility
//! - Decide which projects may become sisters.
//! - Translate add/remove/form edits into family link and detach calls.
//!
//! # Invariants
//! - Only approved, comparable projects are ever linked.
//! - Candidates never include the project itself or its current sisters.

use super::{ServiceError, ServiceResult};
use crate::model::project::{FamilyId, Project};
use crate::repo::family_repo::{FamilyRepository, SqliteFamilyRepository};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use log::info;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One row of the sister form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SisterChoice {
    pub prj_cd: String,
    pub prj_nm: String,
    pub prj_ldr: String,
    pub slug: String,
    /// Already a sister.
    pub checked: bool,
}

impl SisterChoice {
    fn from_project(project: &Project, checked: bool) -> Self {
        Self {
            prj_cd: project.prj_cd.clone(),
            prj_nm: project.prj_nm.clone(),
            prj_ldr: project.prj_ldr.clone(),
            slug: project.slug.clone(),
            checked,
        }
    }
}

pub struct SisterService<P: ProjectRepository, F: FamilyRepository> {
    projects: P,
    families: F,
}

impl<'conn> SisterService<SqliteProjectRepository<'conn>, SqliteFamilyRepository<'conn>> {
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(
            SqliteProjectRepository::new(conn),
            SqliteFamilyRepository::new(conn),
        )
    }
}

impl<P: ProjectRepository, F: FamilyRepository> SisterService<P, F> {
    pub fn new(projects: P, families: F) -> Self {
        Self { projects, families }
    }

    /// Approved projects comparable to this one and not yet its sisters,
    /// ordered by project code.
    pub fn sister_candidates(&self, slug: &str) -> ServiceResult<Vec<Project>> {
        let project = self.project(slug)?;
        self.candidates_of(&project)
    }

    /// Family members ordered by project code.
    pub fn get_sisters(&self, slug: &str, exclude_self: bool) -> ServiceResult<Vec<Project>> {
        let project = self.project(slug)?;
        let Some(family) = project.family else {
            return Ok(Vec::new());
        };
        let mut members = self.families.family_members(family)?;
        if exclude_self {
            members.retain(|member| member.uuid != project.uuid);
        }
        Ok(members)
    }

    pub fn get_family(&self, slug: &str) -> ServiceResult<Option<FamilyId>> {
        Ok(self.project(slug)?.family)
    }

    pub fn has_sister(&self, slug: &str) -> ServiceResult<bool> {
        Ok(!self.get_sisters(slug, true)?.is_empty())
    }

    /// Links `sister` into the family of `parent`, merging families when
    /// both already have one.
    pub fn add_sister(&self, parent: &str, sister: &str) -> ServiceResult<FamilyId> {
        let parent_project = self.project(parent)?;
        let sister_project = self.project(sister)?;
        let is_candidate = self
            .candidates_of(&parent_project)?
            .iter()
            .any(|candidate| candidate.uuid == sister_project.uuid);
        if !is_candidate {
            return Err(ServiceError::NotASisterCandidate {
                parent: parent_project.prj_cd,
                sister: sister_project.prj_cd,
            });
        }

        let family = self
            .families
            .link(parent_project.uuid, sister_project.uuid)?;
        info!(
            "event=sister_add module=service status=ok parent={} sister={} family={family}",
            parent_project.prj_cd, sister_project.prj_cd
        );
        Ok(family)
    }

    /// Removes `sister` from the family it shares with `parent`. Projects
    /// that are not sisters are left alone.
    pub fn delete_sister(&self, parent: &str, sister: &str) -> ServiceResult<()> {
        let parent_project = self.project(parent)?;
        let sister_project = self.project(sister)?;
        if parent_project.family.is_none() || parent_project.family != sister_project.family {
            return Ok(());
        }
        self.families.detach(sister_project.uuid)?;
        info!(
            "event=sister_delete module=service status=ok parent={} sister={}",
            parent_project.prj_cd, sister_project.prj_cd
        );
        Ok(())
    }

    /// Takes the project out of its family.
    pub fn disown(&self, slug: &str) -> ServiceResult<()> {
        let project = self.project(slug)?;
        self.families.detach(project.uuid)?;
        info!(
            "event=sister_disown module=service status=ok prj_cd={}",
            project.prj_cd
        );
        Ok(())
    }

    /// Applies the sister form: `selected` holds the slugs left checked.
    pub fn update_sisters(&self, parent: &str, selected: &[String]) -> ServiceResult<()> {
        let current: BTreeSet<String> = self
            .get_sisters(parent, true)?
            .into_iter()
            .map(|project| project.slug)
            .collect();
        let wanted: BTreeSet<String> = selected.iter().map(|slug| slug.to_lowercase()).collect();

        if wanted == current {
            return Ok(());
        }
        if wanted.is_empty() {
            return self.disown(parent);
        }
        for slug in wanted.difference(&current) {
            self.add_sister(parent, slug)?;
        }
        for slug in current.difference(&wanted) {
            self.delete_sister(parent, slug)?;
        }
        Ok(())
    }

    /// Current sisters (checked) followed by candidates (unchecked).
    pub fn sister_listing(&self, slug: &str) -> ServiceResult<Vec<SisterChoice>> {
        let project = self.project(slug)?;
        let mut listing: Vec<SisterChoice> = self
            .get_sisters(slug, true)?
            .iter()
            .map(|sister| SisterChoice::from_project(sister, true))
            .collect();
        listing.extend(
            self.candidates_of(&project)?
                .iter()
                .map(|candidate| SisterChoice::from_project(candidate, false)),
        );
        Ok(listing)
    }

    fn candidates_of(&self, project: &Project) -> ServiceResult<Vec<Project>> {
        if !self.families.is_approved(project.uuid)? {
            return Ok(Vec::new());
        }
        let mut candidates = self.families.comparable_projects(project)?;
        if project.family.is_some() {
            candidates.retain(|candidate| candidate.family != project.family);
        }
        Ok(candidates)
    }

    fn project(&self, slug: &str) -> ServiceResult<Project> {
        self.projects
            .get_project(slug)?
            .ok_or_else(|| ServiceError::ProjectNotFound(slug.to_string()))
    }
}
