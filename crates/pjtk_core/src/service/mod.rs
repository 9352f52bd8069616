//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Enforce role checks for the acting caller.
//! - Keep CLI/HTTP layers decoupled from storage details.
//!
//! # Invariants
//! - Services never bypass repository persistence contracts.
//! - Permission failures are reported before any write happens.

use crate::geo::GeoError;
use crate::model::project::ProjectValidationError;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod employee_service;
pub mod milestone_service;
pub mod notice_service;
pub mod project_service;
pub mod report_service;
pub mod sister_service;
pub mod spatial_service;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error shared by every use-case module.
#[derive(Debug)]
pub enum ServiceError {
    Validation(ProjectValidationError),
    /// The actor lacks the role required for `action`.
    PermissionDenied {
        username: String,
        action: &'static str,
    },
    ProjectNotFound(String),
    MilestoneNotFound(String),
    /// The milestone exists but is not tracked on the project.
    MilestoneNotAssigned {
        prj_cd: String,
        milestone: String,
    },
    EmployeeNotFound(String),
    NotASisterCandidate {
        parent: String,
        sister: String,
    },
    /// Every problem found in a rejected upload.
    InvalidUpload(Vec<String>),
    Geometry(GeoError),
    Conflict(String),
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::PermissionDenied { username, action } => {
                write!(f, "{username} is not allowed to {action}")
            }
            Self::ProjectNotFound(slug) => write!(f, "project not found: {slug}"),
            Self::MilestoneNotFound(label) => write!(f, "milestone not found: {label}"),
            Self::MilestoneNotAssigned { prj_cd, milestone } => {
                write!(f, "milestone `{milestone}` is not assigned to {prj_cd}")
            }
            Self::EmployeeNotFound(username) => {
                write!(f, "employee profile not configured for {username}")
            }
            Self::NotASisterCandidate { parent, sister } => {
                write!(f, "{sister} cannot be a sister of {parent}")
            }
            Self::InvalidUpload(problems) => write!(f, "invalid upload: {}", problems.join("; ")),
            Self::Geometry(err) => write!(f, "{err}"),
            Self::Conflict(what) => write!(f, "conflict: {what}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Geometry(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::Conflict(what) => Self::Conflict(what),
            other => Self::Repo(other),
        }
    }
}

impl From<ProjectValidationError> for ServiceError {
    fn from(value: ProjectValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<GeoError> for ServiceError {
    fn from(value: GeoError) -> Self {
        Self::Geometry(value)
    }
}

pub(crate) fn require_manager(
    actor: &crate::model::employee::Actor,
    action: &'static str,
) -> ServiceResult<()> {
    if actor.is_manager() {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied {
            username: actor.username.clone(),
            action,
        })
    }
}

pub(crate) fn require_editor(
    actor: &crate::model::employee::Actor,
    project: &crate::model::project::Project,
    action: &'static str,
) -> ServiceResult<()> {
    if actor.can_edit(project) {
        Ok(())
    } else {
        Err(ServiceError::PermissionDenied {
            username: actor.username.clone(),
            action,
        })
    }
}
