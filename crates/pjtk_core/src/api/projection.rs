//! Serializable views of core records exposed by the read-only API.

use crate::model::employee::User;
use crate::model::lookup::ProjectType;
use crate::model::project::Project;
use crate::model::spatial::SamplePoint;
use crate::repo::point_repo::PointListing;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const API_PREFIX: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectLead {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
}

impl ProjectLead {
    /// Stand-in for a leader username with no user record.
    pub fn unknown(username: &str) -> Self {
        Self {
            username: username.to_string(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            is_active: false,
        }
    }
}

impl From<&User> for ProjectLead {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTypeView {
    pub id: i64,
    pub project_type: String,
    pub scope: String,
    pub field_component: bool,
}

impl From<&ProjectType> for ProjectTypeView {
    fn from(value: &ProjectType) -> Self {
        Self {
            id: value.id,
            project_type: value.project_type.clone(),
            scope: value.scope.clone(),
            field_component: value.field_component,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub year: i32,
    pub prj_cd: String,
    pub slug: String,
    pub prj_nm: String,
    pub prj_date0: NaiveDate,
    pub prj_date1: NaiveDate,
    pub project_type: String,
    pub prj_ldr: ProjectLead,
    pub comment: String,
    /// Relative URL of the project's sample points.
    pub sample_points: String,
}

impl ProjectSummary {
    pub fn new(project: &Project, project_type: &str, leader: ProjectLead) -> Self {
        Self {
            year: project.year,
            prj_cd: project.prj_cd.clone(),
            slug: project.slug.clone(),
            prj_nm: project.prj_nm.clone(),
            prj_date0: project.prj_date0,
            prj_date1: project.prj_date1,
            project_type: project_type.to_string(),
            prj_ldr: leader,
            comment: project.comment.clone(),
            sample_points: format!("{API_PREFIX}/project_points/{}", project.slug),
        }
    }
}

/// What the annual assessment report needs about a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAbstract {
    pub year: i32,
    pub prj_cd: String,
    pub slug: String,
    pub prj_nm: String,
    pub prj_date0: NaiveDate,
    pub prj_date1: NaiveDate,
    pub project_type: String,
    /// "first last" of the project lead.
    pub project_leader: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

impl ProjectAbstract {
    pub fn new(project: &Project, project_type: &str, leader: &str) -> Self {
        Self {
            year: project.year,
            prj_cd: project.prj_cd.clone(),
            slug: project.slug.clone(),
            prj_nm: project.prj_nm.clone(),
            prj_date0: project.prj_date0,
            prj_date1: project.prj_date1,
            project_type: project_type.to_string(),
            project_leader: leader.to_string(),
            abstract_text: project.abstract_text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointView {
    pub prj_cd: String,
    pub label: String,
    pub dd_lat: f64,
    pub dd_lon: f64,
    pub popup_text: String,
    pub project_type: String,
}

impl PointView {
    pub fn from_sample(project: &Project, project_type: &str, point: &SamplePoint) -> Self {
        Self {
            prj_cd: project.prj_cd.clone(),
            label: point.label.clone(),
            dd_lat: point.dd_lat,
            dd_lon: point.dd_lon,
            popup_text: popup_text(&project.prj_cd, &point.label),
            project_type: project_type.to_string(),
        }
    }
}

impl From<PointListing> for PointView {
    fn from(listing: PointListing) -> Self {
        Self {
            popup_text: popup_text(&listing.prj_cd, &listing.label),
            prj_cd: listing.prj_cd,
            label: listing.label,
            dd_lat: listing.dd_lat,
            dd_lon: listing.dd_lon,
            project_type: listing.project_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonView {
    pub prj_cd: String,
    /// WKT polygon in decimal degrees.
    pub geom: String,
}

fn popup_text(prj_cd: &str, label: &str) -> String {
    format!("{prj_cd} - {label}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_becomes_point_view_with_popup() {
        let listing = PointListing {
            project_uuid: uuid::Uuid::new_v4(),
            prj_cd: "LHA_IA12_001".to_string(),
            prj_nm: "Offshore Index".to_string(),
            year: 2012,
            project_type: "Offshore Index".to_string(),
            label: "12".to_string(),
            dd_lat: 45.5,
            dd_lon: -81.5,
        };
        let view = PointView::from(listing);
        assert_eq!(view.popup_text, "LHA_IA12_001 - 12");
        assert_eq!(view.project_type, "Offshore Index");
    }

    #[test]
    fn unknown_leader_keeps_username() {
        let lead = ProjectLead::unknown("hsimpson");
        assert_eq!(lead.username, "hsimpson");
        assert!(!lead.is_active);
    }
}
