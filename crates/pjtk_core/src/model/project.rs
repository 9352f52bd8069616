//! Project domain model.
//!
//! # Responsibility
//! - Define the canonical project record and its editable draft.
//! - Validate project codes and the date rules tied to them.
//!
//! # Invariants
//! - `prj_cd` matches `^[A-Z]{3}_[A-Z]{2}[0-9]{2}_[A-Z0-9]{3}$` (ASCII only).
//! - `slug` is the lowercase project code.
//! - `year` is `2000 + prj_cd[6..8]`.
//! - Both dates fall in `year` and `prj_date1 >= prj_date0`.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type FamilyId = Uuid;

static PROJECT_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{3}_[A-Z]{2}[0-9]{2}_[A-Z0-9]{3}$").expect("valid project code regex")
});

/// Validation failures for project drafts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectValidationError {
    InvalidCode(String),
    EmptyName,
    EndBeforeStart,
    DatesInDifferentYears,
    DatesDisagreeWithCode,
}

impl Display for ProjectValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCode(code) => write!(
                f,
                "`{code}` is not a valid project code (expected e.g. LHA_IA12_123)"
            ),
            Self::EmptyName => write!(f, "Project name cannot be empty."),
            Self::EndBeforeStart => write!(f, "Project end date occurs before start date."),
            Self::DatesInDifferentYears => {
                write!(f, "Project start and end date occur in different years.")
            }
            Self::DatesDisagreeWithCode => {
                write!(f, "Project dates do not agree with project code.")
            }
        }
    }
}

impl Error for ProjectValidationError {}

/// Returns `Ok(())` when `code` is a well-formed project code.
pub fn validate_project_code(code: &str) -> Result<(), ProjectValidationError> {
    if PROJECT_CODE_RE.is_match(code) {
        Ok(())
    } else {
        Err(ProjectValidationError::InvalidCode(code.to_string()))
    }
}

/// Two-digit year embedded in a validated project code.
fn code_year_suffix(code: &str) -> Option<&str> {
    code.get(6..8)
}

/// Calendar year encoded in a project code.
pub fn project_year(code: &str) -> Result<i32, ProjectValidationError> {
    validate_project_code(code)?;
    code_year_suffix(code)
        .ok_or_else(|| ProjectValidationError::InvalidCode(code.to_string()))?
        .parse::<i32>()
        .map(|yy| 2000 + yy)
        .map_err(|_| ProjectValidationError::InvalidCode(code.to_string()))
}

/// URL-safe identifier derived from a project code.
pub fn project_slug(code: &str) -> String {
    code.to_lowercase()
}

/// Normalizes tag input: trims, lowercases, drops blanks and duplicates.
///
/// First occurrence order is kept.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let value = tag.trim().to_lowercase();
        if !value.is_empty() && !normalized.contains(&value) {
            normalized.push(value);
        }
    }
    normalized
}

/// Editable project attributes used for create, edit and copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    pub prj_cd: String,
    pub prj_nm: String,
    pub prj_date0: NaiveDate,
    pub prj_date1: NaiveDate,
    pub prj_ldr: String,
    #[serde(default)]
    pub field_ldr: Option<String>,
    /// Ignored for non-manager callers, who always own what they create.
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub dba: Option<String>,
    pub project_type_id: i64,
    #[serde(default)]
    pub protocol_id: Option<i64>,
    pub lake_id: i64,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub risk: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub project_team: Vec<String>,
}

impl ProjectDraft {
    /// Checks code format, name and date consistency.
    pub fn validate(&self) -> Result<(), ProjectValidationError> {
        validate_project_code(&self.prj_cd)?;
        if self.prj_nm.trim().is_empty() {
            return Err(ProjectValidationError::EmptyName);
        }
        if self.prj_date1 < self.prj_date0 {
            return Err(ProjectValidationError::EndBeforeStart);
        }
        if self.prj_date0.year() != self.prj_date1.year() {
            return Err(ProjectValidationError::DatesInDifferentYears);
        }
        let yy = format!("{:02}", self.prj_date1.year().rem_euclid(100));
        if code_year_suffix(&self.prj_cd) != Some(yy.as_str()) {
            return Err(ProjectValidationError::DatesDisagreeWithCode);
        }
        Ok(())
    }
}

/// Canonical project record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: ProjectId,
    pub prj_cd: String,
    pub slug: String,
    pub prj_nm: String,
    pub year: i32,
    pub prj_date0: NaiveDate,
    pub prj_date1: NaiveDate,
    pub prj_ldr: String,
    pub field_ldr: Option<String>,
    pub owner: String,
    pub dba: Option<String>,
    pub project_type_id: i64,
    pub protocol_id: Option<i64>,
    pub lake_id: i64,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub comment: String,
    pub risk: String,
    pub family: Option<FamilyId>,
    pub active: bool,
}

impl Project {
    /// Builds a new record from a validated draft.
    ///
    /// `owner` is the resolved owner; the draft's own `owner` is not consulted.
    pub fn from_draft(draft: &ProjectDraft, owner: &str) -> Result<Self, ProjectValidationError> {
        draft.validate()?;
        Ok(Self {
            uuid: Uuid::new_v4(),
            prj_cd: draft.prj_cd.clone(),
            slug: project_slug(&draft.prj_cd),
            prj_nm: draft.prj_nm.trim().to_string(),
            year: project_year(&draft.prj_cd)?,
            prj_date0: draft.prj_date0,
            prj_date1: draft.prj_date1,
            prj_ldr: draft.prj_ldr.clone(),
            field_ldr: draft.field_ldr.clone(),
            owner: owner.to_string(),
            dba: draft.dba.clone(),
            project_type_id: draft.project_type_id,
            protocol_id: draft.protocol_id,
            lake_id: draft.lake_id,
            abstract_text: draft.abstract_text.clone(),
            comment: draft.comment.clone(),
            risk: draft.risk.clone(),
            family: None,
            active: true,
        })
    }

    /// Applies editable draft fields in place. Code, slug and year never change.
    pub fn apply_edit(&mut self, draft: &ProjectDraft) {
        self.prj_nm = draft.prj_nm.trim().to_string();
        self.prj_date0 = draft.prj_date0;
        self.prj_date1 = draft.prj_date1;
        self.prj_ldr = draft.prj_ldr.clone();
        self.field_ldr = draft.field_ldr.clone();
        if let Some(owner) = &draft.owner {
            self.owner = owner.clone();
        }
        self.dba = draft.dba.clone();
        self.project_type_id = draft.project_type_id;
        self.protocol_id = draft.protocol_id;
        self.lake_id = draft.lake_id;
        self.abstract_text = draft.abstract_text.clone();
        self.comment = draft.comment.clone();
        self.risk = draft.risk.clone();
    }

    /// Draft pre-filled from this project, used as the template for copies.
    pub fn to_draft(&self) -> ProjectDraft {
        ProjectDraft {
            prj_cd: self.prj_cd.clone(),
            prj_nm: self.prj_nm.clone(),
            prj_date0: self.prj_date0,
            prj_date1: self.prj_date1,
            prj_ldr: self.prj_ldr.clone(),
            field_ldr: self.field_ldr.clone(),
            owner: Some(self.owner.clone()),
            dba: self.dba.clone(),
            project_type_id: self.project_type_id,
            protocol_id: self.protocol_id,
            lake_id: self.lake_id,
            abstract_text: self.abstract_text.clone(),
            comment: self.comment.clone(),
            risk: self.risk.clone(),
            tags: Vec::new(),
            project_team: Vec::new(),
        }
    }

    /// Last three characters of the project code.
    pub fn suffix(&self) -> &str {
        let len = self.prj_cd.len();
        &self.prj_cd[len.saturating_sub(3)..]
    }
}

impl Display for Project {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.prj_nm, self.prj_cd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(code: &str, start: (i32, u32, u32), end: (i32, u32, u32)) -> ProjectDraft {
        ProjectDraft {
            prj_cd: code.to_string(),
            prj_nm: "Fake Project".to_string(),
            prj_date0: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
            prj_date1: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
            prj_ldr: "hsimpson".to_string(),
            field_ldr: None,
            owner: None,
            dba: None,
            project_type_id: 1,
            protocol_id: None,
            lake_id: 1,
            abstract_text: String::new(),
            comment: String::new(),
            risk: String::new(),
            tags: Vec::new(),
            project_team: Vec::new(),
        }
    }

    #[test]
    fn project_code_pattern_accepts_letters_and_digits_in_suffix() {
        assert!(validate_project_code("LHA_IA12_123").is_ok());
        assert!(validate_project_code("LHA_IA12_ABC").is_ok());
        assert!(validate_project_code("LHA_IA12_1B3").is_ok());
    }

    #[test]
    fn project_code_pattern_rejects_malformed_codes() {
        for bad in ["lha_ia12_123", "LHA_IA12_12", "LHAIA12_123", "LHA_IA1X_123", "LHA_IA12_1234"] {
            assert!(validate_project_code(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn year_and_slug_are_derived_from_code() {
        assert_eq!(project_year("LHA_IA12_123").unwrap(), 2012);
        assert_eq!(project_slug("LHA_IA12_123"), "lha_ia12_123");
    }

    #[test]
    fn end_date_before_start_is_rejected() {
        let err = draft("LHA_IA12_123", (2012, 6, 1), (2012, 5, 1))
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Project end date occurs before start date.");
    }

    #[test]
    fn dates_must_share_a_year() {
        let err = draft("LHA_IA12_123", (2011, 6, 1), (2012, 5, 1))
            .validate()
            .unwrap_err();
        assert_eq!(err, ProjectValidationError::DatesInDifferentYears);
    }

    #[test]
    fn dates_must_match_code_year() {
        let err = draft("LHA_IA12_123", (2013, 5, 1), (2013, 6, 1))
            .validate()
            .unwrap_err();
        assert_eq!(err, ProjectValidationError::DatesDisagreeWithCode);
    }

    #[test]
    fn display_and_suffix() {
        let project = Project::from_draft(
            &draft("LHA_IA12_123", (2012, 5, 1), (2012, 6, 1)),
            "hsimpson",
        )
        .unwrap();
        assert_eq!(project.to_string(), "Fake Project (LHA_IA12_123)");
        assert_eq!(project.suffix(), "123");
        assert_eq!(project.year, 2012);
    }

    #[test]
    fn tags_are_lowercased_and_deduplicated() {
        let tags = vec![
            "Walleye".to_string(),
            " walleye ".to_string(),
            "".to_string(),
            "Creel".to_string(),
        ];
        assert_eq!(normalize_tags(&tags), vec!["walleye", "creel"]);
    }
}
