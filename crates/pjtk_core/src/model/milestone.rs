//! Milestone and per-project milestone records.
//!
//! # Responsibility
//! - Describe the milestone catalogue (core/custom/suggested).
//! - Describe the join record tracking a milestone on one project.
//!
//! # Invariants
//! - `ProjectMilestone::completed` is the only completion state; approval and
//!   sign-off are completions of the milestones labelled [`APPROVED_LABEL`] and
//!   [`SIGNOFF_LABEL`].
//! - A project holds at most one record per milestone.

use super::project::ProjectId;
use serde::{Deserialize, Serialize};

pub type MilestoneId = i64;
pub type ProjectMilestoneId = i64;

pub const APPROVED_LABEL: &str = "Approved";
pub const SIGNOFF_LABEL: &str = "Sign off";

/// Controls whether a milestone is assigned to new projects automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneCategory {
    /// Assigned to every new project.
    Core,
    Custom,
    Suggested,
}

impl MilestoneCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Custom => "custom",
            Self::Suggested => "suggested",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "core" => Some(Self::Core),
            "custom" => Some(Self::Custom),
            "suggested" => Some(Self::Suggested),
            _ => None,
        }
    }
}

/// Catalogue entry shared by all projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub label: String,
    pub label_abbrev: String,
    pub category: MilestoneCategory,
    pub order: i64,
    /// Fulfilled by uploading a report.
    pub report: bool,
    /// Only managers may change completion.
    pub protected: bool,
    /// Uploads propagate to sister projects.
    pub shared: bool,
}

/// Input for creating a catalogue entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMilestone {
    pub label: String,
    pub label_abbrev: String,
    pub category: MilestoneCategory,
    pub order: i64,
    pub report: bool,
    pub protected: bool,
    pub shared: bool,
}

impl NewMilestone {
    /// Custom, unshared, unprotected entry; the abbreviation defaults to the label.
    pub fn custom(label: impl Into<String>, report: bool) -> Self {
        let label = label.into();
        Self {
            label_abbrev: label.clone(),
            label,
            category: MilestoneCategory::Custom,
            order: 99,
            report,
            protected: false,
            shared: false,
        }
    }
}

/// One milestone as tracked on one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMilestone {
    pub id: ProjectMilestoneId,
    pub project_uuid: ProjectId,
    pub milestone: Milestone,
    pub required: bool,
    /// Unix epoch milliseconds.
    pub completed: Option<i64>,
}

impl ProjectMilestone {
    pub fn is_complete(&self) -> bool {
        self.completed.is_some()
    }
}

/// Milestone selection groups offered when editing reporting requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementGroup {
    /// Core report milestones.
    Core,
    /// Custom and suggested report milestones.
    Custom,
    /// Milestones that do not require a report.
    Milestones,
}

impl RequirementGroup {
    pub fn contains(self, milestone: &Milestone) -> bool {
        match self {
            Self::Core => milestone.report && milestone.category == MilestoneCategory::Core,
            Self::Custom => milestone.report && milestone.category != MilestoneCategory::Core,
            Self::Milestones => !milestone.report,
        }
    }
}

/// Title-cases a free-form label: first letter of each word upper, rest lower.
pub fn title_case(label: &str) -> String {
    label
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Catalogue installed by `pjtk init`.
pub fn default_milestones() -> Vec<NewMilestone> {
    let entry = |label: &str, abbrev: &str, order, report, protected, shared| NewMilestone {
        label: label.to_string(),
        label_abbrev: abbrev.to_string(),
        category: MilestoneCategory::Core,
        order,
        report,
        protected,
        shared,
    };
    vec![
        entry(APPROVED_LABEL, "Approved", 1, false, true, false),
        entry("Field Work Conducted", "Field Work", 2, false, false, false),
        entry("Data Scrubbed", "Scrubbed", 3, false, false, false),
        entry("Data Merged", "Merged", 4, false, false, false),
        entry(SIGNOFF_LABEL, "Sign off", 99, false, true, false),
        entry("Project Proposal", "Proposal", 10, true, false, false),
        entry("Proposal Presentation", "Prop Pres", 11, true, false, false),
        entry("Completion Report", "Completion Rep", 20, true, false, true),
        entry("Summary Report", "Summary Rep", 30, true, false, true),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_normalizes_each_word() {
        assert_eq!(title_case("creel  SUMMARY report"), "Creel Summary Report");
    }

    #[test]
    fn requirement_groups_partition_by_report_and_category() {
        let mut milestone = NewMilestone::custom("x", true);
        let mut as_ms = Milestone {
            id: 1,
            label: milestone.label.clone(),
            label_abbrev: milestone.label_abbrev.clone(),
            category: milestone.category,
            order: milestone.order,
            report: milestone.report,
            protected: false,
            shared: false,
        };
        assert!(RequirementGroup::Custom.contains(&as_ms));
        assert!(!RequirementGroup::Core.contains(&as_ms));

        milestone.category = MilestoneCategory::Core;
        as_ms.category = milestone.category;
        assert!(RequirementGroup::Core.contains(&as_ms));

        as_ms.report = false;
        assert!(RequirementGroup::Milestones.contains(&as_ms));
        assert!(!RequirementGroup::Core.contains(&as_ms));
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(MilestoneCategory::parse("Core"), Some(MilestoneCategory::Core));
        assert_eq!(MilestoneCategory::parse("nope"), None);
    }
}
