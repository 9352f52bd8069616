//! Uploaded report and associated-file records.

use super::milestone::ProjectMilestone;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub type ReportId = Uuid;

/// An uploaded artifact fulfilling one or more project milestones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub uuid: ReportId,
    pub report_path: String,
    pub report_hash: String,
    pub uploaded_by: String,
    /// Unix epoch milliseconds.
    pub uploaded_on: i64,
    pub current: bool,
}

impl Report {
    pub fn new(report_path: impl Into<String>, uploaded_by: impl Into<String>, now: i64) -> Self {
        let report_path = report_path.into();
        Self {
            uuid: Uuid::new_v4(),
            report_hash: content_hash(&report_path),
            report_path,
            uploaded_by: uploaded_by.into(),
            uploaded_on: now,
            current: true,
        }
    }
}

/// A free-form file attached to a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedFile {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub file_path: String,
    pub file_hash: String,
    pub uploaded_by: String,
    pub uploaded_on: i64,
    pub current: bool,
}

/// A reporting requirement together with its current upload, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAssignment {
    pub project_milestone: ProjectMilestone,
    pub report: Option<Report>,
}

/// Hex-encoded SHA-256 of the stored path.
pub fn content_hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}
