//! Sample points collected by a project.

use super::project::ProjectId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub uuid: Uuid,
    pub project_uuid: ProjectId,
    pub label: String,
    pub dd_lat: f64,
    pub dd_lon: f64,
}

/// A point as parsed from an upload, before it is attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSamplePoint {
    pub label: String,
    pub dd_lat: f64,
    pub dd_lon: f64,
}

impl NewSamplePoint {
    pub fn into_point(self, project_uuid: ProjectId) -> SamplePoint {
        SamplePoint {
            uuid: Uuid::new_v4(),
            project_uuid,
            label: self.label,
            dd_lat: self.dd_lat,
            dd_lon: self.dd_lon,
        }
    }
}

/// How an upload combines with points already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    Replace,
    Append,
}
