//! Reference tables: lakes, project types and protocols.

use crate::geo::Envelope;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lake {
    pub id: i64,
    pub abbrev: String,
    pub lake_name: String,
    /// Sample points uploaded for projects on this lake must fall inside.
    pub envelope: Option<Envelope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectType {
    pub id: i64,
    pub project_type: String,
    pub scope: String,
    pub field_component: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    pub id: i64,
    pub protocol: String,
    pub abbrev: String,
    pub deprecated: bool,
}
