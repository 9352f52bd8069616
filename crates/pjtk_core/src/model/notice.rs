//! Milestone-change notices delivered to users.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageLevel {
    Info,
    #[serde(rename = "actionrequired")]
    ActionRequired,
}

impl MessageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::ActionRequired => "actionrequired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Self::Info),
            "actionrequired" => Some(Self::ActionRequired),
            _ => None,
        }
    }
}

/// One message as seen by one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message_id: i64,
    pub username: String,
    pub prj_cd: String,
    pub slug: String,
    pub milestone: String,
    pub msg: String,
    pub level: MessageLevel,
    pub created_at: i64,
    pub read_at: Option<i64>,
}
