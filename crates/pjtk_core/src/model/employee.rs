//! Users, employees and the acting caller.
//!
//! # Invariants
//! - Every employee is backed by a user with the same `username`.
//! - `Actor::is_manager` holds for managers and superusers.

use super::project::Project;
use serde::{Deserialize, Serialize};

/// Position of an employee in the approval workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Employee,
    Manager,
    Dba,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Manager => "manager",
            Self::Dba => "dba",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" => Some(Self::Employee),
            "manager" => Some(Self::Manager),
            "dba" => Some(Self::Dba),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl User {
    pub fn new(username: impl Into<String>, first_name: &str, last_name: &str) -> Self {
        Self {
            username: username.into(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: String::new(),
            is_active: true,
            is_superuser: false,
        }
    }

    /// "first last", falling back to the username when both are blank.
    pub fn full_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub username: String,
    pub role: Role,
    pub supervisor: Option<String>,
}

/// The authenticated caller of a service operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    pub role: Role,
    pub is_superuser: bool,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            is_superuser: false,
        }
    }

    pub fn from_parts(user: &User, employee: Option<&Employee>) -> Self {
        Self {
            username: user.username.clone(),
            role: employee.map(|e| e.role).unwrap_or_default(),
            is_superuser: user.is_superuser,
        }
    }

    pub fn is_manager(&self) -> bool {
        self.is_superuser || self.role == Role::Manager
    }

    /// Managers and DBAs may create projects on behalf of someone else.
    pub fn may_assign_owner(&self) -> bool {
        self.is_manager() || self.role == Role::Dba
    }

    pub fn can_edit(&self, project: &Project) -> bool {
        self.is_manager() || project.owner == self.username
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn superuser_counts_as_manager() {
        let mut actor = Actor::new("bart", Role::Employee);
        assert!(!actor.is_manager());
        actor.is_superuser = true;
        assert!(actor.is_manager());
    }

    #[test]
    fn full_name_falls_back_to_username() {
        let user = User::new("homer", "", "");
        assert_eq!(user.full_name(), "homer");
        assert_eq!(User::new("homer", "Homer", "Simpson").full_name(), "Homer Simpson");
    }
}
