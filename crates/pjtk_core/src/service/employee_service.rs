//! Supervision hierarchy traversal.
//!
//! # Invariants
//! - Both traversals start with the employee itself.
//! - A cyclic supervisor chain is cut at the first repeated employee instead
//!   of looping.

use super::{ServiceError, ServiceResult};
use crate::model::employee::Employee;
use crate::repo::user_repo::{SqliteUserRepository, UserRepository};
use log::warn;
use rusqlite::Connection;
use std::collections::HashSet;

pub struct EmployeeService<U: UserRepository> {
    users: U,
}

impl<'conn> EmployeeService<SqliteUserRepository<'conn>> {
    pub fn with_connection(conn: &'conn Connection) -> Self {
        Self::new(SqliteUserRepository::new(conn))
    }
}

impl<U: UserRepository> EmployeeService<U> {
    pub fn new(users: U) -> Self {
        Self { users }
    }

    /// The employee followed by each supervisor up the chain.
    pub fn get_supervisors(&self, username: &str) -> ServiceResult<Vec<Employee>> {
        supervisors(&self.users, username)
    }

    /// Pre-order walk of everyone the employee supervises, directly or not.
    pub fn get_minions(&self, username: &str) -> ServiceResult<Vec<Employee>> {
        minions(&self.users, username)
    }
}

pub(crate) fn supervisors<U: UserRepository>(
    users: &U,
    username: &str,
) -> ServiceResult<Vec<Employee>> {
    let mut current = users
        .get_employee(username)?
        .ok_or_else(|| ServiceError::EmployeeNotFound(username.to_string()))?;
    let mut seen = HashSet::from([current.username.clone()]);
    let mut chain = Vec::new();

    loop {
        let next = current.supervisor.clone();
        chain.push(current);
        let Some(boss) = next else {
            break;
        };
        if !seen.insert(boss.clone()) {
            warn!("event=supervisor_cycle module=service status=error username={boss}");
            break;
        }
        match users.get_employee(&boss)? {
            Some(employee) => current = employee,
            None => break,
        }
    }
    Ok(chain)
}

pub(crate) fn minions<U: UserRepository>(
    users: &U,
    username: &str,
) -> ServiceResult<Vec<Employee>> {
    let root = users
        .get_employee(username)?
        .ok_or_else(|| ServiceError::EmployeeNotFound(username.to_string()))?;
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut stack = vec![root];

    while let Some(employee) = stack.pop() {
        if !seen.insert(employee.username.clone()) {
            warn!(
                "event=supervisor_cycle module=service status=error username={}",
                employee.username
            );
            continue;
        }
        let mut reports = users.direct_reports(&employee.username)?;
        ordered.push(employee);
        // Reverse so the first direct report is visited first.
        reports.reverse();
        stack.extend(reports);
    }
    Ok(ordered)
}
