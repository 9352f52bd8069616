//! User and employee persistence.
//!
//! # Invariants
//! - Employees are listed in creation order so traversals are deterministic.

use super::{bool_to_int, int_to_bool, is_unique_violation, RepoError, RepoResult};
use crate::model::employee::{Employee, Role, User};
use rusqlite::{params, Connection, OptionalExtension, Row};

const USER_SELECT_SQL: &str = "SELECT
    u.username AS username,
    u.first_name AS first_name,
    u.last_name AS last_name,
    u.email AS email,
    u.is_active AS is_active,
    u.is_superuser AS is_superuser
FROM users u";

pub trait UserRepository {
    fn create_user(&self, user: &User) -> RepoResult<()>;
    fn get_user(&self, username: &str) -> RepoResult<Option<User>>;
    /// Users leading at least one project.
    fn project_leads(&self) -> RepoResult<Vec<User>>;
    fn upsert_employee(&self, employee: &Employee) -> RepoResult<()>;
    fn get_employee(&self, username: &str) -> RepoResult<Option<Employee>>;
    /// Employees whose supervisor is `username`.
    fn direct_reports(&self, username: &str) -> RepoResult<Vec<Employee>>;
    /// Employees holding `role`.
    fn employees_with_role(&self, role: Role) -> RepoResult<Vec<Employee>>;
}

pub struct SqliteUserRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_employees(&self, sql: &str, param: &str) -> RepoResult<Vec<Employee>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([param])?;
        let mut employees = Vec::new();
        while let Some(row) = rows.next()? {
            employees.push(parse_employee_row(row)?);
        }
        Ok(employees)
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, user: &User) -> RepoResult<()> {
        let result = self.conn.execute(
            "INSERT INTO users (username, first_name, last_name, email, is_active, is_superuser)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                user.username,
                user.first_name,
                user.last_name,
                user.email,
                bool_to_int(user.is_active),
                bool_to_int(user.is_superuser),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Conflict(format!(
                "user `{}` already exists",
                user.username
            ))),
            Err(err) => Err(err.into()),
        }
    }

    fn get_user(&self, username: &str) -> RepoResult<Option<User>> {
        self.conn
            .query_row(
                &format!("{USER_SELECT_SQL} WHERE u.username = ?1;"),
                [username],
                |row| Ok(parse_user_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn project_leads(&self) -> RepoResult<Vec<User>> {
        let mut stmt = self.conn.prepare(&format!(
            "{USER_SELECT_SQL}
             WHERE EXISTS (SELECT 1 FROM projects p WHERE p.prj_ldr = u.username)
             ORDER BY u.last_name ASC, u.first_name ASC, u.username ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }
        Ok(users)
    }

    fn upsert_employee(&self, employee: &Employee) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO employees (username, role, supervisor)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(username) DO UPDATE SET
                role = excluded.role,
                supervisor = excluded.supervisor;",
            params![employee.username, employee.role.as_str(), employee.supervisor],
        )?;
        Ok(())
    }

    fn get_employee(&self, username: &str) -> RepoResult<Option<Employee>> {
        self.conn
            .query_row(
                "SELECT username, role, supervisor FROM employees WHERE username = ?1;",
                [username],
                |row| Ok(parse_employee_row(row)),
            )
            .optional()?
            .transpose()
    }

    fn direct_reports(&self, username: &str) -> RepoResult<Vec<Employee>> {
        self.query_employees(
            "SELECT username, role, supervisor
             FROM employees
             WHERE supervisor = ?1
             ORDER BY id ASC;",
            username,
        )
    }

    fn employees_with_role(&self, role: Role) -> RepoResult<Vec<Employee>> {
        self.query_employees(
            "SELECT username, role, supervisor
             FROM employees
             WHERE role = ?1
             ORDER BY id ASC;",
            role.as_str(),
        )
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    Ok(User {
        username: row.get("username")?,
        first_name: row.get("first_name")?,
        last_name: row.get("last_name")?,
        email: row.get("email")?,
        is_active: int_to_bool(row.get("is_active")?, "users.is_active")?,
        is_superuser: int_to_bool(row.get("is_superuser")?, "users.is_superuser")?,
    })
}

fn parse_employee_row(row: &Row<'_>) -> RepoResult<Employee> {
    let role_text: String = row.get("role")?;
    let role = Role::parse(&role_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid role `{role_text}` in employees.role"))
    })?;
    Ok(Employee {
        username: row.get("username")?,
        role,
        supervisor: row.get("supervisor")?,
    })
}
