mod common;

use common::{fixture, Fixture};
use pjtk_core::model::employee::{Employee, Role, User};
use pjtk_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use pjtk_core::service::employee_service::EmployeeService;
use pjtk_core::ServiceError;
use pretty_assertions::assert_eq;

/// Adds `carl` under alice (after bob) and `erin` under bob.
fn staffed() -> Fixture {
    let fx = fixture();
    let users = SqliteUserRepository::new(&fx.conn);
    for (username, supervisor) in [("carl", "alice"), ("erin", "bob")] {
        users
            .create_user(&User::new(username, username, "Staff"))
            .unwrap();
        users
            .upsert_employee(&Employee {
                username: username.to_string(),
                role: Role::Employee,
                supervisor: Some(supervisor.to_string()),
            })
            .unwrap();
    }
    fx
}

fn names(employees: &[Employee]) -> Vec<&str> {
    employees.iter().map(|e| e.username.as_str()).collect()
}

#[test]
fn supervisor_chain_starts_with_the_employee() {
    let fx = staffed();
    let service = EmployeeService::with_connection(&fx.conn);

    let chain = service.get_supervisors("erin").unwrap();
    assert_eq!(names(&chain), vec!["erin", "bob", "alice", "boss"]);

    let chain = service.get_supervisors("boss").unwrap();
    assert_eq!(names(&chain), vec!["boss"]);
}

#[test]
fn minions_are_listed_in_pre_order() {
    let fx = staffed();
    let service = EmployeeService::with_connection(&fx.conn);

    let minions = service.get_minions("boss").unwrap();
    assert_eq!(names(&minions), vec!["boss", "alice", "bob", "erin", "carl"]);

    let minions = service.get_minions("bob").unwrap();
    assert_eq!(names(&minions), vec!["bob", "erin"]);

    let minions = service.get_minions("dana").unwrap();
    assert_eq!(names(&minions), vec!["dana"]);
}

#[test]
fn supervisor_cycles_are_cut_at_the_first_repeat() {
    let fx = staffed();
    fx.conn
        .execute(
            "UPDATE employees SET supervisor = 'bob' WHERE username = 'boss';",
            [],
        )
        .unwrap();
    let service = EmployeeService::with_connection(&fx.conn);

    let chain = service.get_supervisors("bob").unwrap();
    assert_eq!(names(&chain), vec!["bob", "alice", "boss"]);

    let minions = service.get_minions("boss").unwrap();
    assert_eq!(names(&minions), vec!["boss", "alice", "bob", "erin", "carl"]);
}

#[test]
fn unknown_employee_is_reported() {
    let fx = fixture();
    let service = EmployeeService::with_connection(&fx.conn);

    assert!(matches!(
        service.get_supervisors("nobody"),
        Err(ServiceError::EmployeeNotFound(name)) if name == "nobody"
    ));
    assert!(matches!(
        service.get_minions("nobody"),
        Err(ServiceError::EmployeeNotFound(_))
    ));
}
