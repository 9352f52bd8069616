#![allow(dead_code)]

use chrono::NaiveDate;
use pjtk_core::geo::Envelope;
use pjtk_core::model::employee::{Actor, Employee, Role, User};
use pjtk_core::model::project::{project_year, Project, ProjectDraft};
use pjtk_core::repo::lookup_repo::{LookupRepository, SqliteLookupRepository};
use pjtk_core::repo::user_repo::{SqliteUserRepository, UserRepository};
use pjtk_core::service::milestone_service::MilestoneService;
use pjtk_core::service::project_service::ProjectService;
use pjtk_core::open_db_in_memory;
use rusqlite::Connection;

pub const HURON_ENVELOPE: Envelope = Envelope {
    min_lon: -84.5,
    min_lat: 43.0,
    max_lon: -79.5,
    max_lat: 46.5,
};

/// A migrated database with staff, lookups and the default milestones.
///
/// Staff: `boss` (manager) supervises `alice`, who supervises `bob`;
/// `dana` is a DBA with no supervisor.
pub struct Fixture {
    pub conn: Connection,
    pub huron: i64,
    pub erie: i64,
    pub index_netting: i64,
    pub creel: i64,
    pub fn028: i64,
}

pub fn fixture() -> Fixture {
    let conn = open_db_in_memory().unwrap();

    let users = SqliteUserRepository::new(&conn);
    for (username, first, last, role, supervisor) in [
        ("boss", "Marge", "Boss", Role::Manager, None),
        ("alice", "Alice", "Angler", Role::Employee, Some("boss")),
        ("bob", "Bob", "Biologist", Role::Employee, Some("alice")),
        ("dana", "Dana", "Admin", Role::Dba, None),
    ] {
        users.create_user(&User::new(username, first, last)).unwrap();
        users
            .upsert_employee(&Employee {
                username: username.to_string(),
                role,
                supervisor: supervisor.map(str::to_string),
            })
            .unwrap();
    }

    let lookups = SqliteLookupRepository::new(&conn);
    let huron = lookups
        .create_lake("HU", "Lake Huron", Some(HURON_ENVELOPE))
        .unwrap();
    let erie = lookups.create_lake("ER", "Lake Erie", None).unwrap();
    let index_netting = lookups
        .create_project_type("Offshore Index", "multi-lake", true)
        .unwrap();
    let creel = lookups
        .create_project_type("Creel Survey", "single-lake", true)
        .unwrap();
    let fn028 = lookups
        .create_protocol("Fish Community Index Gillnetting", "FWIN")
        .unwrap();

    MilestoneService::with_connection(&conn)
        .install_default_milestones()
        .unwrap();

    Fixture {
        conn,
        huron,
        erie,
        index_netting,
        creel,
        fn028,
    }
}

pub fn manager() -> Actor {
    Actor::new("boss", Role::Manager)
}

pub fn alice() -> Actor {
    Actor::new("alice", Role::Employee)
}

pub fn bob() -> Actor {
    Actor::new("bob", Role::Employee)
}

pub fn dba() -> Actor {
    Actor::new("dana", Role::Dba)
}

impl Fixture {
    /// Index netting on Lake Huron, led by alice, fielded in the code's year.
    pub fn draft(&self, prj_cd: &str, prj_nm: &str) -> ProjectDraft {
        let year = project_year(prj_cd).unwrap();
        ProjectDraft {
            prj_cd: prj_cd.to_string(),
            prj_nm: prj_nm.to_string(),
            prj_date0: NaiveDate::from_ymd_opt(year, 5, 1).unwrap(),
            prj_date1: NaiveDate::from_ymd_opt(year, 9, 30).unwrap(),
            prj_ldr: "alice".to_string(),
            field_ldr: None,
            owner: None,
            dba: None,
            project_type_id: self.index_netting,
            protocol_id: Some(self.fn028),
            lake_id: self.huron,
            abstract_text: String::new(),
            comment: String::new(),
            risk: String::new(),
            tags: Vec::new(),
            project_team: Vec::new(),
        }
    }

    pub fn create(&self, actor: &Actor, prj_cd: &str, prj_nm: &str) -> Project {
        ProjectService::with_connection(&self.conn)
            .create_project(actor, &self.draft(prj_cd, prj_nm))
            .unwrap()
    }

    pub fn create_approved(&self, prj_cd: &str, prj_nm: &str) -> Project {
        let project = self.create(&alice(), prj_cd, prj_nm);
        MilestoneService::with_connection(&self.conn)
            .approve(&manager(), &project.slug)
            .unwrap();
        project
    }
}
