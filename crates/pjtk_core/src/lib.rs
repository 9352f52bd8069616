//! Core domain logic for the fisheries project tracker.
//! This crate is the single source of truth for business invariants.

pub mod api;
pub mod config;
pub mod db;
pub mod geo;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use config::{AppConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::employee::{Actor, Employee, Role, User};
pub use model::project::{Project, ProjectDraft, ProjectId, ProjectValidationError};
pub use repo::filter::ProjectFilter;
pub use repo::{RepoError, RepoResult};
pub use search::fts::{search_projects, SearchError, SearchHit, SearchQuery, SearchResult};
pub use service::milestone_service::MilestoneService;
pub use service::project_service::ProjectService;
pub use service::report_service::ReportService;
pub use service::sister_service::SisterService;
pub use service::spatial_service::SpatialService;
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
