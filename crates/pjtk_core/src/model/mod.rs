//! Domain records for projects and everything hanging off them.
//!
//! # Responsibility
//! - Define the data structures shared by repositories, services and the API.
//! - Hold validation that needs no storage access.
//!
//! # Invariants
//! - Projects, families, reports and sample points use stable UUIDs.
//! - Reference tables and milestones use integer ids.

pub mod employee;
pub mod lookup;
pub mod milestone;
pub mod notice;
pub mod project;
pub mod report;
pub mod spatial;
