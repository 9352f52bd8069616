//! Project search.

pub mod fts;
