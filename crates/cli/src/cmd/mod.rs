//! CLI command implementations

pub mod clean;
pub mod config;
pub mod diff;
pub mod hook;
pub mod list;
pub mod now;
pub mod restore;
pub mod search;
pub mod status;
