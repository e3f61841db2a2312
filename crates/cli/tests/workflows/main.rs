//! End-to-end workflow tests: hooks, restores, retention and concurrency

#[macro_use]
#[path = "../common/mod.rs"]
mod common;

mod concurrency;
mod edge_cases;
mod hook_lifecycle;
mod restore_rewind;
mod retention;
