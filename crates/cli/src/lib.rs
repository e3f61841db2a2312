//! ckpt CLI library - exports modules for testing

pub mod cleanup;
pub mod cmd;
pub mod confirm;
pub mod context;
pub mod engine;
pub mod hook;
pub mod logging;
pub mod restore;
pub mod util;
