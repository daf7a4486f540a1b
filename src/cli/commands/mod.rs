//! CLI command implementations

pub mod check;
pub mod completions;
pub mod list;
pub mod run;
pub mod summary;
