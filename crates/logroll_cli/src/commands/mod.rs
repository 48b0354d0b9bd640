//! CLI command implementations.

pub mod cat;
pub mod list;
pub mod pipe;
pub mod prune;
