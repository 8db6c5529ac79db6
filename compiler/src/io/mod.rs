//! I/O helpers for compiler commands.

pub mod config;
pub mod graph_store;
pub mod workflow_loader;
