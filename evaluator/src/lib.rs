//! Typed configuration, locked JSON persistence and the record stores of the hpc-eval tool.

pub mod commands;
pub mod components;
pub mod config;
pub mod store;
pub mod sync;
