//! kiln: Rust-native build orchestration.
//!
//! Declarative targets in kiln.yaml, a timestamp-driven DAG, OS × arch build
//! matrices, merged coverage reports, and built-in Go and PHP recipes.

pub mod cli;
pub mod core;
pub mod runner;
pub mod tripwire;
