//! Core build logic: types, parsing, graph construction, resolution, planning, execution.

pub mod error;
pub mod executor;
pub mod graph;
pub mod matrix;
pub mod parser;
pub mod planner;
pub mod recipe;
pub mod report;
pub mod resolver;
pub mod state;
pub mod types;
