//! Tripwire: build event log, BLAKE3 artifact hashing, drift detection.

pub mod drift;
pub mod eventlog;
pub mod hasher;
