//! Benchify workspace-level test utilities.
//!
//! This crate exists solely to support workspace-level integration tests,
//! particularly the BDD/cucumber tests in `tests/cucumber.rs`.
//!
//! The actual benchify functionality is in the workspace member crates:
//! - `benchify-types`: Config and report contracts, JSON schemas
//! - `benchify-error`: Error taxonomy
//! - `benchify-config`: Loading, validation and the starter template
//! - `benchify-domain`: Interpolation, statistics and stopping rules
//! - `benchify-adapters`: Process launching
//! - `benchify-fake`: Scripted process runner for tests
//! - `benchify-app`: Session orchestration and rendering
//! - `benchify` (benchify-cli): CLI interface
