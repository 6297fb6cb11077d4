//! Integration test suite for casewatch.
//!
//! These tests drive the pollers, the store and the action triggers against
//! an in-memory case service. No network access is needed.
//!
//! # Test Categories
//!
//! - `scenarios`: Polling lifecycles driven on paused tokio time
//! - `downloads`: Archive downloads written to temporary directories

mod fixtures;

mod downloads;
mod scenarios;
