//! Integration test suite for parallx.
//!
//! These tests exercise the full pipeline from plan document to
//! execution report: parsing, phase-barrier scheduling, recursive
//! expansion, failure policy, and result aggregation.
//!
//! # Test Categories
//!
//! - `phase_barrier`: Barrier ordering and concurrency correctness
//! - `recursion`: Sub-plan expansion, depth bounds, failure folding
//! - `conflict_detection`: Pre-flight and post-hoc claim overlap scans
//! - `failure_policy`: Blocking vs non-blocking failure handling
//!
//! # CI Compatibility
//!
//! These tests drive the scheduler through a stub runner and never
//! spawn worker processes, making them safe to run in CI environments.


mod conflict_detection;
mod failure_policy;
mod phase_barrier;
mod recursion;
