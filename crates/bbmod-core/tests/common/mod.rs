//! Shared test infrastructure for bbmod-core integration tests.
//!
//! Import from integration test files with:
//! ```ignore
//! mod common;
//! use common::fixtures;
//! ```

#![allow(dead_code)]

pub mod fixtures;
