//! Common utilities for aoa-probe
//!
//! This crate provides the pieces shared by every crate in the workspace:
//! the common error type, logging setup, and helpers for tests that wait on
//! work happening in other threads.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;
