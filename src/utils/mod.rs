//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `peril` application.
//!
//! It centralizes the error types shared between layers and the logging
//! bootstrap used by every binary entry point.

pub mod error;
pub mod logging;
