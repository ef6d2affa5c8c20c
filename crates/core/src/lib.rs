//! Core types and utilities for buildcache-setup
//!
//! This crate holds everything the setup step needs that is independent of
//! where releases are hosted or where the object cache lives:
//! - Error types shared by the fatal stages of the pipeline
//! - [`JobContext`], an explicit view of the CI job environment
//! - [`ActionInputs`], the user-facing step inputs
//! - Version resolution and installation of the accelerator binary

mod error;

pub mod context;
pub mod inputs;
pub mod platform;
pub mod tools;

pub use context::JobContext;
pub use error::{Error, Result};
pub use inputs::ActionInputs;
pub use platform::{Arch, Os, Platform};
