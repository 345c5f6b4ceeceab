//! Centralized constants for the memhpa project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod api;
pub mod autoscaler;
pub mod paths;
pub mod state;
