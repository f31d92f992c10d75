//! Step definitions for repository registration scenarios.

pub mod world;
