//! Adapter implementations for repository registry ports.

pub mod memory;

mod fs;
mod usage;

pub use fs::{FsRepository, FsRepositoryFactory};
pub use usage::InFlightOperationsUsage;
