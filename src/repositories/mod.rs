//! Repository registry, reconciliation and verification for Palladio.
//!
//! Cluster metadata holds the desired set of repository descriptors. Each
//! master- or data-capable node runs one applier that reconciles its live
//! instances against every committed snapshot, while the mutation service
//! proposes validated changes and the verification service checks a
//! repository from every member. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
