//! Palladio: cluster-wide registry for pluggable storage repositories.
//!
//! This crate keeps every node's live repository instances consistent with a
//! single, consensus-replicated description of which repositories exist and
//! how they are configured. It validates register and unregister requests,
//! refuses changes that would disturb in-flight snapshot or restore work, and
//! verifies new repositories from every cluster member.
//!
//! # Architecture
//!
//! Palladio follows hexagonal architecture principles:
//!
//! - **Domain**: Pure values with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for backends, metadata and transport
//! - **Adapters**: In-memory and filesystem implementations of the ports
//! - **Services**: Reconciliation, mutation and verification orchestration
//!
//! # Modules
//!
//! - [`repositories`]: Repository registry, reconciliation and verification

pub mod repositories;
