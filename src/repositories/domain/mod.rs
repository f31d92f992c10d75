//! Domain model for replicated repository descriptors and verification.
//!
//! The repository domain models descriptor identity and settings, the
//! cluster state that carries them, node roles and the verification
//! handshake vocabulary. Runtime instances and infrastructure remain outside
//! this boundary.

mod cluster;
mod descriptor;
mod error;
mod name;
mod node;
mod pattern;
mod settings;
mod verification;

pub use cluster::{ClusterState, InFlightOperation, OperationKind};
pub use descriptor::{DescriptorChange, DescriptorSnapshot, RepositoryDescriptor};
pub use error::{ParseNodeRoleError, RepositoryDomainError};
pub use name::{RepositoryName, RepositoryType};
pub use node::{DiscoveryNode, NodeId, NodeRole, NodeRoles};
pub use pattern::{MATCH_ALL_PATTERN, NamePattern};
pub use settings::RepositorySettings;
pub use verification::{
    NodeFailure, VerificationFailure, VerificationPhase, VerificationReport, VerificationToken,
};
