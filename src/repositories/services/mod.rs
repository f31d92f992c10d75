//! Orchestration services for repository reconciliation, mutation and
//! verification.

mod config;
mod error;
mod factory;
mod live;
mod mutation;
mod node;
mod reconciler;
mod verification;

pub use config::{InvalidRegistryConfig, RegistryConfig};
pub use error::{RepositoryServiceError, RepositoryServiceResult};
pub use factory::{FactorySet, InstanceFactory, LiveRepository, RepositoryFactories};
pub use live::{LiveRepositories, RepositoryMap};
pub use mutation::{RegisterOutcome, RegisterRepositoryRequest, RepositoryMutationService};
pub use node::{NodeCollaborators, RepositoryNode};
pub use reconciler::RepositoryReconciler;
pub use verification::{
    NodeVerificationHandler, RepositoryVerificationService, VerificationSession,
    VerificationSessions,
};
