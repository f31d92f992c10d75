//! Port contracts for repository registry orchestration.

mod backend;
mod factory;
mod metadata;
mod transport;
mod usage;

pub use backend::{Repository, RepositoryBackendError, RepositoryBackendResult};
pub use factory::RepositoryFactory;
pub use metadata::{
    AckPolicy, MetadataStore, MetadataStoreError, MetadataUpdate, ProposalAck, ProposeError,
    StateDelivery, StateSubscription,
};
pub use transport::{ProbeError, VerificationTransport, VerifyNodeRequest};
pub use usage::RepositoryUsage;
