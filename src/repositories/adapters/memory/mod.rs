//! In-memory adapters for simulated multi-node clusters.

mod metadata;
mod repository;
mod transport;

pub use metadata::InMemoryMetadataStore;
pub use repository::{
    BlobStoreCounters, InMemoryBlobStore, InMemoryRepository, InMemoryRepositoryFactory,
};
pub use transport::InMemoryVerificationTransport;
