//! Shared-filesystem backend.
//!
//! Each instance is rooted at the directory named by the `location` setting
//! and accesses it through a capability-scoped [`Dir`]. Verification writes a
//! JSON canary under `tests-{token}/` that every node must be able to read
//! back before adding its own marker.

use crate::repositories::{
    domain::{DiscoveryNode, RepositoryDescriptor, RepositoryDomainError, VerificationToken},
    ports::{Repository, RepositoryBackendError, RepositoryBackendResult, RepositoryFactory},
};
use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};

const LOCATION_SETTING: &str = "location";
const CANARY_FILE: &str = "master.dat";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct CanaryDocument {
    token: String,
    digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node: Option<String>,
}

impl CanaryDocument {
    fn new(token: &VerificationToken, node: Option<&DiscoveryNode>) -> Self {
        Self {
            token: token.as_str().to_owned(),
            digest: digest(token),
            node: node.map(|member| member.id().as_str().to_owned()),
        }
    }
}

fn digest(token: &VerificationToken) -> String {
    Sha256::digest(token.as_str().as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

fn session_dir(token: &VerificationToken) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("tests-{token}"))
}

async fn run_blocking<F, T>(operation: F) -> RepositoryBackendResult<T>
where
    F: FnOnce() -> RepositoryBackendResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(RepositoryBackendError::runtime)?
}

/// Repository stored in a directory reachable from every node.
#[derive(Debug)]
pub struct FsRepository {
    descriptor: RepositoryDescriptor,
    location: Utf8PathBuf,
    readonly: bool,
    root: RwLock<Option<Arc<Dir>>>,
}

impl FsRepository {
    fn new(descriptor: RepositoryDescriptor) -> RepositoryBackendResult<Self> {
        let settings = descriptor.settings();
        let location = settings
            .get(LOCATION_SETTING)
            .map(str::trim)
            .filter(|location| !location.is_empty())
            .map(Utf8PathBuf::from)
            .ok_or_else(|| RepositoryDomainError::InvalidSetting {
                key: LOCATION_SETTING.to_owned(),
                value: settings.get(LOCATION_SETTING).unwrap_or_default().to_owned(),
                expected: "a non-empty directory path",
            })?;
        let readonly = settings.get_bool("readonly", false)?;
        Ok(Self {
            descriptor,
            location,
            readonly,
            root: RwLock::new(None),
        })
    }

    /// Returns the configured root directory.
    #[must_use]
    pub fn location(&self) -> &Utf8Path {
        &self.location
    }

    fn root(&self) -> RepositoryBackendResult<Arc<Dir>> {
        self.root
            .read()
            .map_err(|err| RepositoryBackendError::runtime(std::io::Error::other(err.to_string())))?
            .clone()
            .ok_or(RepositoryBackendError::Closed)
    }
}

#[async_trait]
impl Repository for FsRepository {
    fn metadata(&self) -> &RepositoryDescriptor {
        &self.descriptor
    }

    async fn start(&self) -> RepositoryBackendResult<()> {
        let location = self.location.clone();
        let readonly = self.readonly;
        let dir = run_blocking(move || {
            if !readonly {
                Dir::create_ambient_dir_all(&location, ambient_authority())?;
            }
            Ok(Dir::open_ambient_dir(&location, ambient_authority())?)
        })
        .await
        .map_err(|err| match err {
            RepositoryBackendError::Io(io) => RepositoryBackendError::Unavailable(format!(
                "cannot open location [{}]: {io}",
                self.location
            )),
            other => other,
        })?;

        let mut root = self.root.write().map_err(|err| {
            RepositoryBackendError::runtime(std::io::Error::other(err.to_string()))
        })?;
        *root = Some(Arc::new(dir));
        Ok(())
    }

    async fn close(&self) -> RepositoryBackendResult<()> {
        let mut root = self.root.write().map_err(|err| {
            RepositoryBackendError::runtime(std::io::Error::other(err.to_string()))
        })?;
        drop(root.take());
        Ok(())
    }

    async fn start_verification(&self) -> RepositoryBackendResult<Option<VerificationToken>> {
        let root = self.root()?;
        if self.readonly {
            return Ok(None);
        }
        let token = VerificationToken::generate();
        let document = serde_json::to_vec(&CanaryDocument::new(&token, None))
            .map_err(RepositoryBackendError::runtime)?;
        let session = session_dir(&token);
        run_blocking(move || {
            root.create_dir(&session)?;
            root.write(session.join(CANARY_FILE), document)?;
            Ok(())
        })
        .await?;
        Ok(Some(token))
    }

    async fn end_verification(&self, token: &VerificationToken) -> RepositoryBackendResult<()> {
        let root = self.root()?;
        let session = session_dir(token);
        run_blocking(move || Ok(root.remove_dir_all(&session)?)).await
    }

    async fn verify(
        &self,
        token: &VerificationToken,
        node: &DiscoveryNode,
    ) -> RepositoryBackendResult<()> {
        let root = self.root()?;
        let expected = CanaryDocument::new(token, None);
        let marker = serde_json::to_vec(&CanaryDocument::new(token, Some(node)))
            .map_err(RepositoryBackendError::runtime)?;
        let session = session_dir(token);
        let node_id = node.id().clone();
        let location = self.location.clone();

        run_blocking(move || {
            let canary = root.read(session.join(CANARY_FILE)).map_err(|err| {
                RepositoryBackendError::VerificationFailed(format!(
                    "store location [{location}] is not shared between node [{node_id}] and the \
                     master node: {err}"
                ))
            })?;
            let found: CanaryDocument = serde_json::from_slice(&canary).map_err(|err| {
                RepositoryBackendError::VerificationFailed(format!("corrupt canary: {err}"))
            })?;
            if found != expected {
                return Err(RepositoryBackendError::VerificationFailed(format!(
                    "canary in [{location}] does not match the verification token"
                )));
            }
            root.write(session.join(format!("data-{node_id}.dat")), marker)?;
            Ok(())
        })
        .await
    }
}

/// Factory for [`FsRepository`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRepositoryFactory;

impl FsRepositoryFactory {
    /// Backend type name conventionally registered for this factory.
    pub const TYPE: &'static str = "fs";
}

impl RepositoryFactory for FsRepositoryFactory {
    fn create(
        &self,
        descriptor: &RepositoryDescriptor,
    ) -> RepositoryBackendResult<Arc<dyn Repository>> {
        Ok(Arc::new(FsRepository::new(descriptor.clone())?))
    }
}
