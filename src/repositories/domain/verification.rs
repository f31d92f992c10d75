//! Verification tokens, session phases and aggregate failures.

use super::{NodeId, RepositoryName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Single-use opaque value binding probe rounds to one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerificationToken(String);

impl VerificationToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wraps an existing token value.
    #[must_use]
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Phase of a per-repository verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationPhase {
    /// No session is running.
    Idle,
    /// The local instance issued a token.
    TokenIssued,
    /// Probes were sent and responses are being collected.
    AwaitingResponses,
    /// Every node verified the repository.
    Success,
    /// At least one node failed or did not answer.
    PartialFailure,
}

impl VerificationPhase {
    /// Returns the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::TokenIssued => "token_issued",
            Self::AwaitingResponses => "awaiting_responses",
            Self::Success => "success",
            Self::PartialFailure => "partial_failure",
        }
    }

    /// Returns whether moving to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Idle, Self::TokenIssued)
                | (Self::TokenIssued, Self::AwaitingResponses | Self::Success)
                | (Self::AwaitingResponses, Self::Success | Self::PartialFailure)
                | (Self::Success | Self::PartialFailure, Self::Idle)
        )
    }
}

impl fmt::Display for VerificationPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A node that failed to verify a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    node: NodeId,
    reason: String,
}

impl NodeFailure {
    /// Creates a node failure record.
    #[must_use]
    pub fn new(node: NodeId, reason: impl Into<String>) -> Self {
        Self {
            node,
            reason: reason.into(),
        }
    }

    /// Returns the failing node.
    #[must_use]
    pub const fn node(&self) -> &NodeId {
        &self.node
    }

    /// Returns the failure description.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "[{}] {}", self.node, self.reason)
    }
}

/// Aggregate result of a failed verification round.
///
/// A cleanup failure from `end_verification` is attached as secondary detail
/// and never replaces the per-node failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailure {
    repository: RepositoryName,
    failures: Vec<NodeFailure>,
    cleanup_failure: Option<String>,
}

impl VerificationFailure {
    /// Creates an aggregate failure for `repository`.
    #[must_use]
    pub const fn new(repository: RepositoryName, failures: Vec<NodeFailure>) -> Self {
        Self {
            repository,
            failures,
            cleanup_failure: None,
        }
    }

    /// Attaches a secondary cleanup failure.
    #[must_use]
    pub fn with_cleanup_failure(mut self, detail: impl Into<String>) -> Self {
        self.cleanup_failure = Some(detail.into());
        self
    }

    /// Returns the repository that failed verification.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the per-node failures.
    #[must_use]
    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    /// Returns the identifiers of the failed nodes.
    #[must_use]
    pub fn failed_nodes(&self) -> Vec<&NodeId> {
        self.failures.iter().map(NodeFailure::node).collect()
    }

    /// Returns the suppressed cleanup failure, if any.
    #[must_use]
    pub fn cleanup_failure(&self) -> Option<&str> {
        self.cleanup_failure.as_deref()
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "[{}] verification failed on {} node(s)",
            self.repository,
            self.failures.len()
        )?;
        for failure in &self.failures {
            write!(formatter, "; {failure}")?;
        }
        if let Some(cleanup) = &self.cleanup_failure {
            write!(formatter, " (suppressed cleanup failure: {cleanup})")?;
        }
        Ok(())
    }
}

/// Successful verification result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    repository: RepositoryName,
    verified_nodes: Vec<NodeId>,
    completed_at: DateTime<Utc>,
}

impl VerificationReport {
    /// Creates a verification report.
    #[must_use]
    pub const fn new(
        repository: RepositoryName,
        verified_nodes: Vec<NodeId>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            repository,
            verified_nodes,
            completed_at,
        }
    }

    /// Returns the verified repository.
    #[must_use]
    pub const fn repository(&self) -> &RepositoryName {
        &self.repository
    }

    /// Returns the nodes that verified the repository.
    ///
    /// Empty when the backend declined verification.
    #[must_use]
    pub fn verified_nodes(&self) -> &[NodeId] {
        &self.verified_nodes
    }

    /// Returns when verification completed.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }
}
