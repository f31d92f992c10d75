//! Timeouts and retry limits for registry orchestration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Registry configuration.
///
/// Durations are expressed in milliseconds when deserialized.
///
/// # Examples
///
/// ```
/// use palladio::repositories::services::RegistryConfig;
/// use std::time::Duration;
///
/// let config = RegistryConfig::default();
/// assert_eq!(config.verification_timeout, Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound for constructing and starting one instance.
    #[serde(rename = "construction_timeout_ms", with = "millis")]
    pub construction_timeout: Duration,
    /// Upper bound for closing one instance.
    #[serde(rename = "close_timeout_ms", with = "millis")]
    pub close_timeout: Duration,
    /// Upper bound for collecting all probe responses.
    #[serde(rename = "verification_timeout_ms", with = "millis")]
    pub verification_timeout: Duration,
    /// Upper bound for node acknowledgements of a committed change.
    #[serde(rename = "ack_timeout_ms", with = "millis")]
    pub ack_timeout: Duration,
    /// How often a stale proposal is recomputed before giving up.
    pub max_proposal_retries: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            construction_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
            verification_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(30),
            max_proposal_retries: 3,
        }
    }
}

impl RegistryConfig {
    /// Short timeouts suited to in-process clusters and tests.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            construction_timeout: Duration::from_millis(500),
            close_timeout: Duration::from_millis(500),
            verification_timeout: Duration::from_millis(500),
            ack_timeout: Duration::from_secs(2),
            max_proposal_retries: 3,
        }
    }

    /// Checks that every timeout is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRegistryConfig`] naming the first zero timeout.
    pub fn validate(&self) -> Result<(), InvalidRegistryConfig> {
        let timeouts = [
            ("construction_timeout_ms", self.construction_timeout),
            ("close_timeout_ms", self.close_timeout),
            ("verification_timeout_ms", self.verification_timeout),
            ("ack_timeout_ms", self.ack_timeout),
        ];
        match timeouts.iter().find(|(_, timeout)| timeout.is_zero()) {
            Some((field, _)) => Err(InvalidRegistryConfig(*field)),
            None => Ok(()),
        }
    }
}

/// A configuration timeout was zero.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("registry setting {0} must be greater than zero")]
pub struct InvalidRegistryConfig(pub &'static str);

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(
        value: &Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
