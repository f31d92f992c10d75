//! Opaque backend settings carried by a repository descriptor.

use super::RepositoryDomainError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Ordered key-value settings interpreted only by the backend factory.
///
/// Equality is structural, so two descriptors with the same entries compare
/// equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositorySettings(BTreeMap<String, String>);

impl RepositorySettings {
    /// Creates empty settings.
    #[must_use]
    pub const fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Adds or replaces one entry, returning the updated settings.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parses `key` as a boolean, falling back to `default` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::InvalidSetting`] when the value is not
    /// `true` or `false`.
    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, RepositoryDomainError> {
        let Some(raw) = self.get(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(invalid_setting(key, raw, "a boolean")),
        }
    }

    /// Parses `key` as an unsigned integer.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::InvalidSetting`] when the value is not
    /// a non-negative integer.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, RepositoryDomainError> {
        self.get(key)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|_| invalid_setting(key, raw, "an unsigned integer"))
            })
            .transpose()
    }

    /// Parses `key` as a duration in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryDomainError::InvalidSetting`] when the value is not
    /// a non-negative integer.
    pub fn get_millis(&self, key: &str) -> Result<Option<Duration>, RepositoryDomainError> {
        Ok(self.get_u64(key)?.map(Duration::from_millis))
    }

    /// Returns `true` when no entries are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for RepositorySettings
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

fn invalid_setting(key: &str, value: &str, expected: &'static str) -> RepositoryDomainError {
    RepositoryDomainError::InvalidSetting {
        key: key.to_owned(),
        value: value.to_owned(),
        expected,
    }
}
