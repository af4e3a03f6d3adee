//! Conditional-write metadata store abstraction.
//!
//! This is the seam between Strata's logic and whatever durable store backs
//! a deployment (DynamoDB conditional puts, GCS generation preconditions,
//! S3 `If-Match`). The contract is deliberately small: opaque version
//! tokens, and writes that either apply or report the current version.
//!
//! Precondition failure is a normal result, never an `Err`. Callers decide
//! whether a lost race is fatal (state-store semantic conflicts) or
//! retryable (version contention).

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Precondition for a conditional write.
///
/// Version tokens are opaque strings; backends interpret them according to
/// their own semantics (numeric generation, ETag, version id).
#[derive(Debug, Clone)]
pub enum WritePrecondition {
    /// Write only if the key does not exist.
    DoesNotExist,
    /// Write only if the key's current version matches the token.
    MatchesVersion(String),
    /// Write unconditionally.
    None,
}

/// Result of a conditional write.
#[derive(Debug, Clone)]
pub enum WriteResult {
    /// The write was applied; carries the new version token.
    Success {
        /// Version token after the write.
        version: String,
    },
    /// The precondition did not hold; nothing was written.
    PreconditionFailed {
        /// The version that caused the failure ("0" if the key is absent).
        current_version: String,
    },
}

impl WriteResult {
    /// Returns true if the write was applied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A durable key/value store with conditional writes.
///
/// All Strata persistence (state-store snapshots, batcher state, and in
/// tests the sorted-file payloads) goes through this trait, so every
/// component is testable against [`InMemoryMetadataStore`].
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    /// Reads a value with its current version token.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<(Bytes, String)>>;

    /// Writes a value if the precondition holds.
    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult>;
}

/// In-memory metadata store for tests and local runs.
///
/// Versions are numeric counters rendered as strings, matching the way
/// object stores expose generations. Thread-safe via `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    value: Bytes,
    version: u64,
}

impl InMemoryMetadataStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, key: &str) -> Result<Option<(Bytes, String)>> {
        let entries = self.entries.read().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;
        Ok(entries
            .get(key)
            .map(|e| (e.value.clone(), e.version.to_string())))
    }

    async fn put(
        &self,
        key: &str,
        value: Bytes,
        precondition: WritePrecondition,
    ) -> Result<WriteResult> {
        let mut entries = self.entries.write().map_err(|_| Error::Internal {
            message: "lock poisoned".into(),
        })?;

        let current = entries.get(key);
        match precondition {
            WritePrecondition::DoesNotExist => {
                if let Some(existing) = current {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: existing.version.to_string(),
                    });
                }
            }
            WritePrecondition::MatchesVersion(expected) => match current {
                Some(existing) if existing.version.to_string() != expected => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: existing.version.to_string(),
                    });
                }
                None => {
                    return Ok(WriteResult::PreconditionFailed {
                        current_version: "0".to_string(),
                    });
                }
                _ => {}
            },
            WritePrecondition::None => {}
        }

        let next_version = current.map_or(1, |e| e.version + 1);
        entries.insert(
            key.to_string(),
            StoredValue {
                value,
                version: next_version,
            },
        );
        drop(entries);

        Ok(WriteResult::Success {
            version: next_version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_missing_key_returns_none() {
        let store = InMemoryMetadataStore::new();
        assert!(store.get("missing").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let store = InMemoryMetadataStore::new();
        let result = store
            .put("k", Bytes::from("v1"), WritePrecondition::None)
            .await
            .expect("put");
        assert!(result.is_success());

        let (value, version) = store.get("k").await.expect("get").expect("exists");
        assert_eq!(value, Bytes::from("v1"));
        assert_eq!(version, "1");
    }

    #[tokio::test]
    async fn does_not_exist_precondition_blocks_overwrite() {
        let store = InMemoryMetadataStore::new();
        store
            .put("k", Bytes::from("v1"), WritePrecondition::DoesNotExist)
            .await
            .expect("put");

        let result = store
            .put("k", Bytes::from("v2"), WritePrecondition::DoesNotExist)
            .await
            .expect("put");
        assert!(matches!(result, WriteResult::PreconditionFailed { .. }));

        let (value, _) = store.get("k").await.expect("get").expect("exists");
        assert_eq!(value, Bytes::from("v1"), "losing write must not apply");
    }

    #[tokio::test]
    async fn matches_version_detects_stale_writers() {
        let store = InMemoryMetadataStore::new();
        let WriteResult::Success { version } = store
            .put("k", Bytes::from("v1"), WritePrecondition::None)
            .await
            .expect("put")
        else {
            panic!("expected success");
        };

        // Winner advances the version.
        let result = store
            .put(
                "k",
                Bytes::from("v2"),
                WritePrecondition::MatchesVersion(version.clone()),
            )
            .await
            .expect("put");
        assert!(result.is_success());

        // Loser with the stale token is told the current version.
        let result = store
            .put(
                "k",
                Bytes::from("v3"),
                WritePrecondition::MatchesVersion(version),
            )
            .await
            .expect("put");
        let WriteResult::PreconditionFailed { current_version } = result else {
            panic!("expected precondition failure");
        };
        assert_eq!(current_version, "2");
    }

    #[tokio::test]
    async fn matches_version_on_missing_key_fails() {
        let store = InMemoryMetadataStore::new();
        let result = store
            .put(
                "k",
                Bytes::from("v"),
                WritePrecondition::MatchesVersion("1".into()),
            )
            .await
            .expect("put");
        assert!(matches!(
            result,
            WriteResult::PreconditionFailed { current_version } if current_version == "0"
        ));
    }
}
