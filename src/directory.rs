//! In-memory relay registry.
//!
//! Grows only, lives for the process, never persisted. Registration
//! validates the advertised key format and rejects duplicate ids; the
//! check and the insert happen under one write lock so two concurrent
//! registrations of the same id cannot both succeed.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crypto;
use crate::error::RegistryError;

/// A relay as the directory advertises it: id plus exported public key.
/// Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayIdentity {
    #[serde(rename = "nodeId")]
    pub id: u32,
    #[serde(rename = "pubKey")]
    pub public_key: String,
}

#[derive(Default)]
pub struct Directory {
    nodes: RwLock<BTreeMap<u32, RelayIdentity>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relay. The directory only cares about the key's
    /// *format*; it never generates or uses keys itself.
    pub fn register(&self, id: u32, public_key: &str) -> Result<(), RegistryError> {
        crypto::import_public(public_key)?;

        let mut nodes = self.nodes.write();
        if nodes.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        nodes.insert(
            id,
            RelayIdentity {
                id,
                public_key: public_key.to_string(),
            },
        );
        info!(relay = id, "relay registered");
        Ok(())
    }

    /// Snapshot of every registered relay. No pagination, no filtering.
    pub fn list(&self) -> Vec<RelayIdentity> {
        self.nodes.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Liveness probe.
    pub fn status(&self) -> &'static str {
        "live"
    }
}
