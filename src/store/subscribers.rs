//! Broadcast subscriber registry.
//!
//! Identities subscribe on first contact and stay subscribed until a
//! broadcast to them fails with a permanent signal, at which point they are
//! pruned. Pruning persists once per fan-out pass to bound write
//! amplification.

use std::collections::BTreeSet;

use crate::model::Identity;
use crate::storage::Storage;
use crate::transport::{ChatTransport, SendError};

use super::StoreError;

/// Document name under the storage root.
pub const SUBSCRIBERS_DOC: &str = "subscribers";

pub struct SubscriberRegistry<S> {
    storage: S,
    subscribers: BTreeSet<Identity>,
}

impl<S: Storage> SubscriberRegistry<S> {
    /// Load the registry, seeding empty when the document is absent or
    /// malformed. The persisted list may contain duplicates from older
    /// writers; the set collapses them on load.
    pub fn load(storage: S) -> Result<Self, StoreError> {
        let subscribers: BTreeSet<Identity> = match storage.read(SUBSCRIBERS_DOC)? {
            Some(raw) => match serde_json::from_str::<Vec<Identity>>(&raw) {
                Ok(ids) => ids.into_iter().collect(),
                Err(e) => {
                    tracing::warn!(error = %e, "subscriber document malformed, starting empty");
                    BTreeSet::new()
                }
            },
            None => BTreeSet::new(),
        };
        Ok(Self {
            storage,
            subscribers,
        })
    }

    pub fn contains(&self, id: Identity) -> bool {
        self.subscribers.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Identity> + '_ {
        self.subscribers.iter().copied()
    }

    /// Idempotent insert. Persists only when the identity was newly added,
    /// so repeat interactions cost no writes. Returns whether it was new.
    pub fn ensure_subscribed(&mut self, id: Identity) -> Result<bool, StoreError> {
        if !self.subscribers.insert(id) {
            return Ok(false);
        }
        if let Err(e) = self.persist() {
            self.subscribers.remove(&id);
            return Err(e);
        }
        tracing::debug!(id, "subscriber added");
        Ok(true)
    }

    /// Broadcast to every current subscriber, attempting each exactly once
    /// over a snapshot taken at the start of the pass. Permanent delivery
    /// failures prune the recipient; transient ones are logged and the
    /// recipient kept. The pruned registry is persisted once at the end.
    /// Returns how many recipients remain reachable after the pass.
    pub fn notify_all<T: ChatTransport>(
        &mut self,
        transport: &T,
        text: &str,
    ) -> Result<usize, StoreError> {
        let snapshot: Vec<Identity> = self.subscribers.iter().copied().collect();
        let mut pruned = Vec::new();

        for id in &snapshot {
            match transport.send_text(*id, text) {
                Ok(()) => {}
                Err(SendError::Permanent(reason)) => {
                    tracing::info!(id, %reason, "pruning unreachable subscriber");
                    pruned.push(*id);
                }
                Err(SendError::Transient(reason)) => {
                    tracing::warn!(id, %reason, "broadcast delivery failed, keeping subscriber");
                }
            }
        }

        if !pruned.is_empty() {
            for id in &pruned {
                self.subscribers.remove(id);
            }
            if let Err(e) = self.persist() {
                self.subscribers.extend(pruned.iter().copied());
                return Err(e);
            }
        }

        Ok(snapshot.len() - pruned.len())
    }

    fn persist(&self) -> Result<(), StoreError> {
        let ids: Vec<Identity> = self.subscribers.iter().copied().collect();
        let doc = serde_json::to_string_pretty(&ids).map_err(anyhow::Error::from)?;
        self.storage.write(SUBSCRIBERS_DOC, &doc)?;
        Ok(())
    }
}
