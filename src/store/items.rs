//! The authoritative checkpoint map.
//!
//! The in-memory `BTreeMap` owns the state; the persisted document is a
//! mirrored copy rewritten after every mutation. A `BTreeMap` (not hash)
//! keeps the serialized document deterministic, so seeding the same empty
//! storage twice produces byte-identical bytes.

use std::collections::BTreeMap;

use crate::model::{Item, Status, now_stamp};
use crate::storage::Storage;

use super::StoreError;

/// Document name under the storage root.
pub const ITEMS_DOC: &str = "items";

/// Checkpoints seeded at first boot and healed back in on every load.
pub const DEFAULT_ITEMS: &[&str] = &[
    "EAST RAMP",
    "MAIN GATE",
    "NORTH POST",
    "RIVER CROSSING",
    "SOUTH POST",
];

/// Upper bound on a stored name, so callback payloads carrying a name plus
/// a short action prefix stay under the transport's 64-byte limit.
pub const MAX_NAME_LEN: usize = 48;

/// Case-normalization applied to every admin-entered name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

pub struct ItemStore<S> {
    storage: S,
    items: BTreeMap<String, Item>,
}

impl<S: Storage> ItemStore<S> {
    /// Load the item map, seeding defaults when the document is absent or
    /// malformed and healing any default name that has gone missing. The
    /// merged result is re-persisted before returning.
    pub fn load(storage: S) -> Result<Self, StoreError> {
        let mut items: BTreeMap<String, Item> = match storage.read(ITEMS_DOC)? {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(error = %e, "item document malformed, reseeding defaults");
                    BTreeMap::new()
                }
            },
            None => BTreeMap::new(),
        };

        for name in DEFAULT_ITEMS {
            items.entry((*name).to_string()).or_insert_with(Item::unset);
        }

        let store = Self { storage, items };
        store.persist()?;
        Ok(store)
    }

    pub fn get(&self, name: &str) -> Option<&Item> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set an item's status and stamp the change. Returns the timestamp
    /// used. Unknown names are a no-op error.
    pub fn set_status(&mut self, name: &str, status: Status) -> Result<String, StoreError> {
        let prev = self.items.get(name).cloned().ok_or(StoreError::NotFound)?;
        let stamp = now_stamp();
        self.items.insert(
            name.to_string(),
            Item {
                status,
                updated: Some(stamp.clone()),
            },
        );
        if let Err(e) = self.persist() {
            self.items.insert(name.to_string(), prev);
            return Err(e);
        }
        Ok(stamp)
    }

    /// Advance an item along the toggle cycle and stamp the change.
    pub fn toggle(&mut self, name: &str) -> Result<(Status, String), StoreError> {
        let current = self.items.get(name).ok_or(StoreError::NotFound)?.status;
        let next = current.toggled();
        let stamp = self.set_status(name, next)?;
        Ok((next, stamp))
    }

    /// Insert a new item at `Unset` with no timestamp. The name is trimmed
    /// and upper-cased first; empty, over-long, and duplicate names are
    /// rejected without touching the store. Returns the normalized name.
    pub fn add_item(&mut self, raw: &str) -> Result<String, StoreError> {
        let name = normalize_name(raw);
        if name.is_empty() {
            return Err(StoreError::EmptyName);
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StoreError::NameTooLong);
        }
        if self.items.contains_key(&name) {
            return Err(StoreError::AlreadyExists);
        }
        self.items.insert(name.clone(), Item::unset());
        if let Err(e) = self.persist() {
            self.items.remove(&name);
            return Err(e);
        }
        Ok(name)
    }

    /// Remove an item. A later re-add starts over at `Unset` with no
    /// timestamp.
    pub fn delete_item(&mut self, name: &str) -> Result<(), StoreError> {
        let prev = self.items.remove(name).ok_or(StoreError::NotFound)?;
        if let Err(e) = self.persist() {
            self.items.insert(name.to_string(), prev);
            return Err(e);
        }
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {
        let doc = serde_json::to_string_pretty(&self.items).map_err(anyhow::Error::from)?;
        self.storage.write(ITEMS_DOC, &doc)?;
        Ok(())
    }
}
