//--------------------------------------------------------------------------------------------------
// STRUCTS
//--------------------------------------------------------------------------------------------------
// | Name          | Description                                        | Key Methods             |
// |---------------|----------------------------------------------------|-------------------------|
// | Registry      | Ordered callback sequences keyed by EventKey       | insert, remove, snapshot|
// | Entry         | One registered callback and its subscription id    |                         |
//--------------------------------------------------------------------------------------------------

use std::collections::HashMap;

use uuid::Uuid;

use super::error::{CommandError, CommandResult};
use super::types::{Callback, EventKey};

/// One registered callback
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) id: Uuid,
    pub(crate) callback: Callback,
}

/// Mapping from event key to the callbacks registered under it, in registration order.
///
/// Keys are created on first insert and kept even once their sequence is empty.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<EventKey, Vec<Entry>>,
}

impl Registry {
    /// Appends a callback to the key's sequence
    pub(crate) fn insert(&mut self, key: EventKey, id: Uuid, callback: Callback) {
        self.entries
            .entry(key)
            .or_default()
            .push(Entry { id, callback });
    }

    /// Removes the entry with the given id from the key's sequence, keeping the order of the rest.
    pub(crate) fn remove(&mut self, key: EventKey, id: Uuid) -> CommandResult<()> {
        let not_registered = || CommandError::NotRegistered { key, subscription: id };

        let entries = self.entries.get_mut(&key).ok_or_else(not_registered)?;
        let position = entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(not_registered)?;
        entries.remove(position);

        Ok(())
    }

    /// Clones the key's sequence so it can be dispatched without holding the registry lock
    pub(crate) fn snapshot(&self, key: &EventKey) -> Vec<Entry> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub(crate) fn len(&self, key: &EventKey) -> usize {
        self.entries.get(key).map_or(0, Vec::len)
    }

    /// Total number of registered callbacks across all keys
    pub(crate) fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn contains_key(&self, key: &EventKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Empties one key's sequence, returning how many callbacks were dropped
    pub(crate) fn clear_key(&mut self, key: &EventKey) -> usize {
        self.entries.get_mut(key).map_or(0, |entries| {
            let removed = entries.len();
            entries.clear();
            removed
        })
    }

    /// Empties every sequence, returning how many callbacks were dropped
    pub(crate) fn clear(&mut self) -> usize {
        self.entries
            .values_mut()
            .map(|entries| {
                let removed = entries.len();
                entries.clear();
                removed
            })
            .sum()
    }
}
