//! Sorted registry of connected users.
//!
//! One entry per user name, each holding the set of client ids that user is
//! connected through. Entries stay strictly ascending by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    pub name: String,
    pub client_ids: BTreeSet<String>,
}

/// Outcome of [`UserRegistry::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// A new name was added.
    Joined,
    /// The name existed; the client id is new for it.
    ClientAdded,
    Unchanged,
}

/// Outcome of [`UserRegistry::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The last client of the name left; the entry is gone.
    Left,
    ClientRemoved,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRegistry {
    users: Vec<UserEntry>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> &[UserEntry] {
        &self.users
    }

    pub fn names(&self) -> Vec<&str> {
        self.users.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_ok()
    }

    pub fn clients_of(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.position(name).ok().map(|idx| &self.users[idx].client_ids)
    }

    /// Record that `client_id` is connected as `name`. Idempotent.
    pub fn insert(&mut self, name: &str, client_id: &str) -> Presence {
        let idx = self.users.partition_point(|e| e.name.as_str() < name);

        match self.users.get_mut(idx) {
            Some(entry) if entry.name == name => {
                if entry.client_ids.insert(client_id.to_string()) {
                    Presence::ClientAdded
                } else {
                    Presence::Unchanged
                }
            }
            _ => {
                self.users.insert(
                    idx,
                    UserEntry {
                        name: name.to_string(),
                        client_ids: BTreeSet::from([client_id.to_string()]),
                    },
                );
                Presence::Joined
            }
        }
    }

    /// Forget `client_id` for `name`; the entry goes with its last client.
    pub fn remove(&mut self, name: &str, client_id: &str) -> Departure {
        let Ok(idx) = self.position(name) else {
            return Departure::Unchanged;
        };

        let entry = &mut self.users[idx];
        if !entry.client_ids.remove(client_id) {
            return Departure::Unchanged;
        }

        if entry.client_ids.is_empty() {
            self.users.remove(idx);
            Departure::Left
        } else {
            Departure::ClientRemoved
        }
    }

    fn position(&self, name: &str) -> Result<usize, usize> {
        self.users.binary_search_by(|e| e.name.as_str().cmp(name))
    }
}
