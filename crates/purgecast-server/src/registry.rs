//! Group registry.
//!
//! The registry maps group names to their cache lists and keeps a derived
//! flat list of every configured cache in configuration order. It is an
//! immutable snapshot: a reload builds a complete new `Registry` and swaps it
//! wholesale behind the server's lock, so a dispatcher either sees the entire
//! old configuration or the entire new one, never a torn mix.

use std::collections::HashMap;

use purgecast_common::{Cache, Group, PurgecastError, Result};

/// Reserved group name denoting the union of all configured caches.
pub const ALL_GROUP: &str = "all";

/// Immutable snapshot of the configured cache groups.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Groups in configuration order.
    groups: Vec<Group>,
    /// Group name → index into `groups`.
    index: HashMap<String, usize>,
    /// Every cache of every group, in configuration order.
    all: Vec<Cache>,
}

impl Registry {
    /// Builds a registry from parsed groups.
    ///
    /// # Arguments
    /// * `groups` - Parsed groups in configuration order
    ///
    /// # Errors
    /// A configuration error when a group is named `all`, a group name
    /// repeats, or a cache name repeats anywhere in the registry (the cache
    /// name is the client-table key).
    pub fn from_groups(groups: Vec<Group>) -> Result<Self> {
        let mut index = HashMap::new();
        let mut all: Vec<Cache> = Vec::new();

        for (i, group) in groups.iter().enumerate() {
            if group.name == ALL_GROUP {
                return Err(PurgecastError::Config(format!(
                    "group name {:?} is reserved",
                    ALL_GROUP
                )));
            }
            if index.insert(group.name.clone(), i).is_some() {
                return Err(PurgecastError::Config(format!(
                    "duplicate group name {:?}",
                    group.name
                )));
            }
            for cache in &group.caches {
                if all.iter().any(|c| c.name == cache.name) {
                    return Err(PurgecastError::Config(format!(
                        "duplicate cache name {:?}",
                        cache.name
                    )));
                }
                all.push(cache.clone());
            }
        }

        Ok(Self { groups, index, all })
    }

    /// Looks up a group by its case-sensitive name.
    ///
    /// # Arguments
    /// * `name` - The group name, matched exactly
    ///
    /// # Returns
    /// The group, or `None` when no group of that name is configured
    pub fn lookup(&self, name: &str) -> Option<&Group> {
        self.index.get(name).map(|&i| &self.groups[i])
    }

    /// The flattened union of all configured caches, in configuration order.
    pub fn all(&self) -> &[Cache] {
        &self.all
    }

    /// The configured groups, in configuration order.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }
}
