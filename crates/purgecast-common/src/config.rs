//! Cache fleet configuration.
//!
//! Two on-disk formats are accepted:
//!
//! - **INI**: every `[section]` is a group; every `key = value` inside it is a
//!   cache, key being the cache name and value its `host:port` address.
//! - **JSON**: an array of `{ "name": ..., "caches": [{ "name": ..., "address": ... }] }`
//!   objects.
//!
//! The format is selected by file extension: `.json` is parsed as JSON,
//! anything else as INI. Group and cache order is preserved exactly as it
//! appears in the file; the broadcaster derives its flat `all` list from that
//! order.

use std::fs;
use std::path::Path;

use ini::Ini;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One upstream cache endpoint.
///
/// Registry entries are immutable; per-request data (method, path, headers)
/// never lives here but on the request context bound to a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    /// Unique identifier, used as the client-table key.
    pub name: String,
    /// Endpoint address as `host:port`.
    pub address: String,
}

/// A named, ordered collection of caches addressed as one broadcast target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Group {
    pub name: String,
    pub caches: Vec<Cache>,
}

/// Loads the group configuration from `path`, dispatching on the file
/// extension (`.json` selects the JSON format, everything else INI).
///
/// # Arguments
/// * `path` - The configuration file path
///
/// # Returns
/// The groups in file order
///
/// # Errors
/// A missing or unreadable file, or a parse failure in either format
pub fn load_groups(path: &Path) -> Result<Vec<Group>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => load_groups_json(path),
        _ => load_groups_ini(path),
    }
}

/// Loads the JSON configuration format.
pub fn load_groups_json(path: &Path) -> Result<Vec<Group>> {
    let content = fs::read_to_string(path)?;
    let groups = serde_json::from_str(&content)?;
    Ok(groups)
}

/// Loads the INI configuration format.
///
/// The global (section-less) key space is ignored; only named sections become
/// groups.
pub fn load_groups_ini(path: &Path) -> Result<Vec<Group>> {
    let ini = Ini::load_from_file(path)?;
    let mut groups = Vec::new();

    for (section, props) in ini.iter() {
        let Some(section) = section else {
            continue;
        };

        let mut group = Group {
            name: section.to_string(),
            caches: Vec::new(),
        };

        for (key, value) in props.iter() {
            group.caches.push(Cache {
                name: key.to_string(),
                address: value.to_string(),
            });
        }

        groups.push(group);
    }

    Ok(groups)
}
