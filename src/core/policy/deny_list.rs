// src/core/policy/deny_list.rs

//! Static deny-lists and the JSON files they are loaded from.

use crate::core::CloudVarError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::Path;
use tracing::{info, warn};

/// The data structure of the IP filter file, e.g. `{"ips": ["10.0.0.7"]}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct IpFilterFile {
    #[serde(default)]
    pub ips: Vec<String>,
}

/// The data structure of the name filter file, e.g. `{"names": ["griefer"]}`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NameFilterFile {
    #[serde(default)]
    pub names: Vec<String>,
}

/// Denied peer addresses. IPv4-mapped IPv6 forms are folded onto IPv4, so
/// `::ffff:10.0.0.7` and `10.0.0.7` are the same entry.
#[derive(Debug, Clone, Default)]
pub struct IpDenyList {
    addrs: HashSet<IpAddr>,
}

impl IpDenyList {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut addrs = HashSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            match entry.parse::<IpAddr>() {
                Ok(ip) => {
                    addrs.insert(ip.to_canonical());
                }
                Err(_) => warn!("Ignoring invalid IP filter entry '{}'.", entry),
            }
        }
        Self { addrs }
    }

    /// Loads the list from a JSON file. A missing file yields an empty list.
    pub fn load(path: &Path) -> Result<Self, CloudVarError> {
        let Some(contents) = read_filter_file(path)? else {
            return Ok(Self::default());
        };
        let file: IpFilterFile = serde_json::from_str(&contents).map_err(|e| {
            CloudVarError::Config(format!(
                "failed to parse IP filter file '{}': {e}",
                path.display()
            ))
        })?;
        let list = Self::from_entries(&file.ips);
        info!(
            "Loaded {} denied addresses from '{}'.",
            list.len(),
            path.display()
        );
        Ok(list)
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.addrs.contains(&ip.to_canonical())
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

/// Denied self-reported identities. Matching is exact and case-sensitive.
#[derive(Debug, Clone, Default)]
pub struct NameDenyList {
    names: HashSet<String>,
}

impl NameDenyList {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Loads the list from a JSON file. A missing file yields an empty list.
    pub fn load(path: &Path) -> Result<Self, CloudVarError> {
        let Some(contents) = read_filter_file(path)? else {
            return Ok(Self::default());
        };
        let file: NameFilterFile = serde_json::from_str(&contents).map_err(|e| {
            CloudVarError::Config(format!(
                "failed to parse name filter file '{}': {e}",
                path.display()
            ))
        })?;
        let list = Self::from_entries(file.names);
        info!(
            "Loaded {} denied names from '{}'.",
            list.len(),
            path.display()
        );
        Ok(list)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn read_filter_file(path: &Path) -> Result<Option<String>, CloudVarError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(
                "Filter file '{}' not found. The filter is enabled but denies nothing.",
                path.display()
            );
            Ok(None)
        }
        Err(e) => Err(CloudVarError::Config(format!(
            "failed to read filter file '{}': {e}",
            path.display()
        ))),
    }
}
