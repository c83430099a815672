// src/core/policy/mod.rs

//! Access policy: admission of connections by origin address and of
//! messages by self-reported identity.
//!
//! Both checks are pure lookups against deny-lists loaded once at startup.

pub mod deny_list;

pub use deny_list::{IpDenyList, NameDenyList};

use crate::config::Config;
use crate::core::CloudVarError;
use std::net::IpAddr;
use std::path::Path;

/// The verdict of a policy check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny,
}

impl Admission {
    pub fn is_allowed(self) -> bool {
        self == Admission::Allow
    }
}

/// Enforces the static deny-lists. A `None` list means the filter is off.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    denied_ips: Option<IpDenyList>,
    denied_names: Option<NameDenyList>,
}

impl AccessPolicy {
    pub fn new(denied_ips: Option<IpDenyList>, denied_names: Option<NameDenyList>) -> Self {
        Self {
            denied_ips,
            denied_names,
        }
    }

    /// A policy that admits everything.
    pub fn permissive() -> Self {
        Self::default()
    }

    /// Builds the policy from the configuration, reading the filter files of
    /// the enabled filters.
    pub fn from_config(config: &Config) -> Result<Self, CloudVarError> {
        let denied_ips = if config.ip_filter {
            Some(IpDenyList::load(Path::new(&config.ip_filter_path))?)
        } else {
            None
        };
        let denied_names = if config.name_filter {
            Some(NameDenyList::load(Path::new(&config.name_filter_path))?)
        } else {
            None
        };
        Ok(Self::new(denied_ips, denied_names))
    }

    pub fn admit_connection(&self, ip: &IpAddr) -> Admission {
        match &self.denied_ips {
            Some(list) if list.contains(ip) => Admission::Deny,
            _ => Admission::Allow,
        }
    }

    /// Checks a message's identity. Anonymous messages are always admitted.
    pub fn admit_identity(&self, identity: Option<&str>) -> Admission {
        match (&self.denied_names, identity) {
            (Some(list), Some(name)) if list.contains(name) => Admission::Deny,
            _ => Admission::Allow,
        }
    }

    pub fn ip_filter_enabled(&self) -> bool {
        self.denied_ips.is_some()
    }

    pub fn name_filter_enabled(&self) -> bool {
        self.denied_names.is_some()
    }
}
