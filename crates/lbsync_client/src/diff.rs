//! Desired-versus-remote server set comparison.
//!
//! Both functions here are pure: no network access and no shared state.

use lbsync_protocol::{normalize_address, ServerRecord};
use std::collections::{HashMap, HashSet};

/// Operations needed to turn the remote server set into the desired one.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerDiff<T> {
    /// Desired servers the remote does not know, as the caller wrote them.
    pub to_add: Vec<T>,
    /// Remote servers absent from the desired set, in remote order.
    pub to_delete: Vec<T>,
    /// Desired servers whose parameters differ, carrying the remote `id`.
    pub to_update: Vec<T>,
}

impl<T> ServerDiff<T> {
    /// Returns true if no operation is needed.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_delete.is_empty() && self.to_update.is_empty()
    }

    /// Total number of operations.
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_delete.len() + self.to_update.len()
    }
}

impl<T> Default for ServerDiff<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_delete: Vec::new(),
            to_update: Vec::new(),
        }
    }
}

/// Computes the add/delete/update sets for `desired` against `remote`.
///
/// Desired addresses are normalized for matching only; remote addresses are
/// used as reported. `desired` should not contain duplicate addresses (see
/// [`dedupe_servers`]).
pub fn diff_servers<T: ServerRecord>(desired: &[T], remote: &[T]) -> ServerDiff<T> {
    let mut by_address: HashMap<&str, usize> = HashMap::with_capacity(remote.len());
    for (idx, server) in remote.iter().enumerate() {
        by_address.entry(server.server()).or_insert(idx);
    }

    let mut claimed = HashSet::with_capacity(remote.len());
    let mut diff = ServerDiff::default();

    for server in desired {
        let address = normalize_address(server.server());
        match by_address.get(address.as_str()) {
            None => diff.to_add.push(server.clone()),
            Some(&idx) => {
                claimed.insert(idx);
                let reported = &remote[idx];

                let mut candidate = server.clone();
                candidate.set_server(address);
                if !candidate.same_parameters(reported) {
                    candidate.set_id(reported.id());
                    diff.to_update.push(candidate);
                }
            }
        }
    }

    diff.to_delete = remote
        .iter()
        .enumerate()
        .filter(|(idx, _)| !claimed.contains(idx))
        .map(|(_, server)| server.clone())
        .collect();

    diff
}

/// Result of collapsing duplicate desired servers.
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated<T> {
    /// One record per address, normalized, in first-seen order.
    pub servers: Vec<T>,
    /// Normalized addresses listed more than once with differing parameters.
    pub conflicting: Vec<String>,
}

/// Collapses desired servers sharing a normalized address.
///
/// Duplicates with identical parameters collapse to the first instance.
/// An address whose duplicates disagree is dropped entirely and reported in
/// [`Deduplicated::conflicting`].
pub fn dedupe_servers<T: ServerRecord>(desired: &[T]) -> Deduplicated<T> {
    let mut order: Vec<String> = Vec::new();
    let mut first: HashMap<String, T> = HashMap::with_capacity(desired.len());
    let mut conflicting: HashSet<String> = HashSet::new();

    for server in desired {
        let mut normalized = server.clone();
        normalized.set_server(normalize_address(server.server()));
        let address = normalized.server().to_string();

        match first.get(&address) {
            Some(existing) => {
                if !existing.same_parameters(&normalized) {
                    conflicting.insert(address);
                }
            }
            None => {
                order.push(address.clone());
                first.insert(address, normalized);
            }
        }
    }

    let mut result = Deduplicated {
        servers: Vec::with_capacity(order.len()),
        conflicting: Vec::new(),
    };
    for address in order {
        if conflicting.contains(&address) {
            result.conflicting.push(address);
        } else if let Some(server) = first.remove(&address) {
            result.servers.push(server);
        }
    }
    result
}
