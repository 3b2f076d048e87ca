//! Host inventory and relay directory.
//!
//! The inventory is the only shared mutable state in the crate: every target
//! host is either available here or leased to exactly one session (or connect
//! attempt). `acquire_*` and `release*` are the only ways to move a host
//! between the two sides, and both run under one mutex.
//!
//! Relays are not tracked for exclusion; the directory only hands out
//! identifiers in random order.

mod error;
mod lease;
mod relay;

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use rand::seq::{IndexedRandom, SliceRandom};

pub use error::InventoryError;
pub use lease::HostLease;
pub use relay::RelayDirectory;

use crate::config::HostGroup;

#[derive(Debug, Default)]
struct InventoryState {
    available: HashSet<String>,
    leased: HashSet<String>,
}

/// Process-wide pool of target hosts.
///
/// Share it behind an `Arc`; all methods take `&self`.
#[derive(Debug, Default)]
pub struct HostInventory {
    state: Mutex<InventoryState>,
}

impl HostInventory {
    /// Build an inventory from host identifiers. Duplicates collapse into one host.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let available = hosts.into_iter().map(Into::into).collect();
        Self {
            state: Mutex::new(InventoryState {
                available,
                leased: HashSet::new(),
            }),
        }
    }

    /// Build an inventory from explicit hosts plus expanded host groups.
    pub fn from_groups(hosts: &[String], groups: &[HostGroup]) -> Self {
        Self::new(
            hosts
                .iter()
                .cloned()
                .chain(groups.iter().flat_map(HostGroup::expand)),
        )
    }

    fn lock(&self) -> MutexGuard<'_, InventoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lease one host chosen at random from `candidates` (or the whole inventory
    /// when `None`). Candidates that are not currently available are skipped.
    /// Fails with `NoHostAvailable` and changes nothing when no candidate is free.
    pub fn acquire_host(&self, candidates: Option<&[String]>) -> Result<HostLease, InventoryError> {
        let mut state = self.lock();
        let pool: Vec<&String> = match candidates {
            Some(c) => c.iter().filter(|h| state.available.contains(*h)).collect(),
            None => state.available.iter().collect(),
        };
        let host = pool
            .choose(&mut rand::rng())
            .map(|h| (*h).clone())
            .ok_or(InventoryError::NoHostAvailable)?;
        state.available.remove(&host);
        state.leased.insert(host.clone());
        Ok(HostLease::new(host))
    }

    /// Lease a specific host.
    pub fn acquire_exact(&self, host: &str) -> Result<HostLease, InventoryError> {
        let mut state = self.lock();
        if !state.available.remove(host) {
            return Err(InventoryError::HostUnavailable(host.to_string()));
        }
        state.leased.insert(host.to_string());
        Ok(HostLease::new(host.to_string()))
    }

    /// Return a leased host to the pool.
    pub fn release(&self, lease: HostLease) -> Result<(), InventoryError> {
        self.release_host(lease.into_host())
    }

    /// Return a host to the pool by identifier.
    ///
    /// Fails if the host is already available or was never part of this inventory.
    pub fn release_host(&self, host: impl Into<String>) -> Result<(), InventoryError> {
        let host = host.into();
        let mut state = self.lock();
        if state.available.contains(&host) {
            return Err(InventoryError::AlreadyAvailable(host));
        }
        if !state.leased.remove(&host) {
            return Err(InventoryError::UnknownHost(host));
        }
        state.available.insert(host);
        Ok(())
    }

    pub fn is_available(&self, host: &str) -> bool {
        self.lock().available.contains(host)
    }

    pub fn available_count(&self) -> usize {
        self.lock().available.len()
    }

    pub fn leased_count(&self) -> usize {
        self.lock().leased.len()
    }

    /// Total hosts known to the inventory (available + leased). Constant over its lifetime.
    pub fn total(&self) -> usize {
        let state = self.lock();
        state.available.len() + state.leased.len()
    }

    /// Currently available hosts in random order.
    pub fn snapshot(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.lock().available.iter().cloned().collect();
        hosts.shuffle(&mut rand::rng());
        hosts
    }
}
