//! Exclusive ownership of one host taken out of the inventory.

/// A host removed from the inventory. Not `Clone`: the only way to put the
/// host back is to move the lease into `HostInventory::release`.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a dropped lease never returns its host to the inventory"]
pub struct HostLease {
    host: String,
}

impl HostLease {
    pub(super) fn new(host: String) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub(super) fn into_host(self) -> String {
        self.host
    }
}
