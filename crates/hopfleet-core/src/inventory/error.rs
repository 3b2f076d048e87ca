/// Inventory errors. Only `NoHostAvailable` is an exhaustion condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("no host available")]
    NoHostAvailable,
    #[error("host {0} is not available (leased elsewhere or unknown)")]
    HostUnavailable(String),
    #[error("host {0} is already in the inventory")]
    AlreadyAvailable(String),
    #[error("host {0} does not belong to this inventory")]
    UnknownHost(String),
}
