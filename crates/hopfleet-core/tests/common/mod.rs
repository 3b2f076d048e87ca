//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod fake_transport;

use std::sync::Arc;
use std::time::Duration;

use hopfleet_core::connector::TunnelConnector;
use hopfleet_core::inventory::{HostInventory, RelayDirectory};
use hopfleet_core::scheduler::{BatchScheduler, BatchSettings};

use fake_transport::FakeTransport;

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn connector(transport: FakeTransport, relays: &[&str], hosts: &[&str]) -> TunnelConnector<FakeTransport> {
    TunnelConnector::new(
        transport,
        RelayDirectory::new(relays.iter().copied()),
        Arc::new(HostInventory::new(hosts.iter().copied())),
        Duration::from_secs(5),
    )
}

pub fn scheduler(
    transport: FakeTransport,
    relays: &[&str],
    hosts: &[&str],
    settings: BatchSettings,
) -> BatchScheduler<FakeTransport> {
    BatchScheduler::new(Arc::new(connector(transport, relays, hosts)), settings)
}
