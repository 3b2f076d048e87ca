//! Run commands and pull files across a pool of hosts reachable only through
//! SSH relays.

pub mod config;
pub mod logging;

pub mod connector;
pub mod control;
pub mod inventory;
pub mod probe;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod shell;
pub mod storage;
pub mod transfer;
pub mod transport;
