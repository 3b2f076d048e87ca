//! Static relay list.

use rand::seq::{IndexedRandom, SliceRandom};

/// Relay hosts used as the first hop. Relays can carry any number of tunnels
/// at once, so nothing here is leased; callers keep their own trial set.
#[derive(Debug, Clone, Default)]
pub struct RelayDirectory {
    relays: Vec<String>,
}

impl RelayDirectory {
    pub fn new<I, S>(relays: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relays: relays.into_iter().map(Into::into).collect(),
        }
    }

    /// One relay chosen at random, or `None` if the directory is empty.
    pub fn pick_relay(&self) -> Option<&str> {
        self.relays.choose(&mut rand::rng()).map(String::as_str)
    }

    /// Every relay in random order, for failover.
    pub fn trial_order(&self) -> Vec<String> {
        let mut order = self.relays.clone();
        order.shuffle(&mut rand::rng());
        order
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}
