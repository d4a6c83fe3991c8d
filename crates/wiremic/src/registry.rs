//! Card registry
//!
//! Holds the resident set of virtual capture cards. Cards are registered
//! once at daemon startup from the configured index list and live until
//! shutdown; there is no hotplug.

use std::collections::HashMap;
use std::sync::Arc;

use micproto::CardStatus;
use tracing::info;

use crate::stream::Device;

/// Driver identity reported on the control channel.
pub const DRIVER_NAME: &str = "snd_wiremic";
pub const SHORT_NAME: &str = "WireMic";
pub const LONG_NAME: &str = "WireMic virtual capture card";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("card {0} already registered")]
    AlreadyRegistered(u32),

    #[error("no cards enabled")]
    NoDevices,
}

#[derive(Default)]
pub struct CardRegistry {
    cards: HashMap<u32, Arc<Device>>,
}

impl CardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from the configured card indices. An empty list is
    /// an error: a daemon with zero cards has nothing to serve.
    pub fn from_indices(indices: &[u32]) -> Result<Self, RegistryError> {
        if indices.is_empty() {
            return Err(RegistryError::NoDevices);
        }
        let mut registry = Self::new();
        for &index in indices {
            registry.register(index)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, index: u32) -> Result<(), RegistryError> {
        if self.cards.contains_key(&index) {
            return Err(RegistryError::AlreadyRegistered(index));
        }
        self.cards.insert(index, Device::new(index));
        info!(card = index, driver = DRIVER_NAME, "registered capture card");
        Ok(())
    }

    pub fn get(&self, index: u32) -> Option<&Arc<Device>> {
        self.cards.get(&index)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn indices(&self) -> Vec<u32> {
        let mut indices: Vec<u32> = self.cards.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    /// Status snapshot of every card, ordered by index.
    pub fn statuses(&self) -> Vec<CardStatus> {
        let mut statuses: Vec<CardStatus> =
            self.cards.values().map(|device| device.status()).collect();
        statuses.sort_by_key(|s| s.index);
        statuses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_indices_registers_all() {
        let registry = CardRegistry::from_indices(&[0, 2, 1]).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.indices(), vec![0, 1, 2]);
        assert!(registry.get(2).is_some());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn test_empty_index_list_is_an_error() {
        let err = CardRegistry::from_indices(&[]).map(|_| ()).unwrap_err();
        assert!(matches!(err, RegistryError::NoDevices));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let err = CardRegistry::from_indices(&[0, 0]).map(|_| ()).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(0)));
    }

    #[test]
    fn test_statuses_sorted_by_index() {
        let registry = CardRegistry::from_indices(&[3, 1]).unwrap();
        let statuses = registry.statuses();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].index, 1);
        assert_eq!(statuses[1].index, 3);
        assert!(!statuses[0].running);
        assert!(!statuses[0].valid);
    }
}
