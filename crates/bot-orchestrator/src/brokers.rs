use optrade_core::subscription::BrokerId;
use optrade_core::traits::BrokerAdapter;
use std::collections::HashMap;
use std::sync::Arc;

/// Connected broker sessions, fixed at start and shared read-only with the
/// scheduler.
#[derive(Clone, Default)]
pub struct BrokerSet {
    adapters: HashMap<BrokerId, Arc<dyn BrokerAdapter>>,
}

impl BrokerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, id: BrokerId, adapter: Arc<dyn BrokerAdapter>) -> Self {
        self.insert(id, adapter);
        self
    }

    pub fn insert(&mut self, id: BrokerId, adapter: Arc<dyn BrokerAdapter>) {
        self.adapters.insert(id, adapter);
    }

    #[must_use]
    pub fn get(&self, id: BrokerId) -> Option<&Arc<dyn BrokerAdapter>> {
        self.adapters.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: BrokerId) -> bool {
        self.adapters.contains_key(&id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for BrokerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSet")
            .field("brokers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
