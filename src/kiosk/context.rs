use crate::config::KioskConfig;
use crate::kiosk::state::StateStore;
use crate::kiosk::storage::{KeyValueStore, MemoryStore, Persistence, StorageMedium};
use crate::kiosk::transport::{Envelope, Transport};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// Messages buffered per bus subscriber before it starts lagging
pub const BUS_CAPACITY: usize = 256;

/// Everything participants of one deployment share: the configuration, the
/// named broadcast bus and the storage medium.
///
/// Independent contexts never see each other's traffic, so tests can run
/// several deployments side by side.
#[derive(Clone)]
pub struct SyncContext {
    config: Arc<KioskConfig>,
    bus: Option<broadcast::Sender<Envelope>>,
    storage: Arc<StorageMedium>,
}

impl SyncContext {
    pub fn new(config: KioskConfig, backend: Box<dyn KeyValueStore>) -> Self {
        let (bus, _) = broadcast::channel(BUS_CAPACITY);
        let storage = Arc::new(StorageMedium::new(backend));
        info!(
            "Sync context on channel '{}' with {} storage",
            config.channel_name,
            storage.backend_name()
        );
        Self {
            config: Arc::new(config),
            bus: Some(bus),
            storage,
        }
    }

    pub fn in_memory(config: KioskConfig) -> Self {
        Self::new(config, Box::new(MemoryStore::new()))
    }

    /// Same context with the broadcast bus unsupported. Participants opened
    /// from it fall back to local echo and storage notifications.
    pub fn without_bus(mut self) -> Self {
        self.bus = None;
        self
    }

    pub fn config(&self) -> &Arc<KioskConfig> {
        &self.config
    }

    pub fn storage(&self) -> &Arc<StorageMedium> {
        &self.storage
    }

    pub fn open_transport(&self) -> Transport {
        Transport::open(
            Uuid::new_v4(),
            &self.config,
            self.bus.clone(),
            self.storage.subscribe(),
        )
    }

    /// State store whose writes are tagged with `origin`
    pub fn state_store(&self, origin: Uuid) -> StateStore {
        let persistence = Persistence::new(
            self.storage.clone(),
            self.config.storage_key_prefix.clone(),
            origin,
        );
        StateStore::new(persistence, self.config.clone())
    }
}
