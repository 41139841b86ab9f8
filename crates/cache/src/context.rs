use crate::commit::CommitProtocol;
use cachevol_activation::{CacheStatusSource, DeviceMapper};
use cachevol_metadata::{MetadataStore, SegmentTypeRegistry};

/// Collaborators every cache operation works through
#[derive(Clone, Copy)]
pub struct CacheContext<'a> {
    pub registry: &'a SegmentTypeRegistry,
    pub store: &'a dyn MetadataStore,
    pub devices: &'a dyn DeviceMapper,
    pub status: &'a dyn CacheStatusSource,
}

impl<'a> CacheContext<'a> {
    pub fn new(
        registry: &'a SegmentTypeRegistry,
        store: &'a dyn MetadataStore,
        devices: &'a dyn DeviceMapper,
        status: &'a dyn CacheStatusSource,
    ) -> Self {
        Self {
            registry,
            store,
            devices,
            status,
        }
    }

    pub fn commit_protocol(&self) -> CommitProtocol<'a> {
        CommitProtocol::new(self.store, self.devices)
    }
}

impl std::fmt::Debug for CacheContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
