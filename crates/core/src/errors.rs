use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for cachevol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for cachevol operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The volume passed as a pool is not a cache pool
    #[error("{volume} is not a cache pool volume")]
    NotACachePool { volume: String },

    /// Cache layering (cache on cache) is not supported
    #[error("the origin, {volume}, cannot be of cache type")]
    OriginAlreadyCached { volume: String },

    /// The volume passed to detach carries no cache layer
    #[error("{volume} is not a cached volume")]
    NotACacheVolume { volume: String },

    /// Volume lookup by name or id failed
    #[error("volume '{volume}' not found in volume group '{vg}'")]
    VolumeNotFound { vg: String, volume: String },

    /// A structural operation was attempted without the group's lock token
    #[error("volume group '{vg}' is not locked by the caller")]
    LockNotHeld { vg: String },

    /// The segment type registry does not know the requested type
    #[error("segment type '{name}' is not supported")]
    SegmentTypeUnavailable { name: String },

    /// Inserting the hidden layering volume failed
    #[error("failed to insert layer beneath '{volume}': {message}")]
    LayerInsertion { volume: String, message: String },

    /// Linking a pool to a segment failed
    #[error("failed to attach pool '{pool}' to '{volume}': {message}")]
    PoolAttach {
        pool: String,
        volume: String,
        message: String,
    },

    /// Unlinking a pool from a segment failed
    #[error("failed to detach pool from '{volume}': {message}")]
    PoolDetach { volume: String, message: String },

    /// Any other in-memory graph primitive failed
    #[error("{operation} failed on '{volume}': {message}")]
    GraphMutation {
        operation: &'static str,
        volume: String,
        message: String,
    },

    /// The volume group graph violates one of its invariants
    #[error("invalid metadata for volume group '{vg}': {message}")]
    InvalidMetadata { vg: String, message: String },

    /// Reading cache policy or block status from the live mapping failed
    #[error("failed to query cache status of '{volume}': {message}")]
    StatusQuery { volume: String, message: String },

    /// A step of the write/suspend/commit/resume protocol failed
    #[error("{step} of '{volume}' failed: {source}")]
    Transaction {
        step: TransactionStep,
        volume: String,
        #[source]
        source: Box<Error>,
    },

    /// Cleanup of the vacated layer failed after the detach was made durable
    #[error("teardown of '{volume}' failed during {step}: {source}")]
    Teardown {
        step: TeardownStep,
        volume: String,
        #[source]
        source: Box<Error>,
    },

    /// The flush wait exceeded its configured bound
    #[error("cache flush of '{volume}' timed out after {elapsed:?} with {dirty_blocks} dirty blocks")]
    FlushTimedOut {
        volume: String,
        elapsed: Duration,
        dirty_blocks: u64,
    },

    /// The flush wait was cancelled by the caller
    #[error("cache flush of '{volume}' cancelled with {dirty_blocks} dirty blocks")]
    FlushCancelled { volume: String, dirty_blocks: u64 },

    /// A live-mapping primitive failed
    #[error("device '{device}' {operation} failed: {message}")]
    Device {
        device: String,
        operation: &'static str,
        message: String,
    },

    /// A metadata store primitive failed
    #[error("metadata {operation} for volume group '{vg}' failed: {message}")]
    Metadata {
        vg: String,
        operation: &'static str,
        message: String,
    },

    /// The volume group lock could not be acquired
    #[error("volume group '{vg}' is locked: {message}")]
    Lock { vg: String, message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Step of the commit protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStep {
    Write,
    Suspend,
    Commit,
    Resume,
}

impl fmt::Display for TransactionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStep::Write => "metadata write",
            TransactionStep::Suspend => "suspend",
            TransactionStep::Commit => "metadata commit",
            TransactionStep::Resume => "resume",
        };
        f.write_str(name)
    }
}

/// Step of the vacated-layer teardown that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeardownStep {
    Activate,
    Deactivate,
    Remove,
    Persist,
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TeardownStep::Activate => "activate",
            TeardownStep::Deactivate => "deactivate",
            TeardownStep::Remove => "remove",
            TeardownStep::Persist => "metadata update",
        };
        f.write_str(name)
    }
}

/// Coarse classification of failures, ordered by how much state may have
/// escaped memory when the error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Caller passed the wrong kind of volume; nothing was touched
    Precondition,
    /// A collaborator could not be resolved; nothing was touched
    Dependency,
    /// An in-memory graph primitive failed before any commit
    GraphMutation,
    /// The flush wait was bounded or cancelled before the cache drained
    Flush,
    /// Status queries against the live mapping
    Status,
    /// Write/suspend/commit/resume; persisted and live state may disagree
    Transaction,
    /// Cleanup after a durable detach
    Teardown,
    /// Configuration, file system, serialization and locking
    Environment,
}

/// What a caller can do to bring the three layers back into agreement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryHint {
    /// Nothing escaped memory; the operation can be retried from scratch
    Retry,
    /// Discard the in-memory volume group and reload the committed metadata
    ReloadMetadata,
    /// Metadata is committed; resuming the volume converges the live mapping
    ResumeVolume { volume: String },
    /// The live stack may be suspended against uncommitted metadata
    InspectLiveMapping { volume: String },
    /// The cached volume is consistent; only the orphaned layer remains
    RemoveOrphan { volume: String },
    /// Fix the configuration and rerun
    UpdateConfiguration,
    /// No automated recovery possible
    Manual { instructions: String },
}

impl Error {
    /// Which part of the taxonomy this error belongs to
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NotACachePool { .. }
            | Error::OriginAlreadyCached { .. }
            | Error::NotACacheVolume { .. }
            | Error::VolumeNotFound { .. }
            | Error::LockNotHeld { .. } => ErrorClass::Precondition,
            Error::SegmentTypeUnavailable { .. } => ErrorClass::Dependency,
            Error::LayerInsertion { .. }
            | Error::PoolAttach { .. }
            | Error::PoolDetach { .. }
            | Error::GraphMutation { .. }
            | Error::InvalidMetadata { .. } => ErrorClass::GraphMutation,
            Error::FlushTimedOut { .. } | Error::FlushCancelled { .. } => ErrorClass::Flush,
            Error::StatusQuery { .. } => ErrorClass::Status,
            Error::Transaction { .. } | Error::Device { .. } | Error::Metadata { .. } => {
                ErrorClass::Transaction
            }
            Error::Teardown { .. } => ErrorClass::Teardown,
            Error::Lock { .. }
            | Error::Configuration { .. }
            | Error::FileSystem { .. }
            | Error::Json { .. } => ErrorClass::Environment,
        }
    }

    /// Suggested recovery for this failure
    #[must_use]
    pub fn recovery_hint(&self) -> RecoveryHint {
        match self {
            Error::Transaction { step, volume, .. } => match step {
                TransactionStep::Write => RecoveryHint::ReloadMetadata,
                TransactionStep::Suspend | TransactionStep::Commit => {
                    RecoveryHint::InspectLiveMapping {
                        volume: volume.clone(),
                    }
                }
                TransactionStep::Resume => RecoveryHint::ResumeVolume {
                    volume: volume.clone(),
                },
            },
            Error::Teardown { volume, .. } => RecoveryHint::RemoveOrphan {
                volume: volume.clone(),
            },
            Error::LayerInsertion { .. }
            | Error::PoolAttach { .. }
            | Error::PoolDetach { .. }
            | Error::GraphMutation { .. }
            | Error::InvalidMetadata { .. } => RecoveryHint::ReloadMetadata,
            Error::Configuration { .. } => RecoveryHint::UpdateConfiguration,
            Error::Device { device, .. } => RecoveryHint::InspectLiveMapping {
                volume: device.clone(),
            },
            Error::Metadata { .. } => RecoveryHint::Manual {
                instructions: "check the metadata directory before retrying".to_string(),
            },
            _ => RecoveryHint::Retry,
        }
    }

    /// True when persisted metadata or the live mapping may have changed
    #[must_use]
    pub fn needs_inspection(&self) -> bool {
        matches!(self.class(), ErrorClass::Transaction | ErrorClass::Teardown)
    }
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    #[must_use]
    pub fn not_a_cache_pool(volume: impl Into<String>) -> Self {
        Error::NotACachePool {
            volume: volume.into(),
        }
    }

    #[must_use]
    pub fn origin_already_cached(volume: impl Into<String>) -> Self {
        Error::OriginAlreadyCached {
            volume: volume.into(),
        }
    }

    #[must_use]
    pub fn not_a_cache_volume(volume: impl Into<String>) -> Self {
        Error::NotACacheVolume {
            volume: volume.into(),
        }
    }

    #[must_use]
    pub fn volume_not_found(vg: impl Into<String>, volume: impl Into<String>) -> Self {
        Error::VolumeNotFound {
            vg: vg.into(),
            volume: volume.into(),
        }
    }

    #[must_use]
    pub fn segment_type_unavailable(name: impl Into<String>) -> Self {
        Error::SegmentTypeUnavailable { name: name.into() }
    }

    #[must_use]
    pub fn graph_mutation(
        operation: &'static str,
        volume: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::GraphMutation {
            operation,
            volume: volume.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_metadata(vg: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidMetadata {
            vg: vg.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status_query(volume: impl Into<String>, message: impl Into<String>) -> Self {
        Error::StatusQuery {
            volume: volume.into(),
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure with the protocol step it interrupted
    #[must_use]
    pub fn transaction(step: TransactionStep, volume: impl Into<String>, source: Error) -> Self {
        Error::Transaction {
            step,
            volume: volume.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn teardown(step: TeardownStep, volume: impl Into<String>, source: Error) -> Self {
        Error::Teardown {
            step,
            volume: volume.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn device(
        device: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::Device {
            device: device.into(),
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn metadata(
        vg: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Error::Metadata {
            vg: vg.into(),
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn lock(vg: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Lock {
            vg: vg.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// The protocol step, when this is a transaction failure
    #[must_use]
    pub fn transaction_step(&self) -> Option<TransactionStep> {
        match self {
            Error::Transaction { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the failure happened before anything reached the metadata store.
    ///
    /// Only transaction failures past the write step leave precommitted or
    /// committed metadata behind; callers holding a staged in-memory change
    /// may discard it for every other error.
    pub fn precedes_metadata_write(&self) -> bool {
        self.transaction_step()
            .map_or(true, |step| step == TransactionStep::Write)
    }
}
