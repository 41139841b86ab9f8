/// Constants used throughout the cachevol codebase
// Segment type names
pub const LINEAR_SEGTYPE: &str = "linear";
pub const STRIPED_SEGTYPE: &str = "striped";
pub const CACHE_SEGTYPE: &str = "cache";
pub const CACHE_POOL_SEGTYPE: &str = "cache-pool";
pub const ERROR_SEGTYPE: &str = "error";
pub const ZERO_SEGTYPE: &str = "zero";

// Reserved volume name suffixes
pub const CORIG_SUFFIX: &str = "_corig";
pub const CDATA_SUFFIX: &str = "_cdata";
pub const CMETA_SUFFIX: &str = "_cmeta";
pub const RESERVED_SUFFIXES: &[&str] = &[CORIG_SUFFIX, CDATA_SUFFIX, CMETA_SUFFIX];

// Cache policies
pub const CLEANER_POLICY: &str = "cleaner";
pub const DEFAULT_CACHE_POLICY: &str = "mq";

// Sizes, in 512-byte sectors
pub const DEFAULT_EXTENT_SIZE: u64 = 8192;
pub const DEFAULT_CACHE_CHUNK_SIZE: u64 = 128;

// Name limits
pub const NAME_LEN: usize = 128;

// Flush polling
pub const DEFAULT_FLUSH_POLL_INTERVAL_MS: u64 = 5_000;

// Environment variable names
pub const CACHEVOL_CONFIG_VAR: &str = "CACHEVOL_CONFIG";
pub const CACHEVOL_METADATA_DIR_VAR: &str = "CACHEVOL_METADATA_DIR";
pub const CACHEVOL_FLUSH_INTERVAL_VAR: &str = "CACHEVOL_FLUSH_INTERVAL_MS";
pub const CACHEVOL_FLUSH_TIMEOUT_VAR: &str = "CACHEVOL_FLUSH_TIMEOUT_SECS";

// Metadata file names
pub const METADATA_FILE_EXTENSION: &str = "json";
pub const PRECOMMIT_FILE_EXTENSION: &str = "json.pre";
pub const LOCK_FILE_EXTENSION: &str = "lock";
