//! Segment types and their registry
//!
//! Orchestration code never constructs a segment type itself; it asks the
//! registry by name, so a build (or a kernel) without cache support fails
//! fast with `SegmentTypeUnavailable` instead of writing metadata that cannot
//! be activated.

use cachevol_core::{
    Error, Result, CACHE_POOL_SEGTYPE, CACHE_SEGTYPE, ERROR_SEGTYPE, LINEAR_SEGTYPE,
    STRIPED_SEGTYPE, ZERO_SEGTYPE,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SegmentKind {
    Linear,
    Striped,
    Cache,
    CachePool,
    Error,
    Zero,
}

impl SegmentKind {
    pub const ALL: [SegmentKind; 6] = [
        SegmentKind::Linear,
        SegmentKind::Striped,
        SegmentKind::Cache,
        SegmentKind::CachePool,
        SegmentKind::Error,
        SegmentKind::Zero,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SegmentKind::Linear => LINEAR_SEGTYPE,
            SegmentKind::Striped => STRIPED_SEGTYPE,
            SegmentKind::Cache => CACHE_SEGTYPE,
            SegmentKind::CachePool => CACHE_POOL_SEGTYPE,
            SegmentKind::Error => ERROR_SEGTYPE,
            SegmentKind::Zero => ZERO_SEGTYPE,
        }
    }

    /// Virtual segments map to no storage and carry no areas
    pub fn is_virtual(self) -> bool {
        matches!(self, SegmentKind::Error | SegmentKind::Zero)
    }
}

/// Opaque handle to a registered segment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentType(SegmentKind);

impl SegmentType {
    pub(crate) fn of(kind: SegmentKind) -> Self {
        Self(kind)
    }

    pub fn kind(self) -> SegmentKind {
        self.0
    }

    pub fn name(self) -> &'static str {
        self.0.name()
    }

    pub fn is_cache(self) -> bool {
        self.0 == SegmentKind::Cache
    }
}

impl fmt::Display for SegmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Name → segment type lookup
#[derive(Debug, Clone)]
pub struct SegmentTypeRegistry {
    types: IndexMap<&'static str, SegmentType>,
}

impl SegmentTypeRegistry {
    /// Registry with every built-in segment type
    pub fn builtin() -> Self {
        let types = SegmentKind::ALL
            .iter()
            .map(|kind| (kind.name(), SegmentType::of(*kind)))
            .collect();
        Self { types }
    }

    /// Drop a type, as on a system whose kernel lacks the target
    pub fn without(mut self, name: &str) -> Self {
        self.types.shift_remove(name);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<SegmentType> {
        self.types
            .get(name)
            .copied()
            .ok_or_else(|| Error::segment_type_unavailable(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}

impl Default for SegmentTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_resolves_cache_types() {
        let registry = SegmentTypeRegistry::builtin();
        assert!(registry.resolve("cache").unwrap().is_cache());
        assert_eq!(registry.resolve("error").unwrap().kind(), SegmentKind::Error);
        assert!(registry.resolve("error").unwrap().kind().is_virtual());
    }

    #[test]
    fn test_unknown_type_is_unavailable() {
        let registry = SegmentTypeRegistry::builtin().without("cache");
        assert!(matches!(
            registry.resolve("cache"),
            Err(Error::SegmentTypeUnavailable { name }) if name == "cache"
        ));
        assert!(registry.resolve("raid9").is_err());
        assert!(!registry.names().any(|n| n == "cache"));
    }
}
