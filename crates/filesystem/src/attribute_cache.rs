//! Attribute freshness policy.
//!
//! Snapshots are attached to paths by listings and metadata lookups. Nothing
//! evicts them; staleness is checked when a snapshot is about to be used.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;

use crate::attributes::CachedAttributes;

/// Default time a snapshot stays fresh.
pub const DEFAULT_ATTRIBUTE_CACHE_TTL: Duration = Duration::from_secs(60);

/// Decides whether an attributes snapshot may still be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeCache {
    ttl: Duration,
    enabled: bool,
}

impl AttributeCache {
    /// Create a policy with the given time-to-live.
    ///
    /// # Arguments
    /// * `ttl` - Maximum age of a usable snapshot
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, enabled: true }
    }

    /// A policy under which no snapshot is ever fresh.
    pub fn disabled() -> Self {
        Self {
            ttl: Duration::ZERO,
            enabled: false,
        }
    }

    /// A policy under which every snapshot is fresh.
    pub fn always_fresh() -> Self {
        Self::new(Duration::MAX)
    }

    /// Time-to-live of this policy.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Whether snapshots are used at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Check a snapshot against the wall clock.
    ///
    /// # Arguments
    /// * `snapshot` - Snapshot attached to a path, if any
    ///
    /// # Returns
    /// `true` if the snapshot exists and is no older than the TTL.
    pub fn is_in_time(&self, snapshot: Option<&CachedAttributes>) -> bool {
        self.is_in_time_at(snapshot, SystemTime::now())
    }

    /// Check a snapshot against an explicit clock reading.
    ///
    /// A fetch time later than `now` counts as zero elapsed time.
    pub fn is_in_time_at(&self, snapshot: Option<&CachedAttributes>, now: SystemTime) -> bool {
        if !self.enabled {
            return false;
        }
        let Some(snapshot) = snapshot else {
            return false;
        };
        let elapsed: Duration = now
            .duration_since(snapshot.fetched_at())
            .unwrap_or(Duration::ZERO);
        elapsed <= self.ttl
    }
}

impl Default for AttributeCache {
    fn default() -> Self {
        Self::new(DEFAULT_ATTRIBUTE_CACHE_TTL)
    }
}

/// Swappable attribute cache policy shared by every filesystem of a provider.
#[derive(Debug, Clone, Default)]
pub struct SharedAttributeCache {
    inner: Arc<RwLock<AttributeCache>>,
}

impl SharedAttributeCache {
    /// Share the given policy.
    pub fn new(cache: AttributeCache) -> Self {
        Self {
            inner: Arc::new(RwLock::new(cache)),
        }
    }

    /// Current policy.
    pub fn get(&self) -> AttributeCache {
        *self.inner.read()
    }

    /// Replace the policy for every holder of this handle.
    pub fn replace(&self, cache: AttributeCache) {
        *self.inner.write() = cache;
    }

    /// Check a snapshot under the current policy.
    pub fn is_in_time(&self, snapshot: Option<&CachedAttributes>) -> bool {
        self.get().is_in_time(snapshot)
    }
}
