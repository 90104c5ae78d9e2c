//! Snapshot storage and the snapshotting policy.
//!
//! A snapshot is a serialized memento of an aggregate at a known stream
//! version. Resolving an aggregate from a snapshot skips replaying the
//! events it already covers; only the tail after `version` is fetched.

use std::num::NonZeroU64;

pub mod inmemory;

/// Serialized aggregate state captured at a stream version.
///
/// `data` is the aggregate's own serialization (its pending-event buffer is
/// excluded), so deserializing it restores both state and version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot<Id> {
    /// Aggregate instance this snapshot belongs to.
    pub owner_id: Id,
    /// Stream version of the last event covered by the snapshot.
    pub version: u64,
    /// Serialized aggregate memento.
    pub data: Vec<u8>,
}

/// Abstraction over snapshot persistence.
///
/// Only the latest snapshot per aggregate matters for resolution; a backend
/// may discard older ones.
pub trait SnapshotStore<Id>: Send + Sync {
    /// Store-specific error type for I/O failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a snapshot for an aggregate of the given kind.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error on I/O failure.
    fn save<'a>(
        &'a self,
        aggregate_kind: &'a str,
        snapshot: Snapshot<Id>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

    /// Load the highest-version snapshot for an aggregate, if one exists.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error on I/O failure.
    fn load_latest<'a>(
        &'a self,
        aggregate_kind: &'a str,
        owner_id: &'a Id,
    ) -> impl Future<Output = Result<Option<Snapshot<Id>>, Self::Error>> + Send + 'a;
}

/// When to capture snapshots.
///
/// An enabled policy with frequency `f` snapshots whenever the aggregate's
/// version is a positive multiple of `f`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotPolicy {
    enabled: bool,
    frequency: NonZeroU64,
}

impl SnapshotPolicy {
    /// Snapshot at every multiple of `frequency`.
    #[must_use]
    pub const fn every(frequency: NonZeroU64) -> Self {
        Self {
            enabled: true,
            frequency,
        }
    }

    /// Never snapshot; resolution always replays the full stream.
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            frequency: NonZeroU64::MIN,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether an aggregate at `version` is due for a snapshot.
    #[must_use]
    pub const fn due(&self, version: u64) -> bool {
        self.enabled && version > 0 && version % self.frequency.get() == 0
    }
}

/// Marker for aggregate stores that do not snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoSnapshots;
