//! The event record store contract.
//!
//! This module describes durable, queryable append-only storage of
//! [`EventRecord`]s: the append/fetch/mark-processed contract
//! ([`EventRecordStore`]), fetch queries, the optimistic-concurrency conflict
//! type, and a reference in-memory implementation.

use std::{future::Future, pin::Pin};

use futures_core::Stream;
pub use nonempty::NonEmpty;
use thiserror::Error;

use crate::event::{EventRecord, ProcessedInfo};

pub mod inmemory;

/// Lazy, forward-only, finite sequence of event records.
pub type RecordStream<'a, Id, E> =
    Pin<Box<dyn Stream<Item = Result<EventRecord<Id>, E>> + Send + 'a>>;

/// Ordering of fetched records by stream version.
///
/// Callers resolving aggregates must request [`Order::Ascending`]; the store
/// does not enforce replay ordering on its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Filter, ordering, and pagination for [`EventRecordStore::fetch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchQuery<Id> {
    pub aggregate_kind: Option<String>,
    pub aggregate_id: Option<Id>,
    pub event_kind: Option<String>,
    /// Only fetch records with stream version strictly greater than this.
    /// Used for snapshot-based loading to skip already-applied events.
    pub after_version: Option<u64>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl<Id> FetchQuery<Id> {
    /// Fetch every record for a single aggregate instance.
    #[must_use]
    pub fn for_aggregate(aggregate_kind: impl Into<String>, aggregate_id: Id) -> Self {
        Self {
            aggregate_kind: Some(aggregate_kind.into()),
            aggregate_id: Some(aggregate_id),
            event_kind: None,
            after_version: None,
            order: Order::Ascending,
            limit: None,
        }
    }

    /// Fetch every record of the specified event kind across all aggregates.
    #[must_use]
    pub fn for_event(event_kind: impl Into<String>) -> Self {
        Self {
            aggregate_kind: None,
            aggregate_id: None,
            event_kind: Some(event_kind.into()),
            after_version: None,
            order: Order::Ascending,
            limit: None,
        }
    }

    /// Restrict to a single event kind.
    #[must_use]
    pub fn event_kind(mut self, kind: impl Into<String>) -> Self {
        self.event_kind = Some(kind.into());
        self
    }

    /// Only fetch records with stream version strictly greater than `version`.
    #[must_use]
    pub const fn after(mut self, version: u64) -> Self {
        self.after_version = Some(version);
        self
    }

    /// Order results by descending stream version.
    #[must_use]
    pub const fn descending(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    /// Stop after at most `limit` records.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Error indicating that an append lost an optimistic-concurrency race.
///
/// Appends are compare-and-append: a batch is rejected when its lowest stream
/// version does not immediately follow the highest version currently stored
/// for that aggregate. The loser should reload the aggregate and retry its
/// business logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "concurrency conflict: attempted to write version {attempted}, stream expects {expected} \
     (hint: stream was modified; reload and retry)"
)]
pub struct ConcurrencyConflict {
    /// The version the store required next for the stream.
    pub expected: u64,
    /// The version the rejected batch attempted to write.
    pub attempted: u64,
}

/// Error from [`EventRecordStore::append`].
#[derive(Debug, Error)]
pub enum AppendError<StoreError>
where
    StoreError: std::error::Error,
{
    /// A stream version in the batch collided with the stored stream.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying I/O failure; the batch was not persisted.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

/// Abstraction over durable append-only event storage.
///
/// Records are keyed by aggregate identity and per-aggregate stream version.
/// The store never retries and never reorders; ordering of fetch results is
/// whatever the caller's [`FetchQuery`] requests.
pub trait EventRecordStore: Send + Sync {
    /// Aggregate identifier type.
    type Id: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Store-specific error type for I/O failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a batch of event records atomically.
    ///
    /// All-or-nothing: either every record in the batch becomes durable or
    /// none does. For each aggregate in the batch the records must form a
    /// contiguous run starting immediately after the stored stream head.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::Conflict`] when a stream version collides with
    /// an already-stored version, or [`AppendError::Storage`] on I/O failure.
    fn append<'a>(
        &'a self,
        records: NonEmpty<EventRecord<Self::Id>>,
    ) -> impl Future<Output = Result<(), AppendError<Self::Error>>> + Send + 'a;

    /// Fetch records matching the query as a lazy stream.
    fn fetch<'a>(&'a self, query: &FetchQuery<Self::Id>) -> RecordStream<'a, Self::Id, Self::Error>;

    /// Record consumer-side processing outcomes.
    ///
    /// Idempotent per `event_id`: marking the same event twice keeps the
    /// first recorded outcome.
    ///
    /// # Errors
    ///
    /// Returns a store-specific error on I/O failure.
    fn mark_processed<'a>(
        &'a self,
        infos: Vec<ProcessedInfo>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct StreamKey<Id> {
    aggregate_kind: String,
    aggregate_id: Id,
}

impl<Id> StreamKey<Id> {
    pub(crate) fn new(aggregate_kind: impl Into<String>, aggregate_id: Id) -> Self {
        Self {
            aggregate_kind: aggregate_kind.into(),
            aggregate_id,
        }
    }
}
