//! Persisting and resolving aggregates through an event record store.
//!
//! [`EventSourcedStore`] implements [`AggregateStore`] on top of any
//! [`EventRecordStore`]: appending persists the aggregate's uncommitted
//! events as records, resolving replays the stream into a fresh instance.
//! Chaining [`with_snapshots`](EventSourcedStore::with_snapshots) produces a
//! snapshot-accelerated variant that resolves from the latest memento and
//! replays only the tail.

use nonempty::NonEmpty;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio_stream::StreamExt as _;
use uuid::Uuid;

use crate::{
    aggregate::Aggregate,
    event::{DecodeError, EventRecord, EventRegistry},
    publish::Publisher,
    snapshot::{NoSnapshots, Snapshot, SnapshotPolicy, SnapshotStore},
    store::{AppendError, ConcurrencyConflict, EventRecordStore, FetchQuery},
};

/// Persistence facade for a single aggregate type.
pub trait AggregateStore<A: Aggregate>: Send + Sync {
    type AppendError: std::error::Error + Send + Sync + 'static;
    type ResolveError: std::error::Error + Send + Sync + 'static;

    /// Persist the aggregate's uncommitted events and clear its buffer.
    ///
    /// A no-op when the buffer is empty. On success the events are durable,
    /// published, and the aggregate is marked committed; on failure the
    /// buffer is left intact so the caller can retry.
    ///
    /// # Errors
    ///
    /// Returns an implementation-specific error when encoding or persistence
    /// fails, including lost optimistic-concurrency races.
    fn append<'a>(
        &'a self,
        aggregate: &'a mut A,
    ) -> impl Future<Output = Result<(), Self::AppendError>> + Send + 'a;

    /// Rebuild the aggregate identified by `id` from its event history.
    ///
    /// # Errors
    ///
    /// Returns an implementation-specific error when the aggregate has no
    /// recorded events, or when fetching or decoding fails.
    fn resolve<'a>(
        &'a self,
        id: &'a A::Id,
    ) -> impl Future<Output = Result<A, Self::ResolveError>> + Send + 'a;
}

/// Error from appending through an [`EventSourcedStore`].
#[derive(Debug, Error)]
pub enum PersistError<StoreError>
where
    StoreError: std::error::Error,
{
    /// An uncommitted event could not be serialized; nothing was persisted.
    #[error("failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    /// The stream advanced since the aggregate was resolved.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying record store failure.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl<E> From<AppendError<E>> for PersistError<E>
where
    E: std::error::Error,
{
    fn from(err: AppendError<E>) -> Self {
        match err {
            AppendError::Conflict(conflict) => Self::Conflict(conflict),
            AppendError::Storage(e) => Self::Storage(e),
        }
    }
}

/// Error from resolving through an [`EventSourcedStore`].
#[derive(Debug, Error)]
pub enum ResolveError<StoreError>
where
    StoreError: std::error::Error,
{
    /// No events exist for the requested aggregate.
    #[error("no `{kind}` aggregate found with id {id}")]
    NotFound { kind: &'static str, id: String },
    /// Underlying record store failure.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    /// A stored record could not be decoded into a domain event.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Error from appending through a snapshot-accelerated store.
#[derive(Debug, Error)]
pub enum SnapshotPersistError<StoreError, SnapshotError>
where
    StoreError: std::error::Error,
    SnapshotError: std::error::Error,
{
    /// An event payload or snapshot memento could not be serialized.
    #[error("failed to encode: {0}")]
    Encode(#[source] serde_json::Error),
    /// The stream advanced since the aggregate was resolved.
    #[error(transparent)]
    Conflict(#[from] ConcurrencyConflict),
    /// Underlying record store failure.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    /// The snapshot store rejected the capture; no events were appended.
    #[error("snapshot capture failed: {0}")]
    Snapshot(#[source] SnapshotError),
}

impl<E, SE> From<PersistError<E>> for SnapshotPersistError<E, SE>
where
    E: std::error::Error,
    SE: std::error::Error,
{
    fn from(err: PersistError<E>) -> Self {
        match err {
            PersistError::Encode(e) => Self::Encode(e),
            PersistError::Conflict(conflict) => Self::Conflict(conflict),
            PersistError::Storage(e) => Self::Storage(e),
        }
    }
}

/// Error from resolving through a snapshot-accelerated store.
#[derive(Debug, Error)]
pub enum SnapshotResolveError<StoreError>
where
    StoreError: std::error::Error,
{
    /// No events exist for the requested aggregate.
    #[error("no `{kind}` aggregate found with id {id}")]
    NotFound { kind: &'static str, id: String },
    /// Underlying record store failure.
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
    /// A stored record could not be decoded into a domain event.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The stored snapshot memento could not be deserialized.
    #[error("failed to decode snapshot: {0}")]
    SnapshotDecode(#[source] serde_json::Error),
}

impl<E> From<ResolveError<E>> for SnapshotResolveError<E>
where
    E: std::error::Error,
{
    fn from(err: ResolveError<E>) -> Self {
        match err {
            ResolveError::NotFound { kind, id } => Self::NotFound { kind, id },
            ResolveError::Storage(e) => Self::Storage(e),
            ResolveError::Decode(e) => Self::Decode(e),
        }
    }
}

/// Snapshot store and policy carried by a snapshot-accelerated
/// [`EventSourcedStore`].
pub struct Snapshots<SS> {
    store: SS,
    policy: SnapshotPolicy,
}

/// [`AggregateStore`] backed by an [`EventRecordStore`].
///
/// The third type parameter selects the snapshotting mode at compile time:
/// [`NoSnapshots`] (the default) always replays the full stream, while
/// [`Snapshots`] resolves from the latest memento and captures new ones per
/// its [`SnapshotPolicy`].
pub struct EventSourcedStore<A: Aggregate, S: EventRecordStore, M = NoSnapshots> {
    records: S,
    registry: EventRegistry<A::Event>,
    publishers: Vec<Box<dyn Publisher<S::Id>>>,
    snapshots: M,
}

impl<A, S> EventSourcedStore<A, S, NoSnapshots>
where
    A: Aggregate,
    S: EventRecordStore,
{
    #[must_use]
    pub fn new(records: S, registry: EventRegistry<A::Event>) -> Self {
        Self {
            records,
            registry,
            publishers: Vec::new(),
            snapshots: NoSnapshots,
        }
    }

    /// Upgrade to a snapshot-accelerated store.
    #[must_use]
    pub fn with_snapshots<SS>(
        self,
        store: SS,
        policy: SnapshotPolicy,
    ) -> EventSourcedStore<A, S, Snapshots<SS>>
    where
        SS: SnapshotStore<S::Id>,
    {
        EventSourcedStore {
            records: self.records,
            registry: self.registry,
            publishers: self.publishers,
            snapshots: Snapshots { store, policy },
        }
    }
}

impl<A, S, M> EventSourcedStore<A, S, M>
where
    A: Aggregate,
    S: EventRecordStore,
{
    /// Register a publisher to receive every persisted record.
    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Publisher<S::Id> + 'static) -> Self {
        self.publishers.push(Box::new(publisher));
        self
    }
}

impl<A, S, M> EventSourcedStore<A, S, M>
where
    A: Aggregate<Id = S::Id>,
    S: EventRecordStore,
    M: Send + Sync,
{
    fn pending_records(&self, aggregate: &A) -> Result<Vec<EventRecord<S::Id>>, serde_json::Error> {
        use crate::event::EventPayload as _;

        let pending = aggregate.uncommitted_events();
        let base = aggregate
            .version()
            .checked_sub(pending.len() as u64)
            .expect("aggregate version must count every uncommitted event");
        pending
            .iter()
            .enumerate()
            .map(|(offset, event)| {
                Ok(EventRecord {
                    event_id: Uuid::new_v4(),
                    aggregate_id: aggregate.id(),
                    aggregate_kind: A::KIND.to_string(),
                    stream_version: base + offset as u64 + 1,
                    kind: event.kind().to_string(),
                    payload: event.encode()?,
                    occurred_at: chrono::Utc::now(),
                })
            })
            .collect()
    }

    #[tracing::instrument(skip_all, fields(aggregate_kind = A::KIND))]
    async fn append_pending(&self, aggregate: &mut A) -> Result<(), PersistError<S::Error>> {
        let records = self.pending_records(aggregate).map_err(PersistError::Encode)?;
        let Some(batch) = NonEmpty::from_vec(records.clone()) else {
            tracing::trace!("no uncommitted events, nothing to append");
            return Ok(());
        };
        self.records.append(batch).await?;
        tracing::debug!(record_count = records.len(), "events appended");

        // Publication is best-effort; the events are already durable.
        for record in &records {
            for publisher in &self.publishers {
                if let Err(e) = publisher.publish(record).await {
                    tracing::warn!(error = %e, event_id = %record.event_id, "publisher failed");
                }
            }
        }

        aggregate.mark_committed();
        Ok(())
    }

    async fn replay_into(
        &self,
        aggregate: &mut A,
        query: &FetchQuery<S::Id>,
    ) -> Result<(), ResolveError<S::Error>> {
        let mut stream = self.records.fetch(query);
        while let Some(record) = stream.next().await {
            let record = record.map_err(ResolveError::Storage)?;
            let event = self.registry.decode(&record.kind, &record.payload)?;
            aggregate.apply(&event);
        }
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(aggregate_kind = A::KIND, aggregate_id = ?id))]
    async fn resolve_full(&self, id: &S::Id) -> Result<A, ResolveError<S::Error>> {
        let mut aggregate = A::default();
        let query = FetchQuery::for_aggregate(A::KIND, id.clone());
        self.replay_into(&mut aggregate, &query).await?;
        if aggregate.is_empty() {
            return Err(ResolveError::NotFound {
                kind: A::KIND,
                id: format!("{id:?}"),
            });
        }
        tracing::debug!(version = aggregate.version(), "aggregate replayed");
        Ok(aggregate)
    }
}

impl<A, S> AggregateStore<A> for EventSourcedStore<A, S, NoSnapshots>
where
    A: Aggregate<Id = S::Id>,
    S: EventRecordStore,
{
    type AppendError = PersistError<S::Error>;
    type ResolveError = ResolveError<S::Error>;

    fn append<'a>(
        &'a self,
        aggregate: &'a mut A,
    ) -> impl Future<Output = Result<(), Self::AppendError>> + Send + 'a {
        self.append_pending(aggregate)
    }

    fn resolve<'a>(
        &'a self,
        id: &'a A::Id,
    ) -> impl Future<Output = Result<A, Self::ResolveError>> + Send + 'a {
        self.resolve_full(id)
    }
}

impl<A, S, SS> AggregateStore<A> for EventSourcedStore<A, S, Snapshots<SS>>
where
    A: Aggregate<Id = S::Id> + Serialize + DeserializeOwned,
    S: EventRecordStore,
    SS: SnapshotStore<S::Id>,
{
    type AppendError = SnapshotPersistError<S::Error, SS::Error>;
    type ResolveError = SnapshotResolveError<S::Error>;

    fn append<'a>(
        &'a self,
        aggregate: &'a mut A,
    ) -> impl Future<Output = Result<(), Self::AppendError>> + Send + 'a {
        async move {
            // The snapshot boundary is judged against the version the stream
            // will reach once the pending events commit; capture happens
            // before the append so a capture failure keeps the buffer intact.
            let version = aggregate.version();
            if self.snapshots.policy.due(version) {
                let data =
                    serde_json::to_vec(&*aggregate).map_err(SnapshotPersistError::Encode)?;
                let snapshot = Snapshot {
                    owner_id: aggregate.id(),
                    version,
                    data,
                };
                self.snapshots
                    .store
                    .save(A::KIND, snapshot)
                    .await
                    .map_err(SnapshotPersistError::Snapshot)?;
                tracing::debug!(version, aggregate_kind = A::KIND, "snapshot captured");
            }
            self.append_pending(aggregate).await?;
            Ok(())
        }
    }

    fn resolve<'a>(
        &'a self,
        id: &'a A::Id,
    ) -> impl Future<Output = Result<A, Self::ResolveError>> + Send + 'a {
        async move {
            if !self.snapshots.policy.is_enabled() {
                return Ok(self.resolve_full(id).await?);
            }
            let snapshot = match self.snapshots.store.load_latest(A::KIND, id).await {
                Ok(found) => found,
                Err(e) => {
                    // A missing or unreadable snapshot store must not make
                    // the aggregate unreadable.
                    tracing::error!(error = %e, "snapshot load failed, falling back to full replay");
                    None
                }
            };
            let Some(snapshot) = snapshot else {
                return Ok(self.resolve_full(id).await?);
            };

            let mut aggregate: A = serde_json::from_slice(&snapshot.data)
                .map_err(SnapshotResolveError::SnapshotDecode)?;
            let query = FetchQuery::for_aggregate(A::KIND, id.clone()).after(snapshot.version);
            self.replay_into(&mut aggregate, &query).await?;
            tracing::debug!(
                snapshot_version = snapshot.version,
                version = aggregate.version(),
                "aggregate resolved from snapshot"
            );
            Ok(aggregate)
        }
    }
}

/// Scoped edit-then-commit handle over an [`AggregateStore`].
///
/// Acquiring resolves the aggregate; the handle dereferences to it for
/// mutation. [`commit`](Self::commit) persists the recorded events and hands
/// the aggregate back. Dropping the handle without committing discards the
/// edits, which makes rollback the explicit default rather than an implicit
/// save.
#[must_use = "edits are discarded unless the unit of work is committed"]
pub struct UnitOfWork<'s, A, T>
where
    A: Aggregate,
    T: AggregateStore<A>,
{
    store: &'s T,
    aggregate: A,
}

impl<'s, A, T> UnitOfWork<'s, A, T>
where
    A: Aggregate,
    T: AggregateStore<A>,
{
    /// Resolve the aggregate identified by `id` into an editable handle.
    ///
    /// # Errors
    ///
    /// Returns the store's resolve error when the aggregate cannot be
    /// rebuilt.
    pub async fn acquire(store: &'s T, id: &A::Id) -> Result<Self, T::ResolveError> {
        let aggregate = store.resolve(id).await?;
        Ok(Self { store, aggregate })
    }

    /// Persist the recorded events and return the committed aggregate.
    ///
    /// # Errors
    ///
    /// Returns the store's append error. The handle is consumed either way;
    /// on a lost concurrency race the caller should re-acquire and retry.
    pub async fn commit(mut self) -> Result<A, T::AppendError> {
        self.store.append(&mut self.aggregate).await?;
        Ok(self.aggregate)
    }
}

impl<A, T> std::ops::Deref for UnitOfWork<'_, A, T>
where
    A: Aggregate,
    T: AggregateStore<A>,
{
    type Target = A;

    fn deref(&self) -> &A {
        &self.aggregate
    }
}

impl<A, T> std::ops::DerefMut for UnitOfWork<'_, A, T>
where
    A: Aggregate,
    T: AggregateStore<A>,
{
    fn deref_mut(&mut self) -> &mut A {
        &mut self.aggregate
    }
}
