//! In-memory event record store for testing and examples.
//!
//! This module provides [`Store`], a thread-safe reference implementation of
//! [`EventRecordStore`](super::EventRecordStore). It enforces the same
//! compare-and-append contract a durable backend must provide, but keeps
//! everything in process memory.

use std::{
    collections::HashMap,
    convert::Infallible,
    sync::{Arc, RwLock},
};

use nonempty::NonEmpty;
use uuid::Uuid;

use crate::{
    event::{EventRecord, ProcessedInfo},
    store::{
        AppendError, ConcurrencyConflict, EventRecordStore, FetchQuery, Order, RecordStream,
        StreamKey,
    },
};

/// In-memory event record store that keeps one vector per stream.
///
/// Cloning is cheap and shares the underlying storage, which makes it easy
/// to point several stores at the same log in tests.
///
/// Generic over the aggregate identifier type `Id` (must be hashable for map
/// keys).
#[derive(Clone)]
pub struct Store<Id> {
    inner: Arc<RwLock<Inner<Id>>>,
}

struct Inner<Id> {
    streams: HashMap<StreamKey<Id>, Vec<EventRecord<Id>>>,
    processed: HashMap<Uuid, ProcessedInfo>,
}

impl<Id> Store<Id> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                streams: HashMap::new(),
                processed: HashMap::new(),
            })),
        }
    }

    /// The recorded processing outcome for an event, if any.
    #[must_use]
    pub fn processed_info(&self, event_id: Uuid) -> Option<ProcessedInfo> {
        let inner = self.inner.read().expect("in-memory store lock poisoned");
        inner.processed.get(&event_id).cloned()
    }
}

impl<Id> Default for Store<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id> EventRecordStore for Store<Id>
where
    Id: Clone + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static,
{
    type Error = Infallible;
    type Id = Id;

    #[tracing::instrument(skip(self, records), fields(record_count = records.len()))]
    fn append<'a>(
        &'a self,
        records: NonEmpty<EventRecord<Self::Id>>,
    ) -> impl Future<Output = Result<(), AppendError<Self::Error>>> + Send + 'a {
        let result = (|| {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");

            // Validate the whole batch before touching any stream, so a
            // conflict anywhere leaves the store unchanged.
            let mut next_versions: HashMap<StreamKey<Id>, u64> = HashMap::new();
            for record in &records {
                let key = StreamKey::new(record.aggregate_kind.clone(), record.aggregate_id.clone());
                let expected = next_versions.entry(key.clone()).or_insert_with(|| {
                    inner
                        .streams
                        .get(&key)
                        .and_then(|stream| stream.last())
                        .map_or(1, |head| head.stream_version + 1)
                });
                if record.stream_version != *expected {
                    tracing::debug!(
                        attempted = record.stream_version,
                        expected = *expected,
                        "version mismatch, rejecting batch"
                    );
                    return Err(ConcurrencyConflict {
                        expected: *expected,
                        attempted: record.stream_version,
                    }
                    .into());
                }
                *expected += 1;
            }

            for record in records {
                let key = StreamKey::new(record.aggregate_kind.clone(), record.aggregate_id.clone());
                inner.streams.entry(key).or_default().push(record);
            }
            drop(inner);
            tracing::debug!("batch appended");
            Ok(())
        })();

        std::future::ready(result)
    }

    #[tracing::instrument(skip(self, query))]
    fn fetch<'a>(&'a self, query: &FetchQuery<Self::Id>) -> RecordStream<'a, Self::Id, Self::Error> {
        let mut matched: Vec<EventRecord<Id>> = {
            let inner = self.inner.read().expect("in-memory store lock poisoned");
            inner
                .streams
                .values()
                .flatten()
                .filter(|record| {
                    query
                        .aggregate_kind
                        .as_ref()
                        .is_none_or(|kind| record.aggregate_kind == *kind)
                        && query
                            .aggregate_id
                            .as_ref()
                            .is_none_or(|id| record.aggregate_id == *id)
                        && query
                            .event_kind
                            .as_ref()
                            .is_none_or(|kind| record.kind == *kind)
                        && query
                            .after_version
                            .is_none_or(|after| record.stream_version > after)
                })
                .cloned()
                .collect()
        };

        match query.order {
            Order::Ascending => matched.sort_by_key(|record| record.stream_version),
            Order::Descending => {
                matched.sort_by_key(|record| std::cmp::Reverse(record.stream_version));
            }
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }

        tracing::trace!(records_matched = matched.len(), "fetch query evaluated");
        Box::pin(tokio_stream::iter(matched.into_iter().map(Ok)))
    }

    #[tracing::instrument(skip(self, infos), fields(info_count = infos.len()))]
    fn mark_processed<'a>(
        &'a self,
        infos: Vec<ProcessedInfo>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a {
        {
            let mut inner = self.inner.write().expect("in-memory store lock poisoned");
            for info in infos {
                inner.processed.entry(info.event_id).or_insert(info);
            }
        }
        std::future::ready(Ok(()))
    }
}
