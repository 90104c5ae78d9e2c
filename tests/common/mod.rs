//! Shared fixtures: an `Order` aggregate and instrumented test stores.
#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use memoir::{
    aggregate::{Aggregate, Journal},
    event::{DomainEvent, EventPayload, EventRecord, EventRegistry, ProcessedInfo},
    publish::{PublishError, PublishFuture, Publisher},
    snapshot::{Snapshot, SnapshotStore},
    store::{AppendError, EventRecordStore, FetchQuery, NonEmpty, RecordStream},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub customer: String,
}

impl DomainEvent for OrderPlaced {
    const KIND: &'static str = "order-placed";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub sku: String,
    pub quantity: u32,
}

impl DomainEvent for ItemAdded {
    const KIND: &'static str = "item-added";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub sku: String,
}

impl DomainEvent for ItemRemoved {
    const KIND: &'static str = "item-removed";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    ItemAdded(ItemAdded),
    ItemRemoved(ItemRemoved),
}

impl EventPayload for OrderEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Placed(_) => OrderPlaced::KIND,
            Self::ItemAdded(_) => ItemAdded::KIND,
            Self::ItemRemoved(_) => ItemRemoved::KIND,
        }
    }

    fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Placed(e) => serde_json::to_vec(e),
            Self::ItemAdded(e) => serde_json::to_vec(e),
            Self::ItemRemoved(e) => serde_json::to_vec(e),
        }
    }
}

pub fn order_registry() -> EventRegistry<OrderEvent> {
    EventRegistry::new()
        .with(OrderEvent::Placed)
        .with(OrderEvent::ItemAdded)
        .with(OrderEvent::ItemRemoved)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: Uuid,
    customer: String,
    items: BTreeMap<String, u32>,
    journal: Journal<OrderEvent>,
}

impl Order {
    pub fn place(customer: impl Into<String>) -> Self {
        let mut order = Self::default();
        order.record(OrderEvent::Placed(OrderPlaced {
            order_id: Uuid::new_v4(),
            customer: customer.into(),
        }));
        order
    }

    pub fn add_item(&mut self, sku: impl Into<String>, quantity: u32) {
        self.record(OrderEvent::ItemAdded(ItemAdded {
            sku: sku.into(),
            quantity,
        }));
    }

    pub fn remove_item(&mut self, sku: impl Into<String>) {
        self.record(OrderEvent::ItemRemoved(ItemRemoved { sku: sku.into() }));
    }

    pub fn customer(&self) -> &str {
        &self.customer
    }

    pub fn items(&self) -> &BTreeMap<String, u32> {
        &self.items
    }

    fn record(&mut self, event: OrderEvent) {
        Aggregate::apply(self, &event);
        self.journal.push(event);
    }
}

impl Aggregate for Order {
    const KIND: &'static str = "order";

    type Event = OrderEvent;
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> u64 {
        self.journal.version()
    }

    fn is_empty(&self) -> bool {
        self.journal.is_empty()
    }

    fn apply(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.customer = e.customer.clone();
            }
            OrderEvent::ItemAdded(e) => {
                *self.items.entry(e.sku.clone()).or_insert(0) += e.quantity;
            }
            OrderEvent::ItemRemoved(e) => {
                self.items.remove(&e.sku);
            }
        }
        self.journal.advance();
    }

    fn uncommitted_events(&self) -> &[OrderEvent] {
        self.journal.pending()
    }

    fn mark_committed(&mut self) {
        self.journal.mark_committed();
    }
}

/// Raw order-stream record for injecting into a store directly, bypassing
/// the aggregate append path.
pub fn raw_record(aggregate_id: Uuid, version: u64, kind: &str, payload: &[u8]) -> EventRecord<Uuid> {
    EventRecord {
        event_id: Uuid::new_v4(),
        aggregate_id,
        aggregate_kind: Order::KIND.to_string(),
        stream_version: version,
        kind: kind.to_string(),
        payload: payload.to_vec(),
        occurred_at: chrono::Utc::now(),
    }
}

/// Counters shared with a [`ProbeStore`].
#[derive(Clone, Default)]
pub struct Probe {
    append_batches: Arc<AtomicUsize>,
    fetches: Arc<Mutex<Vec<FetchQuery<Uuid>>>>,
}

impl Probe {
    pub fn append_batches(&self) -> usize {
        self.append_batches.load(Ordering::SeqCst)
    }

    pub fn last_fetch(&self) -> Option<FetchQuery<Uuid>> {
        self.fetches.lock().unwrap().last().cloned()
    }
}

/// In-memory record store that counts appended batches and records fetch
/// queries.
#[derive(Clone, Default)]
pub struct ProbeStore {
    inner: memoir::store::inmemory::Store<Uuid>,
    probe: Probe,
}

impl ProbeStore {
    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

impl EventRecordStore for ProbeStore {
    type Error = Infallible;
    type Id = Uuid;

    fn append<'a>(
        &'a self,
        records: NonEmpty<EventRecord<Uuid>>,
    ) -> impl Future<Output = Result<(), AppendError<Infallible>>> + Send + 'a {
        self.probe.append_batches.fetch_add(1, Ordering::SeqCst);
        self.inner.append(records)
    }

    fn fetch<'a>(&'a self, query: &FetchQuery<Uuid>) -> RecordStream<'a, Uuid, Infallible> {
        self.probe.fetches.lock().unwrap().push(query.clone());
        self.inner.fetch(query)
    }

    fn mark_processed<'a>(
        &'a self,
        infos: Vec<ProcessedInfo>,
    ) -> impl Future<Output = Result<(), Infallible>> + Send + 'a {
        self.inner.mark_processed(infos)
    }
}

#[derive(Debug, Error)]
#[error("record store offline")]
pub struct StoreOffline;

/// Record store whose appends and fetches always fail.
#[derive(Clone, Copy, Default)]
pub struct FailingRecordStore;

impl EventRecordStore for FailingRecordStore {
    type Error = StoreOffline;
    type Id = Uuid;

    fn append<'a>(
        &'a self,
        _records: NonEmpty<EventRecord<Uuid>>,
    ) -> impl Future<Output = Result<(), AppendError<StoreOffline>>> + Send + 'a {
        std::future::ready(Err(AppendError::Storage(StoreOffline)))
    }

    fn fetch<'a>(&'a self, _query: &FetchQuery<Uuid>) -> RecordStream<'a, Uuid, StoreOffline> {
        Box::pin(tokio_stream::iter(vec![Err(StoreOffline)]))
    }

    fn mark_processed<'a>(
        &'a self,
        _infos: Vec<ProcessedInfo>,
    ) -> impl Future<Output = Result<(), StoreOffline>> + Send + 'a {
        std::future::ready(Err(StoreOffline))
    }
}

/// Snapshot store that records the version of every save.
#[derive(Clone, Default)]
pub struct CountingSnapshotStore {
    inner: memoir::snapshot::inmemory::Store<Uuid>,
    saved_versions: Arc<Mutex<Vec<u64>>>,
}

impl CountingSnapshotStore {
    pub fn saved_versions(&self) -> Vec<u64> {
        self.saved_versions.lock().unwrap().clone()
    }
}

impl SnapshotStore<Uuid> for CountingSnapshotStore {
    type Error = Infallible;

    fn save<'a>(
        &'a self,
        aggregate_kind: &'a str,
        snapshot: Snapshot<Uuid>,
    ) -> impl Future<Output = Result<(), Infallible>> + Send + 'a {
        self.saved_versions.lock().unwrap().push(snapshot.version);
        self.inner.save(aggregate_kind, snapshot)
    }

    fn load_latest<'a>(
        &'a self,
        aggregate_kind: &'a str,
        owner_id: &'a Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot<Uuid>>, Infallible>> + Send + 'a {
        self.inner.load_latest(aggregate_kind, owner_id)
    }
}

#[derive(Debug, Error)]
#[error("snapshot store offline")]
pub struct SnapshotOffline;

/// Snapshot store whose saves always fail and that never holds a snapshot.
#[derive(Clone, Copy, Default)]
pub struct FailingSnapshotStore;

impl SnapshotStore<Uuid> for FailingSnapshotStore {
    type Error = SnapshotOffline;

    fn save<'a>(
        &'a self,
        _aggregate_kind: &'a str,
        _snapshot: Snapshot<Uuid>,
    ) -> impl Future<Output = Result<(), SnapshotOffline>> + Send + 'a {
        std::future::ready(Err(SnapshotOffline))
    }

    fn load_latest<'a>(
        &'a self,
        _aggregate_kind: &'a str,
        _owner_id: &'a Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot<Uuid>>, SnapshotOffline>> + Send + 'a {
        std::future::ready(Ok(None))
    }
}

/// Snapshot store whose saves succeed but whose loads always fail.
#[derive(Clone, Copy, Default)]
pub struct LoadFailingSnapshotStore;

impl SnapshotStore<Uuid> for LoadFailingSnapshotStore {
    type Error = SnapshotOffline;

    fn save<'a>(
        &'a self,
        _aggregate_kind: &'a str,
        _snapshot: Snapshot<Uuid>,
    ) -> impl Future<Output = Result<(), SnapshotOffline>> + Send + 'a {
        std::future::ready(Ok(()))
    }

    fn load_latest<'a>(
        &'a self,
        _aggregate_kind: &'a str,
        _owner_id: &'a Uuid,
    ) -> impl Future<Output = Result<Option<Snapshot<Uuid>>, SnapshotOffline>> + Send + 'a {
        std::future::ready(Err(SnapshotOffline))
    }
}

/// Publisher that records the id of every published event.
#[derive(Clone, Default)]
pub struct CountingPublisher {
    seen: Arc<Mutex<Vec<Uuid>>>,
}

impl CountingPublisher {
    pub fn seen(&self) -> Vec<Uuid> {
        self.seen.lock().unwrap().clone()
    }
}

impl Publisher<Uuid> for CountingPublisher {
    fn publish<'a>(&'a self, record: &'a EventRecord<Uuid>) -> PublishFuture<'a> {
        self.seen.lock().unwrap().push(record.event_id);
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Publisher that always fails.
#[derive(Clone, Copy, Default)]
pub struct FailingPublisher;

impl Publisher<Uuid> for FailingPublisher {
    fn publish<'a>(&'a self, _record: &'a EventRecord<Uuid>) -> PublishFuture<'a> {
        Box::pin(std::future::ready(Err(PublishError::new(
            std::io::Error::other("broker unreachable"),
        ))))
    }
}
