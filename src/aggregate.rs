//! Aggregate capability trait and the [`Journal`] helper.
//!
//! An aggregate is an in-memory entity whose state is derived by replaying
//! its event history. While application logic mutates it, the aggregate
//! buffers the produced events until an
//! [`AggregateStore`](crate::aggregate_store::AggregateStore) persists them
//! and marks them committed.

use serde::{Deserialize, Serialize};

use crate::event::EventPayload;

/// Capability set implemented by event-sourced domain types.
///
/// Invariant: `version()` equals the count of events ever applied, historical
/// and uncommitted alike, and is monotonically non-decreasing. Each call to
/// [`apply`](Self::apply) must increment it by exactly 1; embedding a
/// [`Journal`] and calling [`Journal::advance`] from `apply` keeps that
/// invariant in one place. Stores assume the invariant holds and panic when
/// an aggregate buffers more uncommitted events than its version accounts
/// for.
pub trait Aggregate: Default + Send + Sync {
    /// Aggregate type identifier used by the stores.
    ///
    /// Use lowercase kebab-case for consistency: `"order"`,
    /// `"user-account"`, etc.
    const KIND: &'static str;

    type Id: Clone + Send + Sync + 'static;
    type Event: EventPayload + Send + Sync;

    /// The aggregate's identity.
    ///
    /// Identity is established by the aggregate's first event; the value
    /// returned before any event has been applied is unspecified.
    fn id(&self) -> Self::Id;

    /// Stream position of the last applied event. Starts at 0.
    fn version(&self) -> u64;

    /// True until at least one event has been applied.
    fn is_empty(&self) -> bool;

    /// Apply an event to mutate internal state.
    ///
    /// Called both during replay and when application logic records a new
    /// event. Increments [`version`](Self::version) by exactly 1.
    fn apply(&mut self, event: &Self::Event);

    /// Events recorded since the last commit, in application order.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clear the uncommitted buffer after the events have been persisted.
    fn mark_committed(&mut self);
}

/// Version counter and uncommitted-event buffer for embedding in aggregates.
///
/// The pending buffer is skipped during serialization, so a serialized
/// aggregate doubles as a snapshot memento: deserializing it restores state
/// and version without replaying any events.
///
/// ```ignore
/// #[derive(Default, Serialize, Deserialize)]
/// struct Order {
///     items: BTreeMap<String, u32>,
///     journal: Journal<OrderEvent>,
/// }
///
/// impl Order {
///     fn record(&mut self, event: OrderEvent) {
///         Aggregate::apply(self, &event); // mutates state, advances journal
///         self.journal.push(event);
///     }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Journal<E> {
    version: u64,
    #[serde(skip)]
    pending: Vec<E>,
}

impl<E> Journal<E> {
    /// Create a journal at version 0 with no pending events.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            version: 0,
            pending: Vec::new(),
        }
    }

    /// Stream position of the last applied event.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// True until at least one event has been applied.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.version == 0
    }

    /// Register that one event has been applied.
    pub const fn advance(&mut self) {
        self.version += 1;
    }

    /// Buffer a freshly recorded event until it is committed.
    pub fn push(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Events recorded since the last commit.
    #[must_use]
    pub fn pending(&self) -> &[E] {
        &self.pending
    }

    /// Drop the pending buffer once the events are durable.
    pub fn mark_committed(&mut self) {
        self.pending.clear();
    }
}

impl<E> Default for Journal<E> {
    fn default() -> Self {
        Self::new()
    }
}
