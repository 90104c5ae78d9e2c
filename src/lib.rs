//! Event-sourced aggregate persistence with snapshot-accelerated replay.
//!
//! State changes are captured as immutable domain events appended to a
//! per-aggregate stream; current state is derived by replaying the stream.
//! The crate provides:
//!
//! - [`event`]: durable event records, payload encoding, and the decode
//!   registry.
//! - [`store`]: the append/fetch/mark-processed contract for event record
//!   storage, with optimistic compare-and-append concurrency, and an
//!   in-memory reference implementation.
//! - [`aggregate`]: the capability trait event-sourced domain types
//!   implement, plus the [`Journal`](aggregate::Journal) helper.
//! - [`aggregate_store`]: persisting and resolving aggregates, optionally
//!   accelerated by snapshots.
//! - [`snapshot`]: snapshot storage and the capture policy.
//! - [`publish`]: best-effort post-commit publication of persisted records.
//! - [`dedup`]: duplicate-delivery protection for event handlers.
//!
//! # Example
//!
//! ```ignore
//! let store = EventSourcedStore::<Order, _>::new(records, order_registry())
//!     .with_snapshots(snapshots, SnapshotPolicy::every(NonZeroU64::new(100).unwrap()));
//!
//! let mut order = store.resolve(&order_id).await?;
//! order.add_item("sku-1", 2);
//! store.append(&mut order).await?;
//! ```

pub mod aggregate;
pub mod aggregate_store;
pub mod dedup;
pub mod event;
pub mod publish;
pub mod snapshot;
pub mod store;
