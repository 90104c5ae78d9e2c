//! Duplicate-delivery protection for event handlers.
//!
//! At-least-once transports redeliver. [`DedupGuard`] wraps an
//! [`EventHandler`] and skips an incoming event when a fingerprint query
//! against the record store already matches, so the inner handler only sees
//! each logical event once. The guard is a read-side check, not a lock: two
//! racing deliveries of the same event may both pass it.

use thiserror::Error;
use tokio_stream::StreamExt as _;

use crate::store::{EventRecordStore, FetchQuery};

/// What [`DedupGuard::handle`] did with an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event was new and the inner handler ran.
    Handled,
    /// The fingerprint matched a stored record; the inner handler was not
    /// invoked.
    SkippedDuplicate,
}

/// Processes a single incoming event.
pub trait EventHandler<E>: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process one event.
    ///
    /// # Errors
    ///
    /// Returns a handler-specific error when processing fails.
    fn handle<'a>(
        &'a self,
        event: &'a E,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

/// Error from [`DedupGuard::handle`].
#[derive(Debug, Error)]
pub enum GuardError<StoreError, HandlerError>
where
    StoreError: std::error::Error,
    HandlerError: std::error::Error,
{
    /// The fingerprint query failed; whether the event is a duplicate is
    /// unknown and the inner handler was not invoked.
    #[error("fingerprint query failed: {0}")]
    Store(#[source] StoreError),
    /// The inner handler failed.
    #[error(transparent)]
    Handler(HandlerError),
}

/// Deduplicating decorator around an [`EventHandler`].
///
/// `fingerprint` maps an incoming event to the [`FetchQuery`] that would
/// match its already-stored form. Any matching record at all counts as a
/// duplicate, so the query should be as narrow as the event's identity
/// allows.
pub struct DedupGuard<H, S, F> {
    inner: H,
    records: S,
    fingerprint: F,
}

impl<H, S, F> DedupGuard<H, S, F> {
    pub fn new(inner: H, records: S, fingerprint: F) -> Self {
        Self {
            inner,
            records,
            fingerprint,
        }
    }
}

impl<H, S, F> DedupGuard<H, S, F>
where
    S: EventRecordStore,
{
    /// Run the inner handler unless the event's fingerprint already matches
    /// a stored record.
    ///
    /// # Errors
    ///
    /// Returns [`GuardError::Store`] when the fingerprint query fails and
    /// [`GuardError::Handler`] when the inner handler fails.
    #[tracing::instrument(skip_all)]
    pub async fn handle<E>(&self, event: &E) -> Result<Outcome, GuardError<S::Error, H::Error>>
    where
        H: EventHandler<E>,
        E: Sync,
        F: Fn(&E) -> FetchQuery<S::Id> + Send + Sync,
    {
        let query = (self.fingerprint)(event).limit(1);
        let mut matches = self.records.fetch(&query);
        if let Some(record) = matches.next().await {
            let record = record.map_err(GuardError::Store)?;
            tracing::debug!(event_id = %record.event_id, "duplicate event skipped");
            return Ok(Outcome::SkippedDuplicate);
        }
        drop(matches);

        self.inner.handle(event).await.map_err(GuardError::Handler)?;
        Ok(Outcome::Handled)
    }
}
