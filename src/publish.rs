//! Post-commit event publication.
//!
//! After an aggregate store persists a batch, it hands each record to the
//! registered [`Publisher`]s. Publication is best-effort: a failing
//! publisher is logged and never fails the append that triggered it.

use std::{error::Error, pin::Pin};

use thiserror::Error as ThisError;

use crate::event::EventRecord;

/// Boxed future returned by [`Publisher::publish`].
pub type PublishFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;

/// Error raised by a publisher.
#[derive(Debug, ThisError)]
#[error("publish failed: {0}")]
pub struct PublishError(#[source] Box<dyn Error + Send + Sync>);

impl PublishError {
    pub fn new(source: impl Error + Send + Sync + 'static) -> Self {
        Self(Box::new(source))
    }
}

/// Receives freshly persisted event records.
///
/// Object-safe so an aggregate store can hold a heterogeneous list of
/// publishers.
pub trait Publisher<Id>: Send + Sync {
    fn publish<'a>(&'a self, record: &'a EventRecord<Id>) -> PublishFuture<'a>;
}
