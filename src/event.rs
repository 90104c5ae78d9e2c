//! Event records, payload encoding, and the decode registry.
//!
//! Events are persisted as [`EventRecord`]s: an opaque payload plus the
//! metadata the store needs for ordering and routing. The [`EventRegistry`]
//! maps a record's `kind` discriminator back to a typed domain event when an
//! aggregate is rebuilt.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use uuid::Uuid;

/// Durable form of a domain event.
///
/// `stream_version` is the position of the event within its aggregate's
/// stream. For a given aggregate the versions form a gap-free increasing
/// sequence starting at 1.
///
/// Generic over the aggregate identifier type `Id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord<Id> {
    /// Unique identifier for this event.
    pub event_id: Uuid,
    /// Aggregate instance this event belongs to.
    pub aggregate_id: Id,
    /// Aggregate type identifier (`Aggregate::KIND`).
    pub aggregate_kind: String,
    /// Position within the aggregate's stream, starting at 1.
    pub stream_version: u64,
    /// Event type discriminator used for decode routing.
    pub kind: String,
    /// Serialized event payload.
    pub payload: Vec<u8>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

/// Consumer-side processing outcome for an event.
///
/// Recorded independently of the event payload via
/// [`EventRecordStore::mark_processed`](crate::store::EventRecordStore::mark_processed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedInfo {
    /// Identifier of the processed event.
    pub event_id: Uuid,
    /// When the consumer finished processing.
    pub processed_on: DateTime<Utc>,
    /// Error message when processing failed, `None` on success.
    pub error_message: Option<String>,
}

impl ProcessedInfo {
    /// Record a successful processing outcome, timestamped now.
    #[must_use]
    pub fn ok(event_id: Uuid) -> Self {
        Self {
            event_id,
            processed_on: Utc::now(),
            error_message: None,
        }
    }

    /// Record a failed processing outcome, timestamped now.
    #[must_use]
    pub fn failed(event_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            event_id,
            processed_on: Utc::now(),
            error_message: Some(message.into()),
        }
    }
}

/// Marker trait for concrete event structs.
///
/// Each event carries a unique [`Self::KIND`] identifier so stored bytes can
/// be routed back to the correct type when rebuilding aggregates.
pub trait DomainEvent {
    const KIND: &'static str;
}

/// Event sum types that can serialize their variants for persistence.
///
/// Implemented by the aggregate's event enum. Each variant reports its kind
/// discriminator and encodes its payload to JSON bytes.
pub trait EventPayload {
    /// The kind discriminator for this event instance.
    fn kind(&self) -> &'static str;

    /// Serialize the event payload.
    ///
    /// # Errors
    ///
    /// Returns a `serde_json` error if serialization fails.
    fn encode(&self) -> Result<Vec<u8>, serde_json::Error>;
}

/// Error returned when decoding a stored event fails.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The event kind was not registered.
    #[error("unknown event kind `{kind}`, expected one of {expected:?}")]
    UnknownKind {
        /// The unrecognized event kind string.
        kind: String,
        /// The kinds the registry can decode.
        expected: Vec<&'static str>,
    },
    /// The payload could not be deserialized into its declared type.
    #[error("failed to decode event payload: {0}")]
    Payload(#[source] serde_json::Error),
}

type Decoder<E> = Box<dyn Fn(&[u8]) -> Result<E, serde_json::Error> + Send + Sync>;

/// Mapping from event kind discriminators to decode functions.
///
/// Populated at startup, one entry per event struct the aggregate's event
/// enum can carry. Enum variant constructors make registration concise:
///
/// ```ignore
/// let registry = EventRegistry::new()
///     .with(OrderEvent::Placed)
///     .with(OrderEvent::ItemAdded);
/// ```
pub struct EventRegistry<E> {
    decoders: HashMap<&'static str, Decoder<E>>,
}

impl<E> EventRegistry<E> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register a decoder for event type `T`, wrapped into the sum type by
    /// `wrap`.
    #[must_use]
    pub fn with<T, F>(mut self, wrap: F) -> Self
    where
        T: DomainEvent + DeserializeOwned,
        F: Fn(T) -> E + Send + Sync + 'static,
    {
        self.decoders.insert(
            T::KIND,
            Box::new(move |payload| serde_json::from_slice::<T>(payload).map(&wrap)),
        );
        self
    }

    /// The kinds this registry can decode, sorted for stable output.
    #[must_use]
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.decoders.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    /// Decode a stored payload by its kind discriminator.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownKind`] if the kind is not registered, or
    /// [`DecodeError::Payload`] if deserialization fails.
    pub fn decode(&self, kind: &str, payload: &[u8]) -> Result<E, DecodeError> {
        let Some(decoder) = self.decoders.get(kind) else {
            return Err(DecodeError::UnknownKind {
                kind: kind.to_string(),
                expected: self.kinds(),
            });
        };
        decoder(payload).map_err(DecodeError::Payload)
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
