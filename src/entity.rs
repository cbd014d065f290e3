//! Entity identity, typed event logs, and derived change status.
//!
//! Every domain entity carries an append-only [`EventLog`] of the events
//! applied to it during the current business operation. The log is the
//! single source of truth for the entity's change status: an entity is
//! *new* when its log holds a creation event, *dirty* when it holds any
//! mutation event, and *deleted* when it holds a deletion event. Aggregate
//! methods mutate state and append the matching event atomically; the
//! events themselves are immutable value records and never touch state.

use std::fmt;
use std::hash::Hash;

use crate::effect::Effect;

/// Broad classification of a domain event, used to derive an entity's
/// change status from its log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// The entity came into existence.
    Creation,
    /// The entity's state changed after creation.
    Mutation,
    /// The entity was removed. Defined for completeness; the core's own
    /// entities substitute soft states (`is_cancelled`) for deletion.
    Deletion,
}

/// A typed event recorded in an entity's log.
///
/// Each implementing enum pairs its variants with a fieldless `Kind`
/// discriminant so consumers can filter logs and [`Effect`] views without
/// matching on payloads.
pub trait DomainEvent: Clone + fmt::Debug + 'static {
    /// Fieldless discriminant mirroring this event's variants.
    type Kind: Copy + Eq + fmt::Debug;

    /// The discriminant of this event.
    fn kind(&self) -> Self::Kind;

    /// Which change class this event belongs to.
    fn class(&self) -> EventClass;
}

/// Append-only, ordered sequence of events applied to one entity within
/// one business operation.
///
/// Cleared only through [`Entity::reset_events`], after a mapper has
/// flushed the entity.
#[derive(Debug, Clone)]
pub struct EventLog<E> {
    events: Vec<E>,
}

impl<E> Default for EventLog<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E: DomainEvent> EventLog<E> {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event. Events are never reordered or rewritten.
    pub fn record(&mut self, event: E) {
        self.events.push(event);
    }

    /// Iterate the events in application order.
    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.events.iter()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// `true` when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Whether the log contains at least one event of the given kind.
    pub fn has(&self, kind: E::Kind) -> bool {
        self.events.iter().any(|event| event.kind() == kind)
    }

    /// Iterate only the events of the given kind, in application order.
    pub fn of_kind(&self, kind: E::Kind) -> impl Iterator<Item = &E> {
        self.events.iter().filter(move |event| event.kind() == kind)
    }

    /// Whether the log marks its entity as newly created: it holds a
    /// creation event and no deletion event.
    pub fn is_new(&self) -> bool {
        let mut created = false;
        for event in &self.events {
            match event.class() {
                EventClass::Creation => created = true,
                EventClass::Deletion => return false,
                EventClass::Mutation => {}
            }
        }
        created
    }

    /// Whether the log holds any mutation event.
    pub fn is_dirty(&self) -> bool {
        self.events
            .iter()
            .any(|event| event.class() == EventClass::Mutation)
    }

    /// Whether the log holds a deletion event.
    pub fn is_deleted(&self) -> bool {
        self.events
            .iter()
            .any(|event| event.class() == EventClass::Deletion)
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }
}

/// A domain entity: stable identity plus a typed event log.
///
/// Identity is assigned at creation and never reassigned. Two entities are
/// the same iff they have the same concrete type and the same id; equality
/// is never structural, which is why implementors do not derive
/// `PartialEq` and comparisons go through [`same_identity_as`].
///
/// [`same_identity_as`]: Entity::same_identity_as
pub trait Entity: Clone + fmt::Debug + 'static {
    /// Stable identifier type.
    type Id: Copy + Ord + Hash + fmt::Debug + 'static;

    /// The entity's event enum.
    type Event: DomainEvent;

    /// Stable type tag (e.g. `"day"`). Used by consumers that key
    /// persistence or log output by entity type.
    const KIND: &'static str;

    /// The entity's identifier.
    fn id(&self) -> Self::Id;

    /// The event log for the current operation.
    fn log(&self) -> &EventLog<Self::Event>;

    /// Mutable access to the log, for aggregate methods appending events.
    fn log_mut(&mut self) -> &mut EventLog<Self::Event>;

    /// Log contains a creation event and no deletion event.
    fn is_new(&self) -> bool {
        self.log().is_new()
    }

    /// Log contains at least one mutation event.
    fn is_dirty(&self) -> bool {
        self.log().is_dirty()
    }

    /// Log contains a deletion event.
    fn is_deleted(&self) -> bool {
        self.log().is_deleted()
    }

    /// Identity equality: same concrete type, same id.
    fn same_identity_as(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Clear the log and drop this entity from the effect.
    ///
    /// Called after a mapper has flushed the entity, so a long-lived
    /// effect does not flush it again.
    fn reset_events(&mut self, effect: &mut Effect)
    where
        Self: Sized,
    {
        self.log_mut().clear();
        effect.ignore(self);
    }
}

/// Declares a uuid-backed identifier newtype with the conversions and
/// `Display` every entity id carries.
macro_rules! entity_id {
    ($(#[$meta:meta])* pub struct $name:ident;) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            pub const fn new(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub const fn uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}
pub(crate) use entity_id;

/// Declares an event enum together with its fieldless kind mirror and the
/// [`DomainEvent`] impl mapping each variant to its change class.
macro_rules! domain_events {
    (
        $(#[$meta:meta])*
        pub enum $event:ident, kind $kind:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $({ $($field:ident : $ty:ty),* $(,)? })? => $class:ident
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
        #[serde(tag = "type", content = "data")]
        pub enum $event {
            $( $(#[$variant_meta])* $variant $({ $($field: $ty),* })?, )*
        }

        #[doc = concat!("Fieldless discriminants of [`", stringify!($event), "`].")]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $kind {
            $( $variant, )*
        }

        impl $crate::entity::DomainEvent for $event {
            type Kind = $kind;

            fn kind(&self) -> $kind {
                match self {
                    $( Self::$variant { .. } => $kind::$variant, )*
                }
            }

            fn class(&self) -> $crate::entity::EventClass {
                match self {
                    $( Self::$variant { .. } => $crate::entity::EventClass::$class, )*
                }
            }
        }
    };
}
pub(crate) use domain_events;

/// Implements [`Entity`] for a type keeping its identity in an `id` field
/// and its journal in a `log` field.
macro_rules! impl_entity {
    ($entity:ident: $id:ty, $event:ty, $kind:literal) => {
        impl $crate::entity::Entity for $entity {
            type Id = $id;
            type Event = $event;

            const KIND: &'static str = $kind;

            fn id(&self) -> $id {
                self.id
            }

            fn log(&self) -> &$crate::entity::EventLog<$event> {
                &self.log
            }

            fn log_mut(&mut self) -> &mut $crate::entity::EventLog<$event> {
                &mut self.log
            }
        }
    };
}
pub(crate) use impl_entity;
