//! The effect: an in-memory, per-operation change-tracking index.
//!
//! One [`Effect`] is created fresh for each business operation and passed
//! explicitly into every aggregate method the operation calls. Each method
//! that mutates an entity hands the entity to [`Effect::consider`], so by
//! the time the operation reaches its transaction boundary the effect
//! holds exactly one copy of every entity touched, keyed by
//! `(entity type, id)`, together with its change classification. Mappers
//! then drain the per-type *new* and *dirty* views to decide between
//! inserts and updates.
//!
//! The effect is an identity map, not a journal: re-considering an entity
//! replaces the stored copy, so repeated mutation within one operation
//! collapses into a single entry whose event log carries the union of
//! applied events. It has no interior locking; it is never shared across
//! concurrent operations.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};

use crate::entity::{DomainEvent, Entity};

/// Change classification captured when an entity is considered.
///
/// Snapshotting the flags at `consider` time means a mapper can pick
/// `add_all` vs `update_all` later without re-deriving state from logs
/// that may since have been reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Marks {
    new: bool,
    dirty: bool,
    deleted: bool,
}

#[derive(Debug, Clone)]
struct TrackedEntry<T: Entity> {
    entity: T,
    marks: Marks,
}

/// Type-erased storage for one entity type's entries.
trait Slot: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn is_empty(&self) -> bool;
    fn len(&self) -> usize;
}

/// Entries for one concrete entity type, ordered by id so iteration is
/// deterministic.
struct TypedSlot<T: Entity> {
    entries: BTreeMap<T::Id, TrackedEntry<T>>,
}

impl<T: Entity> TypedSlot<T> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: Entity> Slot for TypedSlot<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// In-memory identity map of every entity touched during one business
/// operation.
///
/// Internally a `TypeId`-keyed map of typed slots; downcasting recovers
/// the typed entries. At most one live copy of any `(type, id)` pair is
/// held at a time.
#[derive(Default)]
pub struct Effect {
    slots: HashMap<TypeId, Box<dyn Slot>>,
}

// Manual `Debug`: `dyn Slot` is type-erased, so report per-type counts
// rather than entry contents.
impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("tracked", &self.len())
            .finish()
    }
}

impl Effect {
    /// An empty effect for a new business operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace a copy of the entity under its id.
    ///
    /// Called by every aggregate method that mutates state, after the
    /// mutation and its event have been applied. Re-considering the same
    /// id replaces the stored copy, so the entry always reflects the most
    /// recent in-memory version.
    pub fn consider<T: Entity>(&mut self, entity: &T) {
        let marks = Marks {
            new: entity.is_new(),
            dirty: entity.is_dirty(),
            deleted: entity.is_deleted(),
        };
        let slot = self
            .slots
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(TypedSlot::<T>::new()));
        downcast_mut::<T>(slot.as_mut()).entries.insert(
            entity.id(),
            TrackedEntry {
                entity: entity.clone(),
                marks,
            },
        );
    }

    /// Remove the entity's entry if present. Idempotent when absent.
    pub fn ignore<T: Entity>(&mut self, entity: &T) {
        if let Some(slot) = self.slots.get_mut(&TypeId::of::<T>()) {
            downcast_mut::<T>(slot.as_mut()).entries.remove(&entity.id());
        }
    }

    /// Drop every tracked entity.
    ///
    /// The explicit rollback primitive: used when a business rule
    /// invalidates a provisional change before the transaction boundary.
    pub fn cancel(&mut self) {
        self.slots.clear();
    }

    /// All currently tracked entities of type `T`, ordered by id.
    pub fn entities_that<T: Entity>(&self) -> EntitySet<'_, T> {
        self.select(|_| true)
    }

    /// Tracked entities of type `T` marked new at consider time.
    pub fn new_entities<T: Entity>(&self) -> EntitySet<'_, T> {
        self.select(|marks| marks.new)
    }

    /// Tracked entities of type `T` marked dirty but not new at consider
    /// time -- the `update_all` set.
    pub fn dirty_entities<T: Entity>(&self) -> EntitySet<'_, T> {
        self.select(|marks| marks.dirty && !marks.new)
    }

    /// Tracked entities of type `T` marked deleted at consider time.
    pub fn deleted_entities<T: Entity>(&self) -> EntitySet<'_, T> {
        self.select(|marks| marks.deleted)
    }

    /// Total number of tracked entities across all types.
    pub fn len(&self) -> usize {
        self.slots.values().map(|slot| slot.len()).sum()
    }

    /// `true` when nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.slots.values().all(|slot| slot.is_empty())
    }

    fn select<T: Entity>(&self, keep: impl Fn(&Marks) -> bool) -> EntitySet<'_, T> {
        let entries = match self.slots.get(&TypeId::of::<T>()) {
            Some(slot) => downcast_ref::<T>(slot.as_ref())
                .entries
                .values()
                .filter(|entry| keep(&entry.marks))
                .collect(),
            None => Vec::new(),
        };
        EntitySet { entries }
    }
}

// A slot stored under `TypeId::of::<T>()` is always a `TypedSlot<T>`;
// a failed downcast is an invariant violation, not a recoverable state.
fn downcast_ref<T: Entity>(slot: &dyn Slot) -> &TypedSlot<T> {
    slot.as_any()
        .downcast_ref::<TypedSlot<T>>()
        .expect("effect slot holds the entity type it is keyed by")
}

fn downcast_mut<T: Entity>(slot: &mut dyn Slot) -> &mut TypedSlot<T> {
    slot.as_any_mut()
        .downcast_mut::<TypedSlot<T>>()
        .expect("effect slot holds the entity type it is keyed by")
}

/// A frozen view over one entity type's tracked entries.
///
/// Filters narrow the view by event kind, so consumers can split, say,
/// newly created days from days that only got a new state:
///
/// ```
/// # use waterlog_core::Effect;
/// # use waterlog_core::tracking::{Day, DayEventKind};
/// # fn demo(effect: &Effect) {
/// let created = effect.entities_that::<Day>().with_event(DayEventKind::Created);
/// let updated = effect
///     .entities_that::<Day>()
///     .with_event(DayEventKind::NewWaterBalance)
///     .without_event(DayEventKind::Created);
/// # }
/// ```
#[derive(Debug)]
pub struct EntitySet<'a, T: Entity> {
    entries: Vec<&'a TrackedEntry<T>>,
}

impl<'a, T: Entity> EntitySet<'a, T> {
    /// Keep only entities whose log contains an event of the given kind.
    pub fn with_event(self, kind: <T::Event as DomainEvent>::Kind) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|entry| entry.entity.log().has(kind))
                .collect(),
        }
    }

    /// Keep only entities whose log contains no event of the given kind.
    pub fn without_event(self, kind: <T::Event as DomainEvent>::Kind) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .filter(|entry| !entry.entity.log().has(kind))
                .collect(),
        }
    }

    /// Iterate the entities, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &'a T> {
        self.entries.iter().map(|entry| &entry.entity)
    }

    /// The tracked entity with the given id, if any.
    pub fn get(&self, id: T::Id) -> Option<&'a T> {
        self.entries
            .iter()
            .find(|entry| entry.entity.id() == id)
            .map(|entry| &entry.entity)
    }

    /// Whether an entity with the given id is in the view.
    pub fn contains(&self, id: T::Id) -> bool {
        self.get(id).is_some()
    }

    /// Number of entities in the view.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the view is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the viewed entities out, ordered by id.
    pub fn cloned(&self) -> Vec<T> {
        self.entries
            .iter()
            .map(|entry| entry.entity.clone())
            .collect()
    }
}

fn entry_entity<'a, T: Entity>(entry: &'a TrackedEntry<T>) -> &'a T {
    &entry.entity
}

impl<'a, T: Entity> IntoIterator for EntitySet<'a, T> {
    type Item = &'a T;
    type IntoIter =
        std::iter::Map<std::vec::IntoIter<&'a TrackedEntry<T>>, fn(&'a TrackedEntry<T>) -> &'a T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter().map(entry_entity)
    }
}
