//! Persistence mapper contract and the in-memory backend.
//!
//! The core never talks to storage itself. Use-case code drains an
//! [`Effect`](crate::Effect)'s per-type buckets through a [`Mapper`]:
//! entities marked new go to [`Mapper::add_all`], entities marked dirty
//! (and not new) go to [`Mapper::update_all`]. Concrete SQL or document
//! backends implement this trait externally; [`InMemoryMapper`] is the
//! in-memory backend the tests drain into.

use std::collections::BTreeMap;

use crate::effect::Effect;
use crate::entity::Entity;

/// Persists one entity type's changes.
///
/// Both methods must treat an empty slice as a no-op, so draining code
/// never has to special-case quiet operations.
pub trait Mapper<T: Entity> {
    /// Storage failure type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert entities that do not exist in storage yet.
    fn add_all(&mut self, entities: &[T]) -> Result<(), Self::Error>;

    /// Update entities that already exist in storage.
    fn update_all(&mut self, entities: &[T]) -> Result<(), Self::Error>;
}

/// Drain one entity type's new and dirty buckets through a mapper.
///
/// The draining step every use case performs per touched entity type,
/// expressed once: new entities are inserted, dirty-but-not-new entities
/// are updated.
///
/// # Errors
///
/// Propagates the mapper's storage error; the caller decides whether that
/// aborts the enclosing transaction.
pub fn flush<T, M>(effect: &Effect, mapper: &mut M) -> Result<(), M::Error>
where
    T: Entity,
    M: Mapper<T>,
{
    let new = effect.new_entities::<T>().cloned();
    let dirty = effect.dirty_entities::<T>().cloned();
    if !new.is_empty() || !dirty.is_empty() {
        tracing::debug!(
            entity_kind = T::KIND,
            added = new.len(),
            updated = dirty.len(),
            "flushing effect buckets"
        );
    }
    mapper.add_all(&new)?;
    mapper.update_all(&dirty)?;
    Ok(())
}

/// Failure modes of the in-memory backend.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InMemoryMapperError {
    /// `add_all` received an entity whose id is already stored.
    #[error("a row with this id already exists")]
    DuplicateRow,
    /// `update_all` received an entity with no stored row.
    #[error("no row with this id to update")]
    MissingRow,
}

/// Mapper over a plain in-memory table, one row per entity id.
pub struct InMemoryMapper<T: Entity> {
    rows: BTreeMap<T::Id, T>,
}

impl<T: Entity> Default for InMemoryMapper<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Entity> InMemoryMapper<T> {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored row for an id, if any.
    pub fn get(&self, id: T::Id) -> Option<&T> {
        self.rows.get(&id)
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` when no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T: Entity> Mapper<T> for InMemoryMapper<T> {
    type Error = InMemoryMapperError;

    fn add_all(&mut self, entities: &[T]) -> Result<(), Self::Error> {
        for entity in entities {
            if self.rows.contains_key(&entity.id()) {
                return Err(InMemoryMapperError::DuplicateRow);
            }
            self.rows.insert(entity.id(), entity.clone());
        }
        Ok(())
    }

    fn update_all(&mut self, entities: &[T]) -> Result<(), Self::Error> {
        for entity in entities {
            if !self.rows.contains_key(&entity.id()) {
                return Err(InMemoryMapperError::MissingRow);
            }
            self.rows.insert(entity.id(), entity.clone());
        }
        Ok(())
    }
}
