//! Change-tracking core shared by the water-tracking and account/session
//! contexts.
//!
//! Entities record their own mutation history as typed events; an
//! [`Effect`] collects every entity touched during one business operation
//! so persistence mappers can later decide between inserts and updates.
//! The two aggregate roots -- [`tracking::User`] and [`access::Account`]
//! -- enforce their invariants on top of this framework.

pub mod access;
mod effect;
mod entity;
mod mapper;
pub mod tracking;

pub use effect::{Effect, EntitySet};
pub use entity::{DomainEvent, Entity, EventClass, EventLog};
pub use mapper::{InMemoryMapper, InMemoryMapperError, Mapper, flush};
