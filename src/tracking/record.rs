//! Record entity -- one act of drinking water.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::entity::{EventLog, domain_events, entity_id, impl_entity};

use super::measures::Water;
use super::user::UserId;

entity_id! {
    /// Identifier of a [`Record`].
    pub struct RecordId;
}

domain_events! {
    /// Domain events produced by a [`Record`].
    pub enum RecordEvent, kind RecordEventKind {
        /// The record was written.
        Created => Creation,
        /// The record no longer counts toward its day.
        Cancelled => Mutation,
    }
}

/// Raised when cancelling a record that is already cancelled.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("the record is already cancelled")]
pub struct CancelledRecordError;

/// One act of drinking water at a UTC instant; local or offset-naive
/// instants are unrepresentable by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    id: RecordId,
    user_id: UserId,
    drunk_water: Water,
    recording_time: DateTime<Utc>,
    is_cancelled: bool,
    #[serde(skip)]
    log: EventLog<RecordEvent>,
}

impl_entity!(Record: RecordId, RecordEvent, "record");

impl Record {
    /// Write a record and register it with the effect.
    pub fn create(
        id: RecordId,
        user_id: UserId,
        drunk_water: Water,
        recording_time: DateTime<Utc>,
        effect: &mut Effect,
    ) -> Record {
        let mut record = Record {
            id,
            user_id,
            drunk_water,
            recording_time,
            is_cancelled: false,
            log: EventLog::new(),
        };
        record.log.record(RecordEvent::Created);
        effect.consider(&record);
        record
    }

    /// Cancel the record. Cancellation is one-way: a second attempt is a
    /// reported conflict that leaves the state and the effect untouched.
    pub fn cancel(&mut self, effect: &mut Effect) -> Result<(), CancelledRecordError> {
        if self.is_cancelled {
            return Err(CancelledRecordError);
        }
        self.is_cancelled = true;
        self.log.record(RecordEvent::Cancelled);
        effect.consider(self);
        Ok(())
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn drunk_water(&self) -> Water {
        self.drunk_water
    }

    pub fn recording_time(&self) -> DateTime<Utc> {
        self.recording_time
    }

    pub fn is_cancelled(&self) -> bool {
        self.is_cancelled
    }
}
