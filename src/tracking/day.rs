//! Day entity -- one user's water accounting for one calendar date.
//!
//! A day's `result` is derived from its balance and target unless a
//! pinned result overrides it; the balance only ever changes through the
//! idempotence-guarded setter.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::entity::{EventLog, domain_events, entity_id, impl_entity};

use super::measures::{Milliliters, Status, Target};
use super::record::Record;
use super::user::UserId;

entity_id! {
    /// Identifier of a [`Day`].
    pub struct DayId;
}

domain_events! {
    /// Domain events produced by a [`Day`].
    pub enum DayEvent, kind DayEventKind {
        /// The day came into existence with a zero balance.
        Created => Creation,
        /// The balance changed to a new value.
        NewWaterBalance { new_water_balance: Milliliters } => Mutation,
        /// An explicit result now overrides the derived one.
        ResultPinned { result: Status } => Mutation,
        /// The override was removed; the result is derived again.
        ResultUnpinned => Mutation,
    }
}

/// Why a record could not change a day's balance. All checks run before
/// any mutation, so a failed call leaves the day and the effect untouched.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DayError {
    #[error("a cancelled record cannot change a day's balance")]
    CancelledRecord,
    #[error("the record belongs to another user")]
    ForeignUserRecord,
    #[error("the record was made on another date")]
    OtherDateRecord,
    /// The balance is never clamped.
    #[error("ignoring the record would make the day's balance negative")]
    UnderflowingBalance,
}

/// One user's water accounting for one calendar date. The target is
/// copied from the user at creation time and stays fixed for the day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Day {
    id: DayId,
    user_id: UserId,
    date: NaiveDate,
    target: Target,
    water_balance: Milliliters,
    pinned_result: Option<Status>,
    #[serde(skip)]
    log: EventLog<DayEvent>,
}

impl_entity!(Day: DayId, DayEvent, "day");

impl Day {
    /// Open a day with a zero balance and register it with the effect.
    pub fn create(
        id: DayId,
        user_id: UserId,
        date: NaiveDate,
        target: Target,
        effect: &mut Effect,
    ) -> Day {
        let mut day = Day {
            id,
            user_id,
            date,
            target,
            water_balance: Milliliters::new(0),
            pinned_result: None,
            log: EventLog::new(),
        };
        day.log.record(DayEvent::Created);
        effect.consider(&day);
        day
    }

    /// Add a record's water to the balance.
    ///
    /// # Errors
    ///
    /// Rejects cancelled records and records of another user or date.
    pub fn take_into_consideration(
        &mut self,
        record: &Record,
        effect: &mut Effect,
    ) -> Result<(), DayError> {
        if record.is_cancelled() {
            return Err(DayError::CancelledRecord);
        }
        self.reject_unrelated(record)?;
        let new_balance = self
            .water_balance
            .saturating_add(record.drunk_water().milliliters());
        self.set_water_balance(new_balance, effect);
        Ok(())
    }

    /// Remove a record's water from the balance, used when the record is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// The same ownership rejects as [`Day::take_into_consideration`],
    /// plus [`DayError::UnderflowingBalance`] when the subtraction would
    /// go negative.
    pub fn ignore(&mut self, record: &Record, effect: &mut Effect) -> Result<(), DayError> {
        self.reject_unrelated(record)?;
        let new_balance = self
            .water_balance
            .checked_sub(record.drunk_water().milliliters())
            .ok_or(DayError::UnderflowingBalance)?;
        self.set_water_balance(new_balance, effect);
        Ok(())
    }

    /// Override the derived result. Re-pinning the same status is a
    /// no-op.
    pub fn pin_result(&mut self, result: Status, effect: &mut Effect) {
        if self.pinned_result == Some(result) {
            return;
        }
        self.pinned_result = Some(result);
        self.log.record(DayEvent::ResultPinned { result });
        effect.consider(self);
    }

    /// Remove the override. A no-op when nothing is pinned.
    pub fn unpin_result(&mut self, effect: &mut Effect) {
        if self.pinned_result.is_none() {
            return;
        }
        self.pinned_result = None;
        self.log.record(DayEvent::ResultUnpinned);
        effect.consider(self);
    }

    /// The result derived from balance vs target, ignoring any pin.
    pub fn correct_result(&self) -> Status {
        Status::when(self.water_balance, self.target)
    }

    /// The pinned result when present, the derived one otherwise.
    pub fn result(&self) -> Status {
        self.pinned_result.unwrap_or_else(|| self.correct_result())
    }

    pub fn is_result_pinned(&self) -> bool {
        self.pinned_result.is_some()
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn water_balance(&self) -> Milliliters {
        self.water_balance
    }

    fn reject_unrelated(&self, record: &Record) -> Result<(), DayError> {
        if record.user_id() != self.user_id {
            return Err(DayError::ForeignUserRecord);
        }
        if record.recording_time().date_naive() != self.date {
            return Err(DayError::OtherDateRecord);
        }
        Ok(())
    }

    // Assigning the value the day already holds is a complete no-op:
    // no event, no effect entry.
    fn set_water_balance(&mut self, new_water_balance: Milliliters, effect: &mut Effect) {
        if new_water_balance == self.water_balance {
            return;
        }
        self.water_balance = new_water_balance;
        self.log.record(DayEvent::NewWaterBalance { new_water_balance });
        effect.consider(self);
    }
}
