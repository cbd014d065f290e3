//! User aggregate root of the water-tracking context.
//!
//! The root owns its days and records by value and resolves every
//! cross-entity relation by id; child entities never hold references to
//! each other.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::access::account::AccountId;
use crate::effect::Effect;
use crate::entity::{Entity, EventLog, domain_events, entity_id, impl_entity};

use super::day::{Day, DayError, DayId};
use super::measures::{
    Glass, Kilograms, Target, TargetComputationError, Water, suitable_water_balance,
};
use super::record::{Record, RecordId};

entity_id! {
    /// Identifier of a [`User`]. Shares its uuid with the access-context
    /// account the user was translated from.
    pub struct UserId;
}

domain_events! {
    /// Domain events produced by a [`User`].
    pub enum UserEvent, kind UserEventKind {
        /// The user entered the tracking context, bridged from an access
        /// account.
        TranslatedFromAccess { account_id: AccountId } => Creation,
    }
}

/// Output of [`User::write_water`]: copies of the record that was written
/// and the day it landed on.
#[derive(Debug, Clone)]
pub struct WaterWriting {
    pub record: Record,
    pub day: Day,
}

/// Output of [`User::cancel_record`]. `day` is `None` when the record had
/// no owning day -- a data-integrity condition, not a failure.
#[derive(Debug, Clone)]
pub struct RecordCancellation {
    pub record: Record,
    pub day: Option<Day>,
}

/// Why a record could not be cancelled.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CancelRecordError {
    #[error("no record to cancel")]
    NoRecordToCancel,
    /// Cancellation is one-way.
    #[error("the record to cancel is already cancelled")]
    CancelledRecordToCancel,
    /// The owning day refused the balance adjustment.
    #[error(transparent)]
    Day(#[from] DayError),
}

/// The water-tracking side of one person.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    weight: Option<Kilograms>,
    glass: Glass,
    target: Target,
    days: Vec<Day>,
    records: Vec<Record>,
    #[serde(skip)]
    log: EventLog<UserEvent>,
}

impl_entity!(User: UserId, UserEvent, "user");

impl User {
    /// Bridge an access account into the tracking context. The user's id
    /// is the account's uuid; when no explicit target is given it is
    /// derived from the weight via [`suitable_water_balance`].
    ///
    /// # Errors
    ///
    /// [`TargetComputationError`] when no target is given and none can be
    /// derived; the effect is left untouched.
    pub fn translated_from_access(
        account_id: AccountId,
        weight: Option<Kilograms>,
        glass: Glass,
        target: Option<Target>,
        effect: &mut Effect,
    ) -> Result<User, TargetComputationError> {
        let target = match target {
            Some(target) => target,
            None => suitable_water_balance(weight)?,
        };
        let mut user = User {
            id: UserId::new(account_id.uuid()),
            weight,
            glass,
            target,
            days: Vec::new(),
            records: Vec::new(),
            log: EventLog::new(),
        };
        user.log.record(UserEvent::TranslatedFromAccess { account_id });
        effect.consider(&user);
        Ok(user)
    }

    /// Write water for the current moment: find or open the day for
    /// `current_time`'s date, write a record for `water` (the glass
    /// capacity when omitted), and route it into the day's balance.
    ///
    /// # Errors
    ///
    /// Propagates [`DayError`] from the balance accounting.
    pub fn write_water(
        &mut self,
        water: Option<Water>,
        current_time: DateTime<Utc>,
        effect: &mut Effect,
    ) -> Result<WaterWriting, DayError> {
        let water = water.unwrap_or_else(|| self.glass.capacity());
        let date = current_time.date_naive();

        let day_index = match self.days.iter().position(|day| day.date() == date) {
            Some(index) => index,
            None => {
                let day = Day::create(DayId::random(), self.id, date, self.target, effect);
                tracing::debug!(day_id = %day.id(), %date, "day opened");
                self.days.push(day);
                self.days.len() - 1
            }
        };

        let record = Record::create(RecordId::random(), self.id, water, current_time, effect);
        self.days[day_index].take_into_consideration(&record, effect)?;

        let day = self.days[day_index].clone();
        self.records.push(record.clone());
        Ok(WaterWriting { record, day })
    }

    /// Cancel one of the user's records and remove its water from the
    /// owning day. Preconditions are checked before the first mutation; a
    /// record whose day cannot be found is still cancelled, with the
    /// missing day logged as a data-integrity signal.
    ///
    /// # Errors
    ///
    /// [`CancelRecordError`]; a balance underflow in the day fails the
    /// whole operation with zero mutation.
    pub fn cancel_record(
        &mut self,
        record_id: RecordId,
        effect: &mut Effect,
    ) -> Result<RecordCancellation, CancelRecordError> {
        let record_index = self
            .records
            .iter()
            .position(|record| record.id() == record_id)
            .ok_or(CancelRecordError::NoRecordToCancel)?;
        if self.records[record_index].is_cancelled() {
            return Err(CancelRecordError::CancelledRecordToCancel);
        }

        let date = self.records[record_index].recording_time().date_naive();
        let Some(day_index) = self.days.iter().position(|day| day.date() == date) else {
            tracing::warn!(
                user_id = %self.id,
                record_id = %record_id,
                "record has no owning day; cancelling without balance adjustment"
            );
            self.records[record_index]
                .cancel(effect)
                .map_err(|_| CancelRecordError::CancelledRecordToCancel)?;
            return Ok(RecordCancellation {
                record: self.records[record_index].clone(),
                day: None,
            });
        };

        // The balance adjustment runs first: if the day refuses it, the
        // record must stay uncancelled.
        self.days[day_index].ignore(&self.records[record_index], effect)?;
        self.records[record_index]
            .cancel(effect)
            .map_err(|_| CancelRecordError::CancelledRecordToCancel)?;

        Ok(RecordCancellation {
            record: self.records[record_index].clone(),
            day: Some(self.days[day_index].clone()),
        })
    }

    /// The user's day for a date, if one was opened.
    pub fn day_on(&self, date: NaiveDate) -> Option<&Day> {
        self.days.iter().find(|day| day.date() == date)
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn days(&self) -> &[Day] {
        &self.days
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::measures::{Milliliters, Status};

    fn ml(amount: u32) -> Milliliters {
        Milliliters::new(amount)
    }

    fn water(amount: u32) -> Water {
        Water::new(ml(amount)).expect("positive water")
    }

    fn noon() -> DateTime<Utc> {
        "2024-03-01T12:00:00Z".parse().expect("valid timestamp")
    }

    /// A user with a 300 mL glass and an explicit 1000 mL target.
    fn user(effect: &mut Effect) -> User {
        User::translated_from_access(
            AccountId::random(),
            None,
            Glass::new(water(300)),
            Some(Target::new(ml(1_000))),
            effect,
        )
        .expect("explicit target needs no weight")
    }

    #[test]
    fn translation_derives_the_target_from_the_weight() {
        let mut effect = Effect::new();
        let user = User::translated_from_access(
            AccountId::random(),
            Some(Kilograms::new(70)),
            Glass::new(water(300)),
            None,
            &mut effect,
        )
        .expect("70 kg is a valid weight");

        assert_eq!(user.target(), Target::new(ml(2_000)));
        assert!(user.is_new());
        assert!(user.log().has(UserEventKind::TranslatedFromAccess));
        assert!(effect.new_entities::<User>().contains(user.id()));
    }

    #[test]
    fn translation_without_weight_or_target_fails_cleanly() {
        let mut effect = Effect::new();
        let result = User::translated_from_access(
            AccountId::random(),
            None,
            Glass::new(water(300)),
            None,
            &mut effect,
        );

        assert_eq!(result.unwrap_err(), TargetComputationError::NoWeight);
        assert!(effect.is_empty(), "a failed translation touches nothing");
    }

    #[test]
    fn writing_without_an_amount_pours_one_glass() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);

        let writing = user
            .write_water(None, noon(), &mut effect)
            .expect("write water");

        assert_eq!(writing.day.water_balance(), ml(300));
        assert_eq!(writing.day.result(), Status::NotEnoughWater);
        assert!(!writing.day.is_result_pinned());
        assert_eq!(writing.record.drunk_water(), water(300));
        assert!(effect.new_entities::<Day>().contains(writing.day.id()));
        assert!(
            effect.new_entities::<Record>().contains(writing.record.id())
        );
    }

    #[test]
    fn same_day_writings_share_one_day() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);

        let first = user
            .write_water(None, noon(), &mut effect)
            .expect("first writing");
        let second = user
            .write_water(Some(water(700)), noon(), &mut effect)
            .expect("second writing");

        assert!(first.day.same_identity_as(&second.day));
        assert_eq!(second.day.water_balance(), ml(1_000));
        assert_eq!(second.day.result(), Status::Good);
        assert_eq!(user.days().len(), 1);
        assert_eq!(user.records().len(), 2);
        assert_eq!(
            effect.entities_that::<Day>().len(),
            1,
            "both writings collapse into one day entry"
        );
    }

    #[test]
    fn different_dates_open_different_days() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);

        user.write_water(None, noon(), &mut effect)
            .expect("first day");
        user.write_water(
            None,
            "2024-03-02T09:00:00Z".parse().expect("valid timestamp"),
            &mut effect,
        )
        .expect("second day");

        assert_eq!(user.days().len(), 2);
        assert_eq!(effect.new_entities::<Day>().len(), 2);
    }

    #[test]
    fn cancelling_a_record_returns_its_water() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);
        let writing = user
            .write_water(None, noon(), &mut effect)
            .expect("write water");

        let cancellation = user
            .cancel_record(writing.record.id(), &mut effect)
            .expect("cancel record");

        let day = cancellation.day.expect("the day exists");
        assert_eq!(day.water_balance(), ml(0));
        assert_eq!(day.result(), Status::NotEnoughWater);
        assert!(cancellation.record.is_cancelled());
    }

    #[test]
    fn cancelling_twice_reports_a_conflict() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);
        let writing = user
            .write_water(None, noon(), &mut effect)
            .expect("write water");
        user.cancel_record(writing.record.id(), &mut effect)
            .expect("first cancel");

        let day_balance = user
            .day_on(noon().date_naive())
            .expect("day exists")
            .water_balance();
        let err = user
            .cancel_record(writing.record.id(), &mut effect)
            .expect_err("second cancel must fail");

        assert_eq!(err, CancelRecordError::CancelledRecordToCancel);
        assert_eq!(
            user.day_on(noon().date_naive())
                .expect("day exists")
                .water_balance(),
            day_balance,
            "the failed cancellation changes nothing"
        );
    }

    #[test]
    fn cancelling_an_unknown_record_fails() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);
        let err = user
            .cancel_record(RecordId::random(), &mut effect)
            .expect_err("unknown record");
        assert_eq!(err, CancelRecordError::NoRecordToCancel);
    }

    #[test]
    fn a_record_without_a_day_is_still_cancelled() {
        let mut effect = Effect::new();
        let mut user = user(&mut effect);
        let writing = user
            .write_water(None, noon(), &mut effect)
            .expect("write water");

        // Rehydrate the aggregate the way a mapper would, but with the
        // day row missing, to set up the integrity condition.
        let mut snapshot = serde_json::to_value(&user).expect("serialize user");
        snapshot["days"] = serde_json::json!([]);
        let mut user: User = serde_json::from_value(snapshot).expect("deserialize user");

        let mut effect = Effect::new();
        let cancellation = user
            .cancel_record(writing.record.id(), &mut effect)
            .expect("cancellation completes despite the missing day");

        assert!(cancellation.day.is_none());
        assert!(cancellation.record.is_cancelled());
        assert!(effect.entities_that::<Day>().is_empty());
        assert!(
            effect.dirty_entities::<Record>().contains(writing.record.id())
        );
    }
}
