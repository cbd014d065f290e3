//! Water-tracking bounded context.
//!
//! The `User` aggregate root owns its `Day` and `Record` entities and
//! enforces the water-balance accounting rules; `measures` holds the
//! context's value objects.

pub mod day;
pub mod measures;
pub mod record;
pub mod user;

pub use day::{Day, DayError, DayEvent, DayEventKind, DayId};
pub use measures::{
    Glass, Kilograms, Milliliters, NoWaterError, Status, Target, TargetComputationError, Water,
    suitable_water_balance,
};
pub use record::{CancelledRecordError, Record, RecordEvent, RecordEventKind, RecordId};
pub use user::{
    CancelRecordError, RecordCancellation, User, UserEvent, UserEventKind, UserId, WaterWriting,
};
