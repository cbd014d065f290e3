//! Value objects of the water-tracking context.
//!
//! Amounts are whole milliliters and kilograms; integer units avoid
//! floating point. Validation happens at construction, before any entity
//! is touched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How far a day's balance may sit from its target and still count as
/// [`Status::Good`]. Boundaries are inclusive.
const GOOD_MARGIN_MILLILITERS: u32 = 150;

/// Exclusive bounds of the weight range the target formula is defined
/// for.
const LIGHTEST_FORMULA_WEIGHT: u32 = 30;
const HEAVIEST_FORMULA_WEIGHT: u32 = 150;

/// A whole amount of milliliters.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Milliliters(u32);

impl Milliliters {
    pub const fn new(amount: u32) -> Self {
        Self(amount)
    }

    pub const fn amount(self) -> u32 {
        self.0
    }

    /// Addition pinned at `u32::MAX` rather than wrapping.
    pub fn saturating_add(self, other: Milliliters) -> Milliliters {
        Milliliters(self.0.saturating_add(other.0))
    }

    /// Subtraction, `None` when the result would be negative.
    pub fn checked_sub(self, other: Milliliters) -> Option<Milliliters> {
        self.0.checked_sub(other.0).map(Milliliters)
    }

    pub fn abs_diff(self, other: Milliliters) -> Milliliters {
        Milliliters(self.0.abs_diff(other.0))
    }
}

impl fmt::Display for Milliliters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mL", self.0)
    }
}

/// Raised when a water amount of zero milliliters is constructed.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("a water amount must be a positive number of milliliters")]
pub struct NoWaterError;

/// A positive quantity of drunk (or drinkable) water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Water {
    milliliters: Milliliters,
}

impl Water {
    /// # Errors
    ///
    /// [`NoWaterError`] when the amount is zero.
    pub fn new(milliliters: Milliliters) -> Result<Self, NoWaterError> {
        if milliliters.amount() == 0 {
            return Err(NoWaterError);
        }
        Ok(Self { milliliters })
    }

    pub const fn milliliters(self) -> Milliliters {
        self.milliliters
    }
}

/// A body weight in whole kilograms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kilograms(u32);

impl Kilograms {
    pub const fn new(amount: u32) -> Self {
        Self(amount)
    }

    pub const fn amount(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Kilograms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kg", self.0)
    }
}

/// A user's glass: the default pour when no explicit amount is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Glass {
    capacity: Water,
}

impl Glass {
    pub const fn new(capacity: Water) -> Self {
        Self { capacity }
    }

    pub const fn capacity(self) -> Water {
        self.capacity
    }
}

/// A daily water-balance goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(Milliliters);

impl Target {
    pub const fn new(milliliters: Milliliters) -> Self {
        Self(milliliters)
    }

    pub const fn milliliters(self) -> Milliliters {
        self.0
    }
}

/// Why a target could not be derived from a weight.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TargetComputationError {
    #[error("a weight is required to derive a water-balance target")]
    NoWeight,
    #[error("weight {0} is outside the supported range of (30, 150) kg")]
    ExtremeWeight(Kilograms),
}

/// Derive a daily target from a body weight: `1500 + (kg − 20) × 10` mL.
///
/// # Errors
///
/// Distinct [`TargetComputationError`]s for an absent weight and for one
/// outside the exclusive range (30, 150) kg.
pub fn suitable_water_balance(weight: Option<Kilograms>) -> Result<Target, TargetComputationError> {
    let weight = weight.ok_or(TargetComputationError::NoWeight)?;
    if weight.amount() <= LIGHTEST_FORMULA_WEIGHT || weight.amount() >= HEAVIEST_FORMULA_WEIGHT {
        return Err(TargetComputationError::ExtremeWeight(weight));
    }
    let milliliters = 1_500 + (weight.amount() - 20) * 10;
    Ok(Target::new(Milliliters::new(milliliters)))
}

/// A day's standing relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Within 150 mL of the target, boundaries included.
    Good,
    NotEnoughWater,
    ExcessWater,
}

impl Status {
    /// Classify a balance against a target.
    pub fn when(water_balance: Milliliters, target: Target) -> Status {
        if water_balance.abs_diff(target.milliliters()).amount() <= GOOD_MARGIN_MILLILITERS {
            Status::Good
        } else if water_balance < target.milliliters() {
            Status::NotEnoughWater
        } else {
            Status::ExcessWater
        }
    }
}
