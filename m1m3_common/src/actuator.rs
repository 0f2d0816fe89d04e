//! Actuator identifiers and bounds-checked per-actuator containers.
//!
//! Force actuators are addressed by [`ActuatorId`] (dense index
//! `0..FA_COUNT`) and hardpoints by [`HardpointId`] (`1..=HP_COUNT` on the
//! wire, dense index internally). Per-actuator data lives in
//! [`ActuatorArray`], which can only be indexed by an `ActuatorId`, so an
//! index from another table can never silently address the wrong actuator.

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::consts::{FA_COUNT, HP_COUNT};

/// Wrong element count when building a fixed-size per-actuator container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("expected {expected} values, got {actual}")]
pub struct LengthError {
    /// Required element count.
    pub expected: usize,
    /// Element count supplied.
    pub actual: usize,
}

// ─── Force Actuators ────────────────────────────────────────────────

/// Dense index of a force actuator (`0..FA_COUNT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct ActuatorId(u16);

impl ActuatorId {
    /// Build from a dense index. Returns `None` when out of range.
    #[inline]
    pub const fn new(index: usize) -> Option<Self> {
        if index < FA_COUNT {
            Some(Self(index as u16))
        } else {
            None
        }
    }

    /// Dense index into per-actuator tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterate over every force actuator in index order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..FA_COUNT as u16).map(Self)
    }
}

impl TryFrom<u16> for ActuatorId {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value as usize)
            .ok_or_else(|| format!("actuator index {value} out of range [0, {FA_COUNT})"))
    }
}

impl From<ActuatorId> for u16 {
    fn from(id: ActuatorId) -> Self {
        id.0
    }
}

impl fmt::Display for ActuatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FA[{}]", self.0)
    }
}

/// Fixed-size container holding one value per force actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorArray<T> {
    values: [T; FA_COUNT],
}

impl<T: Copy> ActuatorArray<T> {
    /// Every actuator set to `value`.
    pub const fn splat(value: T) -> Self {
        Self {
            values: [value; FA_COUNT],
        }
    }

    /// Build from a slice that must have exactly `FA_COUNT` elements.
    pub fn from_slice(values: &[T]) -> Result<Self, LengthError> {
        let values: [T; FA_COUNT] = values.try_into().map_err(|_| LengthError {
            expected: FA_COUNT,
            actual: values.len(),
        })?;
        Ok(Self { values })
    }

    /// Build by calling `f` for every actuator.
    pub fn from_fn(mut f: impl FnMut(ActuatorId) -> T) -> Self {
        Self {
            values: std::array::from_fn(|i| f(ActuatorId(i as u16))),
        }
    }

    /// Apply `f` to every element.
    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> ActuatorArray<U> {
        ActuatorArray {
            values: self.values.map(&mut f),
        }
    }
}

impl<T: Copy + Default> Default for ActuatorArray<T> {
    fn default() -> Self {
        Self::splat(T::default())
    }
}

impl<T> ActuatorArray<T> {
    /// Checked access by raw dense index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// Values in index order.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    /// Mutable values in index order.
    #[inline]
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.values.iter_mut()
    }

    /// `(id, value)` pairs in index order.
    pub fn enumerate(&self) -> impl Iterator<Item = (ActuatorId, &T)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ActuatorId(i as u16), v))
    }

    /// Borrow as a plain slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.values
    }
}

impl ActuatorArray<f64> {
    /// All zeros.
    pub const fn zeros() -> Self {
        Self::splat(0.0)
    }

    /// Largest absolute value.
    pub fn max_abs(&self) -> f64 {
        self.values.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// Sum of all values.
    pub fn sum(&self) -> f64 {
        self.values.iter().sum()
    }
}

impl<T> Index<ActuatorId> for ActuatorArray<T> {
    type Output = T;

    #[inline]
    fn index(&self, id: ActuatorId) -> &T {
        &self.values[id.index()]
    }
}

impl<T> IndexMut<ActuatorId> for ActuatorArray<T> {
    #[inline]
    fn index_mut(&mut self, id: ActuatorId) -> &mut T {
        &mut self.values[id.index()]
    }
}

impl<T: Serialize> Serialize for ActuatorArray<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values.iter())
    }
}

impl<'de, T: Deserialize<'de> + Copy> Deserialize<'de> for ActuatorArray<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<T>::deserialize(deserializer)?;
        Self::from_slice(&values).map_err(D::Error::custom)
    }
}

// ─── Hardpoints ─────────────────────────────────────────────────────

/// Hardpoint actuator identifier, 1-based on the wire (`1..=HP_COUNT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HardpointId(u8);

impl HardpointId {
    /// Build from the 1-based actuator number used by commands.
    #[inline]
    pub const fn new(number: u8) -> Option<Self> {
        if number >= 1 && number as usize <= HP_COUNT {
            Some(Self(number))
        } else {
            None
        }
    }

    /// 1-based actuator number.
    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }

    /// Dense index into `[T; HP_COUNT]` tables.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Iterate over all hardpoints.
    pub fn all() -> impl Iterator<Item = Self> {
        (1..=HP_COUNT as u8).map(Self)
    }
}

impl TryFrom<u8> for HardpointId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("hardpoint {value} out of range [1, {HP_COUNT}]"))
    }
}

impl From<HardpointId> for u8 {
    fn from(id: HardpointId) -> Self {
        id.0
    }
}

impl fmt::Display for HardpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HP{}", self.0)
    }
}

// ─── Orientation ────────────────────────────────────────────────────

/// Orientation of a force actuator's secondary cylinder.
///
/// `Na` actuators are single-axis (Z only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Single-axis actuator.
    #[default]
    Na,
    /// Secondary cylinder pushes toward +X.
    #[serde(rename = "+x")]
    PositiveX,
    /// Secondary cylinder pushes toward -X.
    #[serde(rename = "-x")]
    NegativeX,
    /// Secondary cylinder pushes toward +Y.
    #[serde(rename = "+y")]
    PositiveY,
    /// Secondary cylinder pushes toward -Y.
    #[serde(rename = "-y")]
    NegativeY,
}

impl Orientation {
    /// Actuator can produce X force.
    #[inline]
    pub const fn has_x(self) -> bool {
        matches!(self, Self::PositiveX | Self::NegativeX)
    }

    /// Actuator can produce Y force.
    #[inline]
    pub const fn has_y(self) -> bool {
        matches!(self, Self::PositiveY | Self::NegativeY)
    }

    /// Actuator has a secondary cylinder.
    #[inline]
    pub const fn has_secondary(self) -> bool {
        !matches!(self, Self::Na)
    }
}
