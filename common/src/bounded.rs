//! Bounded Integer Index Types
//!
//! Range-checked newtypes for the indexes used across the scheduler. A value
//! outside its declared range can only exist as the default (invalid) value,
//! and is rendered as `INVALID`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Maximum number of cells handled by one DU
pub const MAX_NOF_DU_CELLS: usize = 16;
/// Maximum number of UEs handled by one DU
pub const MAX_NOF_DU_UES: usize = 1024;
/// Number of HARQ processes per UE per cell and direction
pub const MAX_NOF_HARQS: usize = 16;
/// Maximum number of RAN slices per cell
pub const MAX_NOF_RAN_SLICES: usize = 8;
/// Number of logical channel IDs addressable by the DL buffer state
pub const MAX_NOF_LCIDS: usize = 33;
/// Number of logical channel groups reported by BSR
pub const MAX_NOF_LCGS: usize = 8;

/// Error returned when a value falls outside its declared bounds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{type_name} value {value} outside bounds {{{min},...,{max}}}")]
pub struct BoundsError {
    pub type_name: &'static str,
    pub value: u64,
    pub min: u64,
    pub max: u64,
}

macro_rules! bounded_integer {
    ($(#[$meta:meta])* $name:ident, $int:ty, $min:expr, $max:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($int);

        impl $name {
            /// Smallest valid value
            pub const MIN: $int = $min;
            /// Largest valid value
            pub const MAX: $int = $max;

            /// Create a new value, panicking when outside bounds
            pub fn new(value: $int) -> Self {
                assert!(
                    (Self::MIN..=Self::MAX).contains(&value),
                    "{} value={} outside bounds {{{},...,{}}}",
                    stringify!($name),
                    value,
                    Self::MIN,
                    Self::MAX
                );
                Self(value)
            }

            /// Create a new value, returning `None` when outside bounds
            pub fn try_new(value: $int) -> Option<Self> {
                (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
            }

            /// Get the raw value
            pub fn value(&self) -> $int {
                self.0
            }

            /// Get the value as an array index
            pub fn as_usize(&self) -> usize {
                self.0 as usize
            }

            /// Checks whether the value is within the defined boundaries
            pub fn is_valid(&self) -> bool {
                (Self::MIN..=Self::MAX).contains(&self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(Self::MAX + 1)
            }
        }

        impl TryFrom<$int> for $name {
            type Error = BoundsError;

            fn try_from(value: $int) -> Result<Self, Self::Error> {
                Self::try_new(value).ok_or(BoundsError {
                    type_name: stringify!($name),
                    value: value as u64,
                    min: Self::MIN as u64,
                    max: Self::MAX as u64,
                })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}", self.0)
                } else {
                    write!(f, "INVALID")
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let value = <$int>::deserialize(deserializer)?;
                Self::try_from(value).map_err(serde::de::Error::custom)
            }
        }
    };
}

bounded_integer!(
    /// DU-local cell index
    DuCellIndex, u8, 0, (MAX_NOF_DU_CELLS - 1) as u8
);

bounded_integer!(
    /// DU-local UE index
    DuUeIndex, u16, 0, (MAX_NOF_DU_UES - 1) as u16
);

bounded_integer!(
    /// HARQ process identifier
    HarqId, u8, 0, (MAX_NOF_HARQS - 1) as u8
);

bounded_integer!(
    /// RAN slice identifier
    RanSliceId, u8, 0, (MAX_NOF_RAN_SLICES - 1) as u8
);

bounded_integer!(
    /// Shared channel MCS index, I_MCS in TS 38.214 Section 5.1.3.1
    SchMcsIndex, u8, 0, 31
);

bounded_integer!(
    /// Logical channel ID
    Lcid, u8, 0, (MAX_NOF_LCIDS - 1) as u8
);

bounded_integer!(
    /// Logical channel group ID
    LcgId, u8, 0, (MAX_NOF_LCGS - 1) as u8
);

impl Lcid {
    /// First LCID usable by a DRB
    pub const MIN_DRB: u8 = 4;
}
