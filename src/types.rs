//! Core type definitions for the rate-scaling engine.
//!
//! Provides zero-cost newtypes to prevent field mixups at compile time.
//! All types use `#[repr(transparent)]` for guaranteed zero runtime cost.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Macro to generate newtype wrappers with common implementations.
macro_rules! link_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
        $(, custom_methods: { $($custom:tt)* })?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates a new instance
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw value
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }

            $($($custom)*)?
        }

        // Display with custom prefix
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        // Deref for transparent access
        impl Deref for $name {
            type Target = $inner;

            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        // From/Into conversions
        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        // Enable direct comparisons with raw values
        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for $inner {
            #[inline]
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
            }
        }
    };
}

// Define link-layer types with their custom methods
link_newtype!(
    /// Identifier of a connected peer station.
    StationId(u32) => "STA"
);

link_newtype!(
    /// Traffic identifier (QoS stream) of a transmitted frame.
    Tid(u8) => "TID",
    custom_methods: {
        /// Bit of this TID inside a per-TID bitmask.
        #[inline]
        pub const fn bit(self) -> u8 {
            1 << self.0
        }
    }
);

/// A hardware rate word: the packed encoding of one transmit
/// configuration as programmed into a retry chain slot.
///
/// Field layout is defined in [`crate::constants`]; packing and
/// unpacking live in [`crate::rates`]. Displayed in hexadecimal, so it is
/// implemented outside [`link_newtype!`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[derive(Serialize, Deserialize)]
#[repr(transparent)]
pub struct RateWord(pub u32);

impl RateWord {
    /// Creates a new instance
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Raw value
    #[inline]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// True when any of the given flag bits are set.
    #[inline]
    pub const fn has(self, mask: u32) -> bool {
        self.0 & mask != 0
    }
}

impl fmt::Display for RateWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl Deref for RateWord {
    type Target = u32;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<u32> for RateWord {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<RateWord> for u32 {
    #[inline]
    fn from(value: RateWord) -> Self {
        value.0
    }
}

impl PartialEq<u32> for RateWord {
    #[inline]
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}

impl PartialEq<RateWord> for u32 {
    #[inline]
    fn eq(&self, other: &RateWord) -> bool {
        *self == other.0
    }
}

// Convenience constants
impl Tid {
    /// Number of traffic identifiers.
    pub const COUNT: u8 = 8;
}
