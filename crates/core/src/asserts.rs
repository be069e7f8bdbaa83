//! Leveled assertions for the internal invariants of the domain store and the filtering
//! algorithms.
//!
//! The level is raised with the `debug-checks` feature; the cheap checks are always enabled.

#[cfg(not(feature = "debug-checks"))]
pub const CP_ASSERT_LEVEL_DEFINITION: u8 = CP_ASSERT_SIMPLE;

#[cfg(feature = "debug-checks")]
pub const CP_ASSERT_LEVEL_DEFINITION: u8 = CP_ASSERT_ADVANCED;

pub const CP_ASSERT_SIMPLE: u8 = 1;
pub const CP_ASSERT_MODERATE: u8 = 2;
pub const CP_ASSERT_ADVANCED: u8 = 3;
pub const CP_ASSERT_EXTREME: u8 = 4;

#[macro_export]
#[doc(hidden)]
macro_rules! cp_assert_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::CP_ASSERT_LEVEL_DEFINITION >= $crate::asserts::CP_ASSERT_SIMPLE {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! cp_assert_eq_simple {
    ($($arg:tt)*) => {
        if $crate::asserts::CP_ASSERT_LEVEL_DEFINITION >= $crate::asserts::CP_ASSERT_SIMPLE {
            assert_eq!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! cp_assert_moderate {
    ($($arg:tt)*) => {
        if $crate::asserts::CP_ASSERT_LEVEL_DEFINITION >= $crate::asserts::CP_ASSERT_MODERATE {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! cp_assert_advanced {
    ($($arg:tt)*) => {
        if $crate::asserts::CP_ASSERT_LEVEL_DEFINITION >= $crate::asserts::CP_ASSERT_ADVANCED {
            assert!($($arg)*);
        }
    };
}

#[macro_export]
#[doc(hidden)]
macro_rules! cp_assert_extreme {
    ($($arg:tt)*) => {
        if $crate::asserts::CP_ASSERT_LEVEL_DEFINITION >= $crate::asserts::CP_ASSERT_EXTREME {
            assert!($($arg)*);
        }
    };
}
