//! Strongly-typed identifiers.
//!
//! Ids are process-unique and allocated from one monotonically increasing
//! counter per id type, so allocation never touches the heap.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to define a strongly-typed numeric ID newtype wrapper.
///
/// Generates: struct, `next()` (counter-backed), `as_u64()`, Display with the
/// given prefix, Serialize, Deserialize.
macro_rules! define_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(u64);

        impl $name {
            /// Allocate the next process-unique id.
            pub fn next() -> Self {
                static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
                Self(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
            }

            pub fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

define_id!(ActorId, "actor");
define_id!(TimerId, "timer");
define_id!(ConditionId, "condition");
