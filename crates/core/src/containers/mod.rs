//! Containers shared by the domain stores and the propagators.
mod keyed_vec;

use std::hash::BuildHasherDefault;

use fnv::FnvHasher;
pub use keyed_vec::KeyedVec;
pub use keyed_vec::StorageKey;

pub type HashSet<K, Hasher = BuildHasherDefault<FnvHasher>> = std::collections::HashSet<K, Hasher>;
