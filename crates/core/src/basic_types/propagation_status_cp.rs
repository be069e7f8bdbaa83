use std::fmt::Display;

use crate::engine::EmptyDomain;

/// The result of invoking a propagator. The propagation either succeeds or identifies an
/// inconsistency, which is returned to the caller immediately.
pub type PropagationStatusCP = Result<(), Inconsistency>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A narrowing left a variable without values.
    EmptyDomain(EmptyDomain),
    /// The propagator found the partial assignment infeasible without emptying a domain.
    Conflict(PropagatorConflict),
}

impl From<EmptyDomain> for Inconsistency {
    fn from(empty_domain: EmptyDomain) -> Self {
        Inconsistency::EmptyDomain(empty_domain)
    }
}

impl From<PropagatorConflict> for Inconsistency {
    fn from(conflict: PropagatorConflict) -> Self {
        Inconsistency::Conflict(conflict)
    }
}

impl Display for Inconsistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inconsistency::EmptyDomain(empty_domain) => write!(f, "{empty_domain}"),
            Inconsistency::Conflict(conflict) => write!(f, "{conflict}"),
        }
    }
}

/// A conflict stated by a propagator which is _not_ an empty domain, e.g. an overloaded resource.
///
/// The description localises the conflict (the time point, the values or the tasks involved).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropagatorConflict {
    description: String,
}

impl PropagatorConflict {
    pub fn new(description: impl Into<String>) -> Self {
        PropagatorConflict {
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Display for PropagatorConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description)
    }
}
