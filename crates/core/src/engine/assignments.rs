use std::fmt::Display;
use std::vec::Drain;

use super::notifications::DomainEvent;
use super::variables::DomainId;
use super::variables::GraphId;
use crate::basic_types::Trail;
use crate::containers::HashSet;
use crate::containers::KeyedVec;
use crate::cp_assert_moderate;
use crate::cp_assert_simple;

/// The store of integer domains.
///
/// Domains are bounded intervals with holes. They only shrink, except when synchronising to an
/// earlier checkpoint, which restores the bounds and holes as they were at that checkpoint. Every
/// successful narrowing records the dominant [`DomainEvent`], which the driver drains and
/// dispatches to the watchers of the domain.
#[derive(Clone, Debug, Default)]
pub struct Assignments {
    domains: KeyedVec<DomainId, IntegerDomain>,
    trail: Trail<DomainChange>,
    events: Vec<(DomainEvent, DomainId)>,
}

/// A variable was left without values. This is the contradiction signal of every narrowing
/// operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmptyDomain {
    pub variable: VariableId,
}

impl EmptyDomain {
    pub(crate) fn integer(domain: DomainId) -> Self {
        EmptyDomain {
            variable: VariableId::Integer(domain),
        }
    }

    pub(crate) fn graph(graph: GraphId) -> Self {
        EmptyDomain {
            variable: VariableId::Graph(graph),
        }
    }
}

impl Display for EmptyDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "the domain of {} became empty", self.variable)
    }
}

/// Identifies a variable of either kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VariableId {
    Integer(DomainId),
    Graph(GraphId),
}

impl Display for VariableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariableId::Integer(domain) => write!(f, "{domain}"),
            VariableId::Graph(graph) => write!(f, "{graph}"),
        }
    }
}

#[derive(Clone, Debug)]
struct IntegerDomain {
    lower_bound: i32,
    upper_bound: i32,
    /// Values between the bounds which were removed. Holes outside the bounds are stale and
    /// ignored.
    holes: HashSet<i32>,
    /// The number of holes strictly between the bounds.
    num_holes: usize,
    /// The values removed since the domain started being tracked, in removal order.
    delta: Option<Vec<i32>>,
}

impl IntegerDomain {
    fn contains(&self, value: i32) -> bool {
        self.lower_bound <= value && value <= self.upper_bound && !self.holes.contains(&value)
    }

    fn is_fixed(&self) -> bool {
        self.lower_bound == self.upper_bound
    }

    /// Counts the holes in `[from, to]`, scanning whichever of the range and the hole set is
    /// smaller.
    fn holes_in(&self, from: i32, to: i32) -> usize {
        let width = to as i64 - from as i64 + 1;
        if width <= self.holes.len() as i64 {
            (from..=to).filter(|value| self.holes.contains(value)).count()
        } else {
            self.holes
                .iter()
                .filter(|&&hole| from <= hole && hole <= to)
                .count()
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum DomainChange {
    LowerBound {
        domain: DomainId,
        old_value: i32,
        old_num_holes: usize,
    },
    UpperBound {
        domain: DomainId,
        old_value: i32,
        old_num_holes: usize,
    },
    Hole { domain: DomainId, value: i32 },
    Delta { domain: DomainId, old_length: usize },
}

impl Assignments {
    pub fn grow(&mut self, lower_bound: i32, upper_bound: i32) -> DomainId {
        cp_assert_simple!(
            lower_bound <= upper_bound,
            "cannot create an empty domain [{lower_bound}, {upper_bound}]"
        );

        self.domains.push(IntegerDomain {
            lower_bound,
            upper_bound,
            holes: HashSet::default(),
            num_holes: 0,
            delta: None,
        })
    }

    /// Creates a domain holding exactly the given values.
    pub fn create_sparse(&mut self, values: &[i32]) -> DomainId {
        cp_assert_simple!(!values.is_empty(), "cannot create an empty domain");

        let lower_bound = values.iter().copied().min().unwrap_or_default();
        let upper_bound = values.iter().copied().max().unwrap_or_default();
        let present = values.iter().copied().collect::<HashSet<_>>();
        let holes = (lower_bound..=upper_bound)
            .filter(|value| !present.contains(value))
            .collect::<HashSet<_>>();

        self.domains.push(IntegerDomain {
            lower_bound,
            upper_bound,
            num_holes: holes.len(),
            holes,
            delta: None,
        })
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    pub fn get_domains(&self) -> impl Iterator<Item = DomainId> {
        self.domains.keys()
    }

    pub fn get_lower_bound(&self, domain: DomainId) -> i32 {
        self.domains[domain].lower_bound
    }

    pub fn get_upper_bound(&self, domain: DomainId) -> i32 {
        self.domains[domain].upper_bound
    }

    pub fn is_value_in_domain(&self, domain: DomainId, value: i32) -> bool {
        self.domains[domain].contains(value)
    }

    pub fn is_domain_assigned(&self, domain: DomainId) -> bool {
        self.domains[domain].is_fixed()
    }

    pub fn get_assigned_value(&self, domain: DomainId) -> Option<i32> {
        let integer_domain = &self.domains[domain];
        integer_domain
            .is_fixed()
            .then_some(integer_domain.lower_bound)
    }

    /// Iterates the values of the domain in increasing order.
    pub fn get_domain_iterator(&self, domain: DomainId) -> impl Iterator<Item = i32> + '_ {
        let integer_domain = &self.domains[domain];
        (integer_domain.lower_bound..=integer_domain.upper_bound)
            .filter(move |value| !integer_domain.holes.contains(value))
    }

    pub fn domain_size(&self, domain: DomainId) -> usize {
        let integer_domain = &self.domains[domain];
        let width = integer_domain.upper_bound as i64 - integer_domain.lower_bound as i64 + 1;
        width as usize - integer_domain.num_holes
    }

    /// Whether a value strictly between the bounds was removed.
    pub fn has_holes(&self, domain: DomainId) -> bool {
        self.domains[domain].num_holes > 0
    }

    /// Raises the lower bound to the smallest value in the domain which is at least `value`.
    ///
    /// Returns whether the domain changed.
    pub fn tighten_lower_bound(
        &mut self,
        domain: DomainId,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        let integer_domain = &self.domains[domain];
        if value <= integer_domain.lower_bound {
            return Ok(false);
        }
        if value > integer_domain.upper_bound {
            return Err(EmptyDomain::integer(domain));
        }

        // The upper bound is never a hole, so this terminates.
        let mut new_lower_bound = value;
        while integer_domain.holes.contains(&new_lower_bound) {
            new_lower_bound += 1;
        }

        let old_value = integer_domain.lower_bound;
        let old_num_holes = integer_domain.num_holes;
        let crossed_holes = integer_domain.holes_in(old_value, new_lower_bound - 1);
        self.record_removed_values(domain, old_value..new_lower_bound);

        self.trail.push(DomainChange::LowerBound {
            domain,
            old_value,
            old_num_holes,
        });
        let integer_domain = &mut self.domains[domain];
        integer_domain.lower_bound = new_lower_bound;
        integer_domain.num_holes -= crossed_holes;

        let event = if integer_domain.is_fixed() {
            DomainEvent::Assign
        } else {
            DomainEvent::LowerBound
        };
        self.events.push((event, domain));

        Ok(true)
    }

    /// Lowers the upper bound to the largest value in the domain which is at most `value`.
    pub fn tighten_upper_bound(
        &mut self,
        domain: DomainId,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        let integer_domain = &self.domains[domain];
        if value >= integer_domain.upper_bound {
            return Ok(false);
        }
        if value < integer_domain.lower_bound {
            return Err(EmptyDomain::integer(domain));
        }

        let mut new_upper_bound = value;
        while integer_domain.holes.contains(&new_upper_bound) {
            new_upper_bound -= 1;
        }

        let old_value = integer_domain.upper_bound;
        let old_num_holes = integer_domain.num_holes;
        let crossed_holes = integer_domain.holes_in(new_upper_bound + 1, old_value);
        self.record_removed_values(domain, new_upper_bound + 1..=old_value);

        self.trail.push(DomainChange::UpperBound {
            domain,
            old_value,
            old_num_holes,
        });
        let integer_domain = &mut self.domains[domain];
        integer_domain.upper_bound = new_upper_bound;
        integer_domain.num_holes -= crossed_holes;

        let event = if integer_domain.is_fixed() {
            DomainEvent::Assign
        } else {
            DomainEvent::UpperBound
        };
        self.events.push((event, domain));

        Ok(true)
    }

    pub fn remove_value_from_domain(
        &mut self,
        domain: DomainId,
        value: i32,
    ) -> Result<bool, EmptyDomain> {
        let integer_domain = &self.domains[domain];
        if !integer_domain.contains(value) {
            return Ok(false);
        }
        if integer_domain.is_fixed() {
            return Err(EmptyDomain::integer(domain));
        }

        if value == integer_domain.lower_bound {
            return self.tighten_lower_bound(domain, value + 1);
        }
        if value == integer_domain.upper_bound {
            return self.tighten_upper_bound(domain, value - 1);
        }

        self.record_removed_values(domain, value..=value);
        let integer_domain = &mut self.domains[domain];
        let _ = integer_domain.holes.insert(value);
        integer_domain.num_holes += 1;
        self.trail.push(DomainChange::Hole { domain, value });
        self.events.push((DomainEvent::Removal, domain));

        Ok(true)
    }

    /// Removes every value in `[from, to]`.
    pub fn remove_range_from_domain(
        &mut self,
        domain: DomainId,
        from: i32,
        to: i32,
    ) -> Result<bool, EmptyDomain> {
        let lower_bound = self.get_lower_bound(domain);
        let upper_bound = self.get_upper_bound(domain);
        if from > to || to < lower_bound || from > upper_bound {
            return Ok(false);
        }

        if from <= lower_bound && to >= upper_bound {
            return Err(EmptyDomain::integer(domain));
        }
        if from <= lower_bound {
            return self.tighten_lower_bound(domain, to + 1);
        }
        if to >= upper_bound {
            return self.tighten_upper_bound(domain, from - 1);
        }

        let mut changed = false;
        for value in from..=to {
            changed |= self.remove_value_from_domain(domain, value)?;
        }
        Ok(changed)
    }

    pub fn make_assignment(&mut self, domain: DomainId, value: i32) -> Result<bool, EmptyDomain> {
        let integer_domain = &self.domains[domain];
        if !integer_domain.contains(value) {
            return Err(EmptyDomain::integer(domain));
        }
        if integer_domain.is_fixed() {
            return Ok(false);
        }

        let lower_bound = integer_domain.lower_bound;
        let upper_bound = integer_domain.upper_bound;
        let old_num_holes = integer_domain.num_holes;
        self.record_removed_values(domain, lower_bound..value);
        self.record_removed_values(domain, (value..=upper_bound).skip(1));

        self.trail.push(DomainChange::LowerBound {
            domain,
            old_value: lower_bound,
            old_num_holes,
        });
        self.trail.push(DomainChange::UpperBound {
            domain,
            old_value: upper_bound,
            old_num_holes,
        });
        let integer_domain = &mut self.domains[domain];
        integer_domain.lower_bound = value;
        integer_domain.upper_bound = value;
        integer_domain.num_holes = 0;
        self.events.push((DomainEvent::Assign, domain));

        Ok(true)
    }

    /// Starts recording the values removed from the domain, which can then be replayed by delta
    /// monitors.
    pub fn track_delta(&mut self, domain: DomainId) {
        let integer_domain = &mut self.domains[domain];
        if integer_domain.delta.is_none() {
            integer_domain.delta = Some(Vec::new());
        }
    }

    pub fn delta_length(&self, domain: DomainId) -> usize {
        self.domains[domain].delta.as_ref().map_or(0, Vec::len)
    }

    pub fn delta_values(&self, domain: DomainId, from: usize, to: usize) -> &[i32] {
        match self.domains[domain].delta.as_ref() {
            Some(delta) => &delta[from..to],
            None => &[],
        }
    }

    fn record_removed_values(
        &mut self,
        domain: DomainId,
        values: impl IntoIterator<Item = i32>,
    ) {
        let integer_domain = &mut self.domains[domain];
        let Some(delta) = integer_domain.delta.as_mut() else {
            return;
        };

        let old_length = delta.len();
        delta.extend(
            values
                .into_iter()
                .filter(|value| !integer_domain.holes.contains(value)),
        );
        if delta.len() > old_length {
            self.trail.push(DomainChange::Delta { domain, old_length });
        }
    }

    pub fn new_checkpoint(&mut self) {
        self.trail.new_checkpoint()
    }

    pub fn get_checkpoint(&self) -> usize {
        self.trail.get_checkpoint()
    }

    /// Undoes every narrowing performed after `new_checkpoint` was created.
    pub fn synchronise(&mut self, new_checkpoint: usize) {
        for change in self.trail.synchronise(new_checkpoint) {
            match change {
                DomainChange::LowerBound {
                    domain,
                    old_value,
                    old_num_holes,
                } => {
                    self.domains[domain].lower_bound = old_value;
                    self.domains[domain].num_holes = old_num_holes;
                }
                DomainChange::UpperBound {
                    domain,
                    old_value,
                    old_num_holes,
                } => {
                    self.domains[domain].upper_bound = old_value;
                    self.domains[domain].num_holes = old_num_holes;
                }
                DomainChange::Hole { domain, value } => {
                    let integer_domain = &mut self.domains[domain];
                    let removed = integer_domain.holes.remove(&value);
                    cp_assert_moderate!(removed);
                    integer_domain.num_holes -= 1;
                }
                DomainChange::Delta { domain, old_length } => {
                    if let Some(delta) = self.domains[domain].delta.as_mut() {
                        delta.truncate(old_length);
                    }
                }
            }
        }
        self.events.clear();
    }

    pub fn drain_domain_events(&mut self) -> Drain<'_, (DomainEvent, DomainId)> {
        self.events.drain(..)
    }

    pub fn has_pending_events(&self) -> bool {
        !self.events.is_empty()
    }
}
