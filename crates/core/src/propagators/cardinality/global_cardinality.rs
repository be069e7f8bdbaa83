use std::cmp::min;

use log::trace;

use super::partial_sum::PartialSum;
use crate::basic_types::ConstraintOperationError;
use crate::basic_types::Inconsistency;
use crate::basic_types::PropagationStatusCP;
use crate::basic_types::PropagatorConflict;
use crate::engine::variables::IntegerVariable;
use crate::engine::DomainEvent;
use crate::engine::DomainEvents;
use crate::engine::IntDeltaMonitor;
use crate::engine::TrailedInteger;
use crate::propagation::Domains;
use crate::propagation::EnqueueDecision;
use crate::propagation::Entailment;
use crate::propagation::LocalId;
use crate::propagation::NotificationContext;
use crate::propagation::PropagationContext;
use crate::propagation::Propagator;
use crate::propagation::PropagatorConstructor;
use crate::propagation::PropagatorConstructorContext;
use crate::propagation::Priority;
use crate::propagation::ReadDomains;

/// The [`PropagatorConstructor`] for the [`GlobalCardinalityPropagator`].
///
/// `cards[i]` is the number of variables in `x` which take the value `first_value + i`; values
/// outside of that range cannot be taken.
#[derive(Clone, Debug)]
pub struct GlobalCardinalityArgs<Var, CVar> {
    pub x: Box<[Var]>,
    pub cards: Box<[CVar]>,
    pub first_value: i32,
}

impl<Var, CVar> PropagatorConstructor for GlobalCardinalityArgs<Var, CVar>
where
    Var: IntegerVariable,
    CVar: IntegerVariable,
{
    type PropagatorImpl = GlobalCardinalityPropagator<Var, CVar>;

    fn create(
        self,
        mut context: PropagatorConstructorContext,
    ) -> Result<Self::PropagatorImpl, ConstraintOperationError> {
        let GlobalCardinalityArgs {
            x,
            cards,
            first_value,
        } = self;
        if cards.is_empty() {
            return Err(ConstraintOperationError::InvalidParameter(
                "the global cardinality constraint needs at least one value",
            ));
        }
        if first_value.checked_add(cards.len() as i32).is_none() {
            return Err(ConstraintOperationError::ArithmeticOverflow);
        }

        let num_variables = x.len();
        for (index, var) in x.iter().enumerate() {
            context.register(var.clone(), DomainEvents::ANY_INT, LocalId::from(index as u32));
        }
        for (index, card) in cards.iter().enumerate() {
            context.register(
                card.clone(),
                DomainEvents::BOUNDS,
                LocalId::from((num_variables + index) as u32),
            );
        }

        let removed_values = x
            .iter()
            .map(|var| context.int_delta_monitor(var.clone()))
            .collect();
        let max_occurrences = (0..cards.len())
            .map(|_| context.new_trailed_integer(0))
            .collect();
        let min_occurrences = (0..cards.len())
            .map(|_| context.new_trailed_integer(0))
            .collect();
        let counted = (0..num_variables)
            .map(|_| context.new_trailed_integer(0))
            .collect();

        let hall_intervals = HallIntervals::new(num_variables, first_value, cards.len());

        Ok(GlobalCardinalityPropagator {
            x,
            cards,
            first_value,
            removed_values,
            max_occurrences,
            min_occurrences,
            counted,
            values_to_check: Vec::new(),
            hall_intervals,
        })
    }
}

/// Bounds consistent propagator for the global cardinality constraint, based on the flow-free
/// algorithm of Quimper et al. ("An efficient bounds consistency algorithm for the global
/// cardinality constraint", CP 2003).
///
/// Next to the Hall interval sweeps, the propagator keeps two reversible counters per value: the
/// number of variables that can still take it and the number of variables fixed to it. They
/// bound the cardinality variables directly, and a value whose cardinality is reached by the
/// fixed variables is removed from all other variables.
#[derive(Clone, Debug)]
pub struct GlobalCardinalityPropagator<Var, CVar> {
    x: Box<[Var]>,
    cards: Box<[CVar]>,
    first_value: i32,

    removed_values: Box<[IntDeltaMonitor<Var>]>,
    /// Per value, the number of variables of which the domain contains it.
    max_occurrences: Box<[TrailedInteger]>,
    /// Per value, the number of variables fixed to it.
    min_occurrences: Box<[TrailedInteger]>,
    /// Per variable, whether its fixed value is included in `min_occurrences`.
    counted: Box<[TrailedInteger]>,

    /// Values which may have become saturated since the last call.
    values_to_check: Vec<i32>,
    hall_intervals: HallIntervals,
}

impl<Var: IntegerVariable, CVar: IntegerVariable> GlobalCardinalityPropagator<Var, CVar> {
    fn last_value(&self) -> i32 {
        self.first_value + self.cards.len() as i32 - 1
    }

    fn card_of(&self, value: i32) -> Option<&CVar> {
        usize::try_from(value - self.first_value)
            .ok()
            .and_then(|index| self.cards.get(index))
    }

    /// Removes `value` from the unfixed variables when the variables fixed to it already reach
    /// its maximum cardinality.
    fn filter_saturated_value(
        &self,
        context: &mut PropagationContext,
        value: i32,
    ) -> PropagationStatusCP {
        let index = (value - self.first_value) as usize;
        let fixed_to_value = context.read(self.min_occurrences[index]);
        let card_upper_bound = context.upper_bound(&self.cards[index]) as i64;

        if fixed_to_value > card_upper_bound {
            return Err(PropagatorConflict::new(format!(
                "{fixed_to_value} variables are fixed to {value}, at most {card_upper_bound} are allowed"
            ))
            .into());
        }

        if fixed_to_value == card_upper_bound {
            for var in self.x.iter() {
                if !context.is_fixed(var) {
                    let _ = context.remove(var, value)?;
                }
            }
        }

        Ok(())
    }

    /// Replays the removed values into the counters of possible occurrences.
    fn process_removals(&mut self, context: &mut PropagationContext) {
        let first_value = self.first_value;
        let range = self.cards.len() as i32;
        let max_occurrences = &self.max_occurrences;
        for monitor in self.removed_values.iter_mut() {
            monitor.freeze(&*context);
            let _ = monitor.for_each(context, |context, value| {
                let index = value - first_value;
                if (0..range).contains(&index) {
                    context.add_assign(max_occurrences[index as usize], -1);
                }
                Ok::<(), ()>(())
            });
            monitor.unfreeze(context);
        }
    }

    /// Bounds every cardinality by the number of variables fixed to, and able to take, its
    /// value.
    fn bound_cards_by_occurrences(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        for (index, card) in self.cards.iter().enumerate() {
            let at_most = context.read(self.max_occurrences[index]);
            let at_least = context.read(self.min_occurrences[index]);
            let _ = context.set_upper_bound(card, at_most as i32)?;
            let _ = context.set_lower_bound(card, at_least as i32)?;
        }
        Ok(())
    }

    /// The cardinalities sum up to the number of variables.
    fn propagate_sum_of_cards(&self, context: &mut PropagationContext) -> PropagationStatusCP {
        let num_variables = self.x.len() as i64;
        loop {
            let lower_sum: i64 = self
                .cards
                .iter()
                .map(|card| context.lower_bound(card) as i64)
                .sum();
            let upper_sum: i64 = self
                .cards
                .iter()
                .map(|card| context.upper_bound(card) as i64)
                .sum();

            let mut changed = false;
            for card in self.cards.iter() {
                let lower_bound = context.lower_bound(card) as i64;
                let upper_bound = context.upper_bound(card) as i64;
                changed |= context
                    .set_upper_bound(card, (num_variables - (lower_sum - lower_bound)) as i32)?;
                changed |= context
                    .set_lower_bound(card, (num_variables - (upper_sum - upper_bound)) as i32)?;
            }

            if !changed {
                return Ok(());
            }
        }
    }

    fn check_direct_inconsistency(&self, context: &PropagationContext) -> PropagationStatusCP {
        for (index, card) in self.cards.iter().enumerate() {
            let at_most = context.read(self.max_occurrences[index]);
            let at_least = context.read(self.min_occurrences[index]);
            if at_most < context.lower_bound(card) as i64
                || at_least > context.upper_bound(card) as i64
            {
                return Err(PropagatorConflict::new(format!(
                    "the occurrences of value {} cannot meet its cardinality",
                    self.first_value + index as i32
                ))
                .into());
            }
        }
        Ok(())
    }

    fn filter(&mut self, context: &mut PropagationContext) -> PropagationStatusCP {
        self.propagate_sum_of_cards(context)?;
        if self.x.is_empty() {
            return Ok(());
        }

        let card_lower_bounds = self
            .cards
            .iter()
            .map(|card| context.lower_bound(card))
            .collect::<Vec<_>>();
        let card_upper_bounds = self
            .cards
            .iter()
            .map(|card| context.upper_bound(card))
            .collect::<Vec<_>>();
        self.hall_intervals.lower.compute(card_lower_bounds);
        self.hall_intervals.upper.compute(card_upper_bounds);

        self.hall_intervals.sort(context, &self.x);
        self.hall_intervals
            .check_uncovered_demand(context, &self.x)?;

        self.hall_intervals.filter_lower_max(context, &self.x)?;
        self.hall_intervals.filter_lower_min(context, &self.x)?;
        self.hall_intervals.filter_upper_max(context, &self.x)?;
        self.hall_intervals.filter_upper_min(context, &self.x)?;

        Ok(())
    }

    fn finish(&mut self, context: &mut PropagationContext) {
        // The counters only see removals through the delta monitors, so our own removals are
        // taken into account in a next call.
        if self
            .removed_values
            .iter()
            .any(|monitor| monitor.has_unprocessed(&*context))
        {
            context.request_repropagation();
        }
    }
}

impl<Var: IntegerVariable, CVar: IntegerVariable> Propagator
    for GlobalCardinalityPropagator<Var, CVar>
{
    fn name(&self) -> &str {
        "GlobalCardinality"
    }

    fn priority(&self) -> Priority {
        Priority::Low
    }

    fn propagate_from_scratch(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        let num_variables = self.x.len() as i32;
        let last_value = self.last_value();
        for var in self.x.iter() {
            let _ = context.set_lower_bound(var, self.first_value)?;
            let _ = context.set_upper_bound(var, last_value)?;
        }
        for card in self.cards.iter() {
            let _ = context.set_lower_bound(card, 0)?;
            let _ = context.set_upper_bound(card, num_variables)?;
        }

        for index in 0..self.cards.len() {
            let value = self.first_value + index as i32;
            let possible = self
                .x
                .iter()
                .filter(|var| context.contains(*var, value))
                .count();
            let fixed = self
                .x
                .iter()
                .filter(|var| context.fixed_value(*var) == Some(value))
                .count();
            context.assign(self.max_occurrences[index], possible as i64);
            context.assign(self.min_occurrences[index], fixed as i64);
        }
        for (index, var) in self.x.iter().enumerate() {
            let is_fixed = context.is_fixed(var);
            context.assign(self.counted[index], is_fixed as i64);
        }
        for monitor in self.removed_values.iter_mut() {
            monitor.skip_to_end(&mut context);
        }
        self.values_to_check.clear();

        self.bound_cards_by_occurrences(&mut context)?;

        let fixed_values = self
            .x
            .iter()
            .filter_map(|var| context.fixed_value(var))
            .chain(
                self.cards
                    .iter()
                    .enumerate()
                    .filter(|(_, card)| context.is_fixed(*card))
                    .map(|(index, _)| self.first_value + index as i32),
            )
            .collect::<Vec<_>>();
        for value in fixed_values {
            self.filter_saturated_value(&mut context, value)?;
        }
        self.check_direct_inconsistency(&context)?;

        self.filter(&mut context)?;
        self.finish(&mut context);
        Ok(())
    }

    fn propagate(&mut self, mut context: PropagationContext) -> PropagationStatusCP {
        self.process_removals(&mut context);
        self.bound_cards_by_occurrences(&mut context)?;

        let values_to_check = std::mem::take(&mut self.values_to_check);
        for &value in values_to_check.iter() {
            self.filter_saturated_value(&mut context, value)?;
        }
        self.values_to_check = values_to_check;
        self.values_to_check.clear();

        self.filter(&mut context)?;
        self.finish(&mut context);
        Ok(())
    }

    fn notify(
        &mut self,
        mut context: NotificationContext,
        local_id: LocalId,
        _event: DomainEvent,
    ) -> EnqueueDecision {
        let index = local_id.unpack() as usize;

        if let Some(var) = self.x.get(index) {
            if context.read(self.counted[index]) == 0 {
                if let Some(value) = context.fixed_value(var) {
                    context.assign(self.counted[index], 1);
                    if self.card_of(value).is_some() {
                        let value_index = (value - self.first_value) as usize;
                        context.add_assign(self.min_occurrences[value_index], 1);
                        self.values_to_check.push(value);
                    }
                }
            }
        } else {
            let value = self.first_value + (index - self.x.len()) as i32;
            trace!("cardinality of value {value} changed");
            self.values_to_check.push(value);
        }

        EnqueueDecision::Enqueue
    }

    fn synchronise(&mut self, _domains: Domains) {
        self.values_to_check.clear();
    }

    fn is_entailed(&self, domains: Domains) -> Entailment {
        let values = self
            .x
            .iter()
            .map(|var| domains.fixed_value(var))
            .collect::<Option<Vec<_>>>();
        let cards = self
            .cards
            .iter()
            .map(|card| domains.fixed_value(card))
            .collect::<Option<Vec<_>>>();

        let (Some(values), Some(cards)) = (values, cards) else {
            return Entailment::Undefined;
        };

        let mut counts = vec![0; cards.len()];
        for value in values {
            match self.card_of(value) {
                Some(_) => counts[(value - self.first_value) as usize] += 1,
                None => return Entailment::False,
            }
        }

        if counts == cards {
            Entailment::True
        } else {
            Entailment::False
        }
    }

    fn detect_inconsistency(&self, domains: Domains) -> Option<PropagatorConflict> {
        let num_variables = self.x.len() as i64;
        let lower_sum: i64 = self
            .cards
            .iter()
            .map(|card| domains.lower_bound(card) as i64)
            .sum();
        let upper_sum: i64 = self
            .cards
            .iter()
            .map(|card| domains.upper_bound(card) as i64)
            .sum();

        (lower_sum > num_variables || upper_sum < num_variables).then(|| {
            PropagatorConflict::new("the cardinalities cannot sum up to the number of variables")
        })
    }
}

/// The scratch space of the Hall interval sweeps. The arrays are indexed by bound rank and
/// reused between calls.
#[derive(Clone, Debug)]
struct HallIntervals {
    tree_links: Box<[i32]>,
    capacities: Box<[i32]>,
    hall: Box<[i32]>,
    stable_interval: Box<[i32]>,
    potential_stable_sets: Box<[i32]>,
    bounds: Box<[i32]>,
    /// The new bound rank per sorted variable, if one was computed in the current sweep.
    new_bounds: Box<[Option<i32>]>,

    min_rank: Box<[i32]>,
    max_rank: Box<[i32]>,
    /// Variable indices sorted by lower bound.
    min_sorted: Box<[usize]>,
    /// Variable indices sorted by upper bound.
    max_sorted: Box<[usize]>,
    num_bounds: i32,

    /// Prefix sums of the minimum cardinalities.
    lower: PartialSum,
    /// Prefix sums of the maximum cardinalities.
    upper: PartialSum,
}

fn path_set(tab: &mut [i32], start: i32, end: i32, to: i32) {
    let mut current = start;
    while current != end {
        let next = tab[current as usize];
        tab[current as usize] = to;
        current = next;
    }
}

fn path_min(tab: &[i32], mut index: i32) -> i32 {
    while tab[index as usize] < index {
        index = tab[index as usize];
    }
    index
}

fn path_max(tab: &[i32], mut index: i32) -> i32 {
    while tab[index as usize] > index {
        index = tab[index as usize];
    }
    index
}

fn hall_conflict() -> Inconsistency {
    PropagatorConflict::new("the cardinality bounds of a Hall interval are violated").into()
}

impl HallIntervals {
    fn new(num_variables: usize, first_value: i32, num_values: usize) -> Self {
        let size = 2 * num_variables + 2;
        HallIntervals {
            tree_links: vec![0; size].into_boxed_slice(),
            capacities: vec![0; size].into_boxed_slice(),
            hall: vec![0; size].into_boxed_slice(),
            stable_interval: vec![0; size].into_boxed_slice(),
            potential_stable_sets: vec![0; size].into_boxed_slice(),
            bounds: vec![0; size].into_boxed_slice(),
            new_bounds: vec![None; num_variables].into_boxed_slice(),
            min_rank: vec![0; num_variables].into_boxed_slice(),
            max_rank: vec![0; num_variables].into_boxed_slice(),
            min_sorted: (0..num_variables).collect(),
            max_sorted: (0..num_variables).collect(),
            num_bounds: 0,
            lower: PartialSum::new(first_value, num_values),
            upper: PartialSum::new(first_value, num_values),
        }
    }

    /// Sorts the variables by their bounds and ranks the distinct bounds, where upper bounds are
    /// taken as exclusive.
    fn sort<Var: IntegerVariable>(&mut self, context: &PropagationContext, x: &[Var]) {
        let lower_bounds = x
            .iter()
            .map(|var| context.lower_bound(var))
            .collect::<Vec<_>>();
        let upper_bounds = x
            .iter()
            .map(|var| context.upper_bound(var))
            .collect::<Vec<_>>();
        self.min_sorted.sort_by_key(|&index| lower_bounds[index]);
        self.max_sorted.sort_by_key(|&index| upper_bounds[index]);

        let num_variables = x.len();
        let mut min = lower_bounds[self.min_sorted[0]];
        let mut max = upper_bounds[self.max_sorted[0]] + 1;
        let mut last = self.lower.lowest_bound();
        let mut num_bounds = 0;
        self.bounds[0] = last;

        let (mut i, mut j) = (0, 0);
        loop {
            if i < num_variables && min <= max {
                if min != last {
                    num_bounds += 1;
                    self.bounds[num_bounds] = min;
                    last = min;
                }
                self.min_rank[self.min_sorted[i]] = num_bounds as i32;
                i += 1;
                if i < num_variables {
                    min = lower_bounds[self.min_sorted[i]];
                }
            } else {
                if max != last {
                    num_bounds += 1;
                    self.bounds[num_bounds] = max;
                    last = max;
                }
                self.max_rank[self.max_sorted[j]] = num_bounds as i32;
                j += 1;
                if j == num_variables {
                    break;
                }
                max = upper_bounds[self.max_sorted[j]] + 1;
            }
        }

        self.num_bounds = num_bounds as i32;
        self.bounds[num_bounds + 1] = self.upper.highest_bound();
    }

    /// Fails when the minimum cardinalities of the values below every lower bound, or above
    /// every upper bound, are not zero.
    fn check_uncovered_demand<Var: IntegerVariable>(
        &self,
        context: &PropagationContext,
        x: &[Var],
    ) -> PropagationStatusCP {
        let smallest_lower_bound = context.lower_bound(&x[self.min_sorted[0]]);
        let largest_upper_bound = context.upper_bound(&x[self.max_sorted[x.len() - 1]]);

        if self
            .lower
            .sum(self.lower.min_value(), smallest_lower_bound - 1)
            > 0
            || self
                .lower
                .sum(largest_upper_bound + 1, self.lower.max_value())
                > 0
        {
            return Err(PropagatorConflict::new(
                "a value with a positive minimum cardinality cannot be taken",
            )
            .into());
        }
        Ok(())
    }

    /// Raises the lower bounds with respect to the maximum cardinalities.
    fn filter_lower_max<Var: IntegerVariable>(
        &mut self,
        context: &mut PropagationContext,
        x: &[Var],
    ) -> PropagationStatusCP {
        let num_bounds = self.num_bounds;
        for i in 1..=num_bounds + 1 {
            let index = i as usize;
            self.tree_links[index] = i - 1;
            self.hall[index] = i - 1;
            self.capacities[index] = self
                .upper
                .sum(self.bounds[index - 1], self.bounds[index] - 1);
        }

        for position in 0..x.len() {
            let var_index = self.max_sorted[position];
            let lower_rank = self.min_rank[var_index];
            let upper_rank = self.max_rank[var_index];

            let mut z = path_max(&self.tree_links, lower_rank + 1);
            let j = self.tree_links[z as usize];
            self.capacities[z as usize] -= 1;
            if self.capacities[z as usize] == 0 {
                self.tree_links[z as usize] = z + 1;
                z = path_max(&self.tree_links, z + 1);
                self.tree_links[z as usize] = j;
            }
            path_set(&mut self.tree_links, lower_rank + 1, z, z);

            let demand = self.upper.sum(
                self.bounds[upper_rank as usize],
                self.bounds[z as usize] - 1,
            );
            if self.capacities[z as usize] < demand {
                return Err(hall_conflict());
            }

            if self.hall[lower_rank as usize] > lower_rank {
                let w = path_max(&self.hall, self.hall[lower_rank as usize]);
                let _ = context.set_lower_bound(&x[var_index], self.bounds[w as usize])?;
                path_set(&mut self.hall, lower_rank, w, w);
            }

            if self.capacities[z as usize] == demand {
                let start = self.hall[upper_rank as usize];
                path_set(&mut self.hall, start, j - 1, upper_rank);
                self.hall[upper_rank as usize] = j - 1;
            }
        }

        Ok(())
    }

    /// Lowers the upper bounds with respect to the maximum cardinalities.
    fn filter_upper_max<Var: IntegerVariable>(
        &mut self,
        context: &mut PropagationContext,
        x: &[Var],
    ) -> PropagationStatusCP {
        let num_bounds = self.num_bounds;
        for i in 0..=num_bounds {
            let index = i as usize;
            self.tree_links[index] = i + 1;
            self.hall[index] = i + 1;
            self.capacities[index] = self
                .upper
                .sum(self.bounds[index], self.bounds[index + 1] - 1);
        }

        for position in (0..x.len()).rev() {
            let var_index = self.min_sorted[position];
            let upper_rank = self.max_rank[var_index];
            let lower_rank = self.min_rank[var_index];

            let mut z = path_min(&self.tree_links, upper_rank - 1);
            let j = self.tree_links[z as usize];
            self.capacities[z as usize] -= 1;
            if self.capacities[z as usize] == 0 {
                self.tree_links[z as usize] = z - 1;
                z = path_min(&self.tree_links, z - 1);
                self.tree_links[z as usize] = j;
            }
            path_set(&mut self.tree_links, upper_rank - 1, z, z);

            let demand = self.upper.sum(
                self.bounds[z as usize],
                self.bounds[lower_rank as usize] - 1,
            );
            if self.capacities[z as usize] < demand {
                return Err(hall_conflict());
            }

            if self.hall[upper_rank as usize] < upper_rank {
                let w = path_min(&self.hall, self.hall[upper_rank as usize]);
                let _ = context.set_upper_bound(&x[var_index], self.bounds[w as usize] - 1)?;
                path_set(&mut self.hall, upper_rank, w, w);
            }

            if self.capacities[z as usize] == demand {
                let start = self.hall[lower_rank as usize];
                path_set(&mut self.hall, start, j + 1, lower_rank);
                self.hall[lower_rank as usize] = j + 1;
            }
        }

        Ok(())
    }

    /// Raises the lower bounds with respect to the minimum cardinalities. Also computes the
    /// stable intervals, which the next sweep reuses.
    fn filter_lower_min<Var: IntegerVariable>(
        &mut self,
        context: &mut PropagationContext,
        x: &[Var],
    ) -> PropagationStatusCP {
        let num_bounds = self.num_bounds;

        let mut w = num_bounds + 1;
        for i in (1..=num_bounds + 1).rev() {
            let index = i as usize;
            self.potential_stable_sets[index] = i - 1;
            self.stable_interval[index] = i - 1;
            self.capacities[index] = self
                .lower
                .sum(self.bounds[index - 1], self.bounds[index] - 1);
            if self.capacities[index] == 0 {
                self.hall[index - 1] = w;
            } else {
                self.hall[w as usize] = i - 1;
                w = i - 1;
            }
        }

        w = num_bounds + 1;
        for i in (0..=num_bounds + 1).rev() {
            if self.capacities[i as usize] == 0 {
                self.tree_links[i as usize] = w;
            } else {
                self.tree_links[w as usize] = i;
                w = i;
            }
        }

        for position in 0..x.len() {
            let var_index = self.max_sorted[position];
            let lower_rank = self.min_rank[var_index];
            let mut upper_rank = self.max_rank[var_index];
            self.new_bounds[position] = None;

            let mut z = path_max(&self.tree_links, lower_rank + 1);
            let j = self.tree_links[z as usize];

            if z != lower_rank + 1 {
                let w = path_max(&self.potential_stable_sets, lower_rank + 1);
                let v = self.potential_stable_sets[w as usize];
                path_set(&mut self.potential_stable_sets, lower_rank + 1, w, w);
                let w = min(upper_rank, z);
                let start = self.potential_stable_sets[w as usize];
                path_set(&mut self.potential_stable_sets, start, v, w);
                self.potential_stable_sets[w as usize] = v;
            }

            let demand = self.lower.sum(
                self.bounds[upper_rank as usize],
                self.bounds[z as usize] - 1,
            );
            if self.capacities[z as usize] <= demand {
                let start = self.potential_stable_sets[upper_rank as usize];
                let w = path_max(&self.stable_interval, start);
                path_set(&mut self.stable_interval, start, w, w);
                let v = self.stable_interval[w as usize];
                let from = self.stable_interval[upper_rank as usize];
                path_set(&mut self.stable_interval, from, v, upper_rank);
                self.stable_interval[upper_rank as usize] = v;
            } else {
                self.capacities[z as usize] -= 1;
                if self.capacities[z as usize] == 0 {
                    self.tree_links[z as usize] = z + 1;
                    z = path_max(&self.tree_links, z + 1);
                    self.tree_links[z as usize] = j;
                }

                if self.hall[lower_rank as usize] > lower_rank {
                    let w = path_max(&self.hall, lower_rank);
                    self.new_bounds[position] = Some(w);
                    path_set(&mut self.hall, lower_rank, w, w);
                } else {
                    self.new_bounds[position] = Some(lower_rank);
                }

                let demand = self.lower.sum(
                    self.bounds[upper_rank as usize],
                    self.bounds[z as usize] - 1,
                );
                if self.capacities[z as usize] == demand {
                    if self.hall[upper_rank as usize] > upper_rank {
                        upper_rank = self.hall[upper_rank as usize];
                    }
                    let start = self.hall[upper_rank as usize];
                    path_set(&mut self.hall, start, j - 1, upper_rank);
                    self.hall[upper_rank as usize] = j - 1;
                }
            }
            path_set(&mut self.tree_links, lower_rank + 1, z, z);
        }

        if self.hall[num_bounds as usize] != 0 {
            return Err(hall_conflict());
        }

        let mut w = num_bounds + 1;
        for i in (1..=num_bounds + 1).rev() {
            if self.stable_interval[i as usize] > i {
                self.stable_interval[i as usize] = w;
            } else {
                w = i;
            }
        }

        for position in (0..x.len()).rev() {
            let var_index = self.max_sorted[position];
            let lower_rank = self.min_rank[var_index];
            let upper_rank = self.max_rank[var_index];
            if !self.outside_stable_set(lower_rank, upper_rank) {
                continue;
            }
            if let Some(rank) = self.new_bounds[position] {
                let bound = self
                    .lower
                    .skip_null_elements_right(self.bounds[rank as usize]);
                let _ = context.set_lower_bound(&x[var_index], bound)?;
            }
        }

        Ok(())
    }

    /// Lowers the upper bounds with respect to the minimum cardinalities, using the stable
    /// intervals of [`HallIntervals::filter_lower_min`].
    fn filter_upper_min<Var: IntegerVariable>(
        &mut self,
        context: &mut PropagationContext,
        x: &[Var],
    ) -> PropagationStatusCP {
        let num_bounds = self.num_bounds;

        let mut w = 0;
        for i in 0..=num_bounds {
            let index = i as usize;
            self.capacities[index] = self
                .lower
                .sum(self.bounds[index], self.bounds[index + 1] - 1);
            if self.capacities[index] == 0 {
                self.tree_links[index] = w;
            } else {
                self.tree_links[w as usize] = i;
                w = i;
            }
        }
        self.tree_links[w as usize] = num_bounds + 1;

        w = 0;
        for i in 1..=num_bounds {
            if self.capacities[i as usize - 1] == 0 {
                self.hall[i as usize] = w;
            } else {
                self.hall[w as usize] = i;
                w = i;
            }
        }
        self.hall[w as usize] = num_bounds + 1;

        for position in (0..x.len()).rev() {
            let var_index = self.min_sorted[position];
            let upper_rank = self.max_rank[var_index];
            let mut lower_rank = self.min_rank[var_index];
            self.new_bounds[position] = None;

            let mut z = path_min(&self.tree_links, upper_rank - 1);
            let j = self.tree_links[z as usize];

            let demand = self.lower.sum(
                self.bounds[z as usize],
                self.bounds[lower_rank as usize] - 1,
            );
            if self.capacities[z as usize] > demand {
                self.capacities[z as usize] -= 1;
                if self.capacities[z as usize] == 0 {
                    self.tree_links[z as usize] = z - 1;
                    z = path_min(&self.tree_links, z - 1);
                    self.tree_links[z as usize] = j;
                }

                if self.hall[upper_rank as usize] < upper_rank {
                    let w = path_min(&self.hall, self.hall[upper_rank as usize]);
                    self.new_bounds[position] = Some(w);
                    path_set(&mut self.hall, upper_rank, w, w);
                } else {
                    self.new_bounds[position] = Some(upper_rank);
                }

                let demand = self.lower.sum(
                    self.bounds[z as usize],
                    self.bounds[lower_rank as usize] - 1,
                );
                if self.capacities[z as usize] == demand {
                    if self.hall[lower_rank as usize] < lower_rank {
                        lower_rank = self.hall[lower_rank as usize];
                    }
                    let start = self.hall[lower_rank as usize];
                    path_set(&mut self.hall, start, j + 1, lower_rank);
                    self.hall[lower_rank as usize] = j + 1;
                }
            }
            path_set(&mut self.tree_links, upper_rank - 1, z, z);
        }

        for position in (0..x.len()).rev() {
            let var_index = self.min_sorted[position];
            let lower_rank = self.min_rank[var_index];
            let upper_rank = self.max_rank[var_index];
            if !self.outside_stable_set(lower_rank, upper_rank) {
                continue;
            }
            if let Some(rank) = self.new_bounds[position] {
                let bound = self
                    .lower
                    .skip_null_elements_left(self.bounds[rank as usize] - 1);
                let _ = context.set_upper_bound(&x[var_index], bound)?;
            }
        }

        Ok(())
    }

    fn outside_stable_set(&self, lower_rank: i32, upper_rank: i32) -> bool {
        let stable_end = self.stable_interval[lower_rank as usize];
        stable_end <= lower_rank || upper_rank > stable_end
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::SmallRng;
    use rand::Rng;
    use rand::SeedableRng;

    use super::*;
    use crate::engine::test_solver::TestSolver;
    use crate::engine::variables::DomainId;

    fn post(
        solver: &mut TestSolver,
        x: &[DomainId],
        cards: &[DomainId],
        first_value: i32,
    ) -> Result<crate::propagation::PropagatorId, ConstraintOperationError> {
        solver.new_propagator(GlobalCardinalityArgs {
            x: x.into(),
            cards: cards.into(),
            first_value,
        })
    }

    #[test]
    fn value_with_zero_cardinality_is_removed() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(1, 2), solver.new_variable(1, 2)];
        let cards = [solver.new_variable(0, 0), solver.new_variable(0, 2)];

        let _ = post(&mut solver, &x, &cards, 1).expect("no empty domains");

        assert_eq!(vec![2], solver.domain(x[0]));
        assert_eq!(vec![2], solver.domain(x[1]));
        solver.assert_bounds(cards[1], 2, 2);
    }

    #[test]
    fn variables_are_restricted_to_the_value_range() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(-5, 10), solver.new_variable(0, 1)];
        let cards = [
            solver.new_variable(0, 5),
            solver.new_variable(0, 5),
            solver.new_variable(0, 5),
        ];

        let _ = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        solver.assert_bounds(x[0], 0, 2);
        solver.assert_bounds(cards[0], 0, 2);
        solver.assert_bounds(cards[2], 0, 1);
    }

    #[test]
    fn cardinalities_sum_to_the_number_of_variables() {
        let mut solver = TestSolver::default();
        let x = [
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
        ];
        let cards = [solver.new_variable(0, 1), solver.new_variable(0, 3)];

        let _ = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        solver.assert_bounds(cards[1], 2, 3);
    }

    #[test]
    fn saturated_value_is_removed_from_other_variables() {
        let mut solver = TestSolver::default();
        let x = [
            solver.new_variable(0, 2),
            solver.new_variable(0, 2),
            solver.new_variable(0, 2),
        ];
        let cards = [
            solver.new_variable(0, 1),
            solver.new_variable(0, 3),
            solver.new_variable(0, 3),
        ];

        let propagator = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        let _ = solver.fix(x[0], 0);
        solver.propagate(propagator).expect("feasible");

        assert!(!solver.contains(x[1], 0));
        assert!(!solver.contains(x[2], 0));
        solver.assert_bounds(cards[0], 1, 1);
    }

    #[test]
    fn removals_lower_the_maximum_cardinality() {
        let mut solver = TestSolver::default();
        let x = [
            solver.new_variable(0, 2),
            solver.new_variable(0, 2),
            solver.new_variable(0, 2),
        ];
        let cards = [
            solver.new_variable(0, 3),
            solver.new_variable(0, 3),
            solver.new_variable(0, 3),
        ];

        let propagator = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        let _ = solver.remove(x[0], 1);
        let _ = solver.remove(x[1], 1);
        solver.propagate(propagator).expect("feasible");

        solver.assert_bounds(cards[1], 0, 1);
    }

    #[test]
    fn occurrences_are_restored_on_backtrack() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(0, 1), solver.new_variable(0, 1)];
        let cards = [solver.new_variable(0, 2), solver.new_variable(0, 2)];

        let propagator = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        solver.new_checkpoint();
        let _ = solver.fix(x[0], 0);
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(cards[0], 1, 2);

        solver.synchronise(0);
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(cards[0], 0, 2);

        let _ = solver.fix(x[0], 1);
        solver.propagate(propagator).expect("feasible");
        solver.assert_bounds(cards[0], 0, 1);
        solver.assert_bounds(cards[1], 1, 2);
    }

    #[test]
    fn too_many_fixed_variables_is_infeasible() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(0, 0), solver.new_variable(0, 0)];
        let cards = [solver.new_variable(0, 1), solver.new_variable(0, 2)];

        let result = post(&mut solver, &x, &cards, 0);

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn unreachable_demand_is_infeasible() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(0, 1), solver.new_variable(0, 1)];
        let cards = [
            solver.new_variable(0, 2),
            solver.new_variable(0, 2),
            solver.new_variable(1, 2),
        ];

        let result = post(&mut solver, &x, &cards, 0);

        assert_eq!(Err(ConstraintOperationError::InfeasiblePropagator), result);
    }

    #[test]
    fn hall_intervals_push_both_bounds() {
        let mut solver = TestSolver::default();
        let x = [
            solver.new_variable(1, 2),
            solver.new_variable(1, 2),
            solver.new_variable(1, 5),
            solver.new_variable(4, 5),
            solver.new_variable(4, 5),
        ];
        let cards = [
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
            solver.new_variable(0, 1),
        ];

        let _ = post(&mut solver, &x, &cards, 1).expect("no empty domains");

        solver.assert_bounds(x[2], 3, 3);
    }

    #[test]
    fn required_occurrences_pull_bounds() {
        let mut solver = TestSolver::default();
        let x = [
            solver.new_variable(0, 2),
            solver.new_variable(1, 2),
            solver.new_variable(0, 2),
        ];
        let cards = [
            solver.new_variable(0, 3),
            solver.new_variable(0, 3),
            solver.new_variable(3, 3),
        ];

        let _ = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        for variable in x {
            solver.assert_bounds(variable, 2, 2);
        }
    }

    #[test]
    fn fixed_assignment_is_entailed() {
        let mut solver = TestSolver::default();
        let x = [solver.new_variable(0, 0), solver.new_variable(1, 1)];
        let cards = [solver.new_variable(1, 1), solver.new_variable(1, 1)];

        let propagator = post(&mut solver, &x, &cards, 0).expect("no empty domains");

        assert_eq!(Entailment::True, solver.is_entailed(propagator));
    }

    fn count_solutions(
        domains: &[Vec<i32>],
        card_domains: &[(i32, i32)],
        first_value: i32,
        visit: &mut impl FnMut(&[i32], &[i32]),
    ) {
        let mut assignment = Vec::with_capacity(domains.len());
        fn recurse(
            domains: &[Vec<i32>],
            card_domains: &[(i32, i32)],
            first_value: i32,
            assignment: &mut Vec<i32>,
            visit: &mut impl FnMut(&[i32], &[i32]),
        ) {
            if assignment.len() == domains.len() {
                let mut counts = vec![0; card_domains.len()];
                for &value in assignment.iter() {
                    match usize::try_from(value - first_value) {
                        Ok(index) if index < counts.len() => counts[index] += 1,
                        _ => return,
                    }
                }
                let within_cards = counts
                    .iter()
                    .zip(card_domains)
                    .all(|(&count, &(lb, ub))| lb <= count && count <= ub);
                if within_cards {
                    visit(assignment, &counts);
                }
                return;
            }

            for &value in domains[assignment.len()].iter() {
                assignment.push(value);
                recurse(domains, card_domains, first_value, assignment, visit);
                let _ = assignment.pop();
            }
        }
        recurse(domains, card_domains, first_value, &mut assignment, visit);
    }

    #[test]
    fn random_instances_keep_every_solution() {
        let mut rng = SmallRng::seed_from_u64(17);

        for _ in 0..300 {
            let num_variables = rng.gen_range(1..=4);
            let num_values = rng.gen_range(1..=4);
            let first_value = rng.gen_range(-1..=1);

            let domains = (0..num_variables)
                .map(|_| {
                    let lower_bound = rng.gen_range(first_value - 1..first_value + num_values);
                    let upper_bound = rng.gen_range(lower_bound..=first_value + num_values);
                    (lower_bound..=upper_bound)
                        .filter(|_| rng.gen_bool(0.8))
                        .collect::<Vec<_>>()
                })
                .filter(|domain| !domain.is_empty())
                .collect::<Vec<_>>();
            let card_domains = (0..num_values)
                .map(|_| {
                    let lower_bound = rng.gen_range(0..=2);
                    (lower_bound, rng.gen_range(lower_bound..=3))
                })
                .collect::<Vec<_>>();

            let mut solutions = Vec::new();
            count_solutions(
                &domains,
                &card_domains,
                first_value,
                &mut |assignment, counts| {
                    solutions.push((assignment.to_vec(), counts.to_vec()));
                },
            );

            let mut solver = TestSolver::default();
            let x = domains
                .iter()
                .map(|domain| solver.new_sparse_variable(domain.clone()))
                .collect::<Vec<_>>();
            let cards = card_domains
                .iter()
                .map(|&(lb, ub)| solver.new_variable(lb, ub))
                .collect::<Vec<_>>();

            let result = post(&mut solver, &x, &cards, first_value)
                .map_err(|_| ())
                .and_then(|_| solver.propagate_until_fixed_point().map_err(|_| ()));

            match result {
                Err(()) => assert!(
                    solutions.is_empty(),
                    "a feasible instance was declared infeasible: {domains:?} {card_domains:?}"
                ),
                Ok(()) => {
                    for (assignment, counts) in solutions {
                        for (var, value) in x.iter().zip(assignment.iter()) {
                            assert!(
                                solver.contains(*var, *value),
                                "value {value} was removed: {domains:?} {card_domains:?}"
                            );
                        }
                        for (card, count) in cards.iter().zip(counts.iter()) {
                            assert!(
                                solver.contains(*card, *count),
                                "count {count} was removed: {domains:?} {card_domains:?}"
                            );
                        }
                    }
                }
            }
        }
    }
}
