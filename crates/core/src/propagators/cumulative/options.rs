/// The options of the cumulative constraint.
#[derive(Debug, Clone, Copy)]
pub struct CumulativeOptions {
    /// The filtering algorithm used by the propagator.
    pub filter: CumulativeFilterKind,
    /// Whether to maintain an overlap graph and only filter the tasks around a change, instead
    /// of filtering every task on every call.
    pub incremental: bool,
    /// The incremental propagator filters all tasks when the number of changes since its last
    /// call reaches this factor times the number of tasks.
    pub incremental_threshold_factor: usize,
    /// The default filter uses the time-table when the horizon is at most this factor times the
    /// squared number of tasks, and sweeps otherwise.
    pub time_table_horizon_factor: i64,
    /// The default filter adds disjunctive reasoning when fewer tasks than this pairwise exceed
    /// the capacity.
    pub disjunctive_max_tasks: usize,
    /// None of the filters is idempotent; posting the propagator twice gets closer to a fixpoint.
    pub post_twice: bool,
}

impl Default for CumulativeOptions {
    fn default() -> Self {
        CumulativeOptions {
            filter: CumulativeFilterKind::default(),
            incremental: false,
            incremental_threshold_factor: 2,
            time_table_horizon_factor: 1,
            disjunctive_max_tasks: 50,
            post_twice: true,
        }
    }
}

/// The filtering algorithm of a cumulative propagator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum CumulativeFilterKind {
    /// Time-table reasoning over an array with one entry per time point.
    TimeTable,
    /// Time-table reasoning over the rectangles of a sweep over the compulsory parts.
    Sweep,
    /// The sweep, visiting tasks by decreasing height so it can stop early.
    SweepHeightSorted,
    /// Energetic reasoning over time windows.
    Energy,
    /// Disjunctive reasoning over the tasks which pairwise exceed the capacity.
    DisjunctiveTaskInterval,
    /// The time-table or sweep depending on the horizon, plus energetic and disjunctive reasoning.
    #[default]
    Default,
}
