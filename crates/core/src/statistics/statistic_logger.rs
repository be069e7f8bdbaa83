use std::fmt::Display;

use itertools::Itertools;

use super::statistic_logging::log_statistic;

/// Writes statistics under a name built from a chain of prefixes, e.g.
/// `cumulative_sweep_number_of_calls`.
#[derive(Debug, Default, Clone)]
pub struct StatisticLogger {
    name_prefix: String,
}

impl StatisticLogger {
    pub fn new<Input: IntoIterator<Item = impl Display>>(name_prefix: Input) -> Self {
        Self {
            name_prefix: name_prefix.into_iter().join("_"),
        }
    }

    pub fn attach_to_prefix(&self, addition_to_prefix: impl Display) -> Self {
        Self {
            name_prefix: format!("{}_{}", self.name_prefix, addition_to_prefix),
        }
    }

    pub fn log_statistic(&self, value: impl Display) {
        log_statistic(&self.name_prefix, value);
    }

    pub(crate) fn name(&self) -> &str {
        &self.name_prefix
    }
}
