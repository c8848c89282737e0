use crate::core::rates::RateTable;
use crate::engine::selection::SelectionList;
use chrono::{DateTime, TimeDelta, Utc};

/// Source of "now" for staleness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshReason {
    EmptyTable,
    NeverFetched,
    Stale { age: TimeDelta },
    MissingRates(Vec<String>),
}

#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    pub window: TimeDelta,
}

impl StalenessPolicy {
    pub fn new(window: TimeDelta) -> Self {
        Self { window }
    }

    /// Why the table should be refetched, or `None` while it is still good.
    /// The base currency never needs a rate of its own.
    pub fn evaluate(
        &self,
        table: &RateTable,
        selection: &SelectionList,
        base_currency: &str,
        last_fetched_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<RefreshReason> {
        if table.is_empty() {
            return Some(RefreshReason::EmptyTable);
        }

        let Some(fetched_at) = last_fetched_at else {
            return Some(RefreshReason::NeverFetched);
        };
        let age = now - fetched_at;
        if age > self.window {
            return Some(RefreshReason::Stale { age });
        }

        let missing: Vec<String> = selection
            .codes()
            .filter(|code| *code != base_currency && !table.contains(code))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Some(RefreshReason::MissingRates(missing));
        }

        None
    }
}
