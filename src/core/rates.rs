//! Unified rate table and the directional conversion math.
//!
//! Fiat rates are stored as units of the currency per one unit of the base,
//! crypto rates as units of the base per one coin. The table itself never
//! inverts anything; the direction is chosen by [`to_base`] and [`from_base`]
//! from the currency class.

use crate::core::currency::{CurrencyClass, normalize_code};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    rates: BTreeMap<String, f64>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rate under its canonical code. Zero, negative and
    /// non-finite rates mean "unavailable" and are dropped. Returns whether
    /// the rate was stored.
    pub fn insert(&mut self, code: &str, rate: f64) -> bool {
        if !rate.is_finite() || rate <= 0.0 {
            debug!(code, rate, "Dropping unusable rate");
            return false;
        }
        self.rates.insert(normalize_code(code), rate);
        true
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, f64> {
        self.rates.iter()
    }

    /// Union with `other`; entries from `other` win. Nothing already held is
    /// ever removed.
    pub fn merge(&mut self, other: &RateTable) {
        for (code, rate) in other.iter() {
            self.rates.insert(code.clone(), *rate);
        }
    }

    /// Drops entries that violate the table invariant. Used on tables read
    /// back from storage.
    pub fn sanitized(self) -> Self {
        self.rates
            .into_iter()
            .fold(RateTable::new(), |mut table, (code, rate)| {
                table.insert(&code, rate);
                table
            })
    }
}

impl FromIterator<(String, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for (code, rate) in iter {
            table.insert(&code, rate);
        }
        table
    }
}

impl<'a> IntoIterator for &'a RateTable {
    type Item = (&'a String, &'a f64);
    type IntoIter = btree_map::Iter<'a, String, f64>;

    fn into_iter(self) -> Self::IntoIter {
        self.rates.iter()
    }
}

/// Value of `amount` units of a non-base currency expressed in the base.
pub fn to_base(amount: f64, class: CurrencyClass, rate: f64) -> f64 {
    match class {
        // coins * base-per-coin
        CurrencyClass::Crypto => amount * rate,
        // units / units-per-base
        CurrencyClass::Fiat => amount / rate,
    }
}

/// Inverse of [`to_base`].
pub fn from_base(base_amount: f64, class: CurrencyClass, rate: f64) -> f64 {
    match class {
        CurrencyClass::Crypto => base_amount / rate,
        CurrencyClass::Fiat => base_amount * rate,
    }
}
