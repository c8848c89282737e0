//! Ordered, de-duplicated list of selected currencies and its persistence.

use crate::core::currency::{Currency, normalize_code};
use crate::core::error::{PersistenceError, SelectionError};
use crate::core::store::{SELECTED_CURRENCIES_KEY, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Insertion order is display order; codes are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Currency>", into = "Vec<Currency>")]
pub struct SelectionList {
    items: Vec<Currency>,
}

impl From<Vec<Currency>> for SelectionList {
    fn from(currencies: Vec<Currency>) -> Self {
        let mut list = SelectionList::default();
        for currency in currencies {
            list.push(currency);
        }
        list
    }
}

impl From<SelectionList> for Vec<Currency> {
    fn from(list: SelectionList) -> Self {
        list.items
    }
}

impl SelectionList {
    pub fn as_slice(&self) -> &[Currency] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Currency> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Currency> {
        self.items.iter().find(|c| c.code == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.get(code).is_some()
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|c| c.code.as_str())
    }

    fn push(&mut self, currency: Currency) -> bool {
        if self.contains(&currency.code) {
            return false;
        }
        self.items.push(currency);
        true
    }

    fn remove(&mut self, code: &str) -> bool {
        match self.items.iter().position(|c| c.code == code) {
            Some(index) => {
                self.items.remove(index);
                true
            }
            None => false,
        }
    }

    fn move_item(&mut self, from: usize, to: usize) -> bool {
        let len = self.items.len();
        if from >= len || to >= len {
            return false;
        }
        let currency = self.items.remove(from);
        self.items.insert(to, currency);
        true
    }
}

/// Owns the loaded selection and writes it back after every mutation.
/// Write failures are logged and swallowed.
pub struct SelectionRegistry {
    store: Arc<dyn Store>,
    defaults: Vec<Currency>,
    max_currencies: usize,
    list: SelectionList,
}

impl SelectionRegistry {
    pub async fn open(store: Arc<dyn Store>, defaults: Vec<Currency>, max_currencies: usize) -> Self {
        let mut registry = Self {
            store,
            defaults,
            max_currencies,
            list: SelectionList::default(),
        };
        registry.list = registry.load().await;
        registry
    }

    /// Reads the persisted selection, or the defaults when it is absent or
    /// unreadable.
    pub async fn load(&self) -> SelectionList {
        let stored = match self.store.get(SELECTED_CURRENCIES_KEY).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to read selected currencies");
                None
            }
        };

        let parsed = stored.and_then(|bytes| {
            serde_json::from_slice::<SelectionList>(&bytes)
                .map_err(|e| warn!(error = %e, "Discarding unreadable selected currencies"))
                .ok()
        });

        match parsed {
            Some(list) => {
                debug!(count = list.len(), "Loaded selected currencies");
                list
            }
            None => {
                debug!("Using default currencies");
                SelectionList::from(self.defaults.clone())
            }
        }
    }

    pub async fn save(&self, list: &SelectionList) {
        if let Err(e) = self.try_save(list).await {
            warn!(error = %e, "Failed to save selected currencies");
        }
    }

    async fn try_save(&self, list: &SelectionList) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(list).map_err(|source| PersistenceError::Encode {
            key: SELECTED_CURRENCIES_KEY.to_string(),
            source,
        })?;
        self.store.set(SELECTED_CURRENCIES_KEY, bytes).await
    }

    pub fn list(&self) -> &SelectionList {
        &self.list
    }

    /// Appends and persists. Returns `Ok(false)` without writing when the
    /// code is already selected.
    pub async fn add(&mut self, currency: Currency) -> Result<bool, SelectionError> {
        if self.list.contains(&currency.code) {
            debug!(code = %currency.code, "Currency already selected");
            return Ok(false);
        }
        if self.list.len() >= self.max_currencies {
            return Err(SelectionError::LimitExceeded {
                max: self.max_currencies,
            });
        }
        self.list.push(currency);
        self.save(&self.list).await;
        Ok(true)
    }

    /// Removes the entry with a matching code. Not-found is not an error.
    pub async fn remove(&mut self, code: &str) -> bool {
        let removed = self.list.remove(&normalize_code(code));
        if removed {
            self.save(&self.list).await;
        }
        removed
    }

    /// Reorders in place. Out-of-range indices leave the list untouched.
    pub async fn move_currency(&mut self, from: usize, to: usize) -> bool {
        let moved = self.list.move_item(from, to);
        if moved {
            self.save(&self.list).await;
        } else {
            debug!(from, to, len = self.list.len(), "Ignoring out-of-range move");
        }
        moved
    }
}
