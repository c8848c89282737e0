//! Core business logic abstractions

pub mod currency;
pub mod error;
pub mod log;
pub mod provider;
pub mod rates;
pub mod store;

// Re-export main types for cleaner imports
pub use currency::{Currency, CurrencyClass};
pub use error::{FetchError, PersistenceError, SelectionError};
pub use provider::{RateProvider, RateSource};
pub use rates::RateTable;
pub use store::Store;
