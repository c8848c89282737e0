//! Conversion engine: canonical amount, rate table and selection behind one
//! serialized owner.
//!
//! The engine keeps a single amount expressed in the base currency and
//! derives every displayed amount from it. Rates are refreshed through an
//! injected [`RateProvider`] and fall back to the [`RateCache`] when the
//! upstreams fail. UIs observe changes through [`ConversionEngine::subscribe`].

pub mod rate_cache;
pub mod selection;
pub mod staleness;

use crate::config::AppConfig;
use crate::core::currency::{Currency, CurrencyClass, find_currency, normalize_code};
use crate::core::error::{FetchError, SelectionError};
use crate::core::provider::RateProvider;
use crate::core::rates::{RateTable, from_base, to_base};
use crate::core::store::Store;
use chrono::{DateTime, TimeDelta, Utc};
use rate_cache::RateCache;
use selection::{SelectionList, SelectionRegistry};
use staleness::{Clock, RefreshReason, StalenessPolicy, SystemClock};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_currency: String,
    pub staleness_window: TimeDelta,
    pub max_currencies: usize,
    pub default_currencies: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for EngineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_currency: normalize_code(&config.base_currency),
            staleness_window: config.staleness_window(),
            max_currencies: config.max_currencies,
            default_currencies: config.default_currencies.clone(),
        }
    }
}

/// Change notifications for UI layers.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    AmountChanged,
    SelectionChanged,
    RatesUpdated,
    LoadingChanged(bool),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Fresh rates were merged. `missing` lists requested codes the
    /// upstreams did not answer for.
    Fetched { missing: Vec<String> },
    /// Upstreams failed and the cached table was installed instead.
    FromCache,
    /// Upstreams failed and nothing was cached.
    Failed(FetchError),
    /// Another fetch was in flight; this call did nothing.
    AlreadyInFlight,
}

/// Amount shown for one selected currency. `rate` is `None` when no rate is
/// known and `amount` is the unconverted canonical amount.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayRow {
    pub currency: Currency,
    pub amount: f64,
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionState {
    /// Amount of money being converted, in base currency units.
    pub canonical_amount: f64,
    /// Currency whose field the user is typing into.
    pub editing_code: Option<String>,
}

impl Default for ConversionState {
    fn default() -> Self {
        Self {
            canonical_amount: 1.0,
            editing_code: None,
        }
    }
}

struct EngineState {
    conversion: ConversionState,
    rates: RateTable,
    selection: SelectionList,
    last_fetched_at: Option<DateTime<Utc>>,
    is_loading: bool,
    error_message: Option<String>,
}

impl EngineState {
    fn class_of(&self, code: &str) -> CurrencyClass {
        self.selection
            .get(code)
            .map(|c| c.class)
            .or_else(|| find_currency(code).map(|c| c.class))
            .unwrap_or(CurrencyClass::Fiat)
    }

    fn rate_of(&self, code: &str, base_currency: &str) -> Option<f64> {
        if code == base_currency {
            Some(1.0)
        } else {
            self.rates.get(code)
        }
    }

    fn to_base(&self, amount: f64, code: &str, base_currency: &str) -> Option<f64> {
        if code == base_currency {
            return Some(amount);
        }
        let rate = self.rates.get(code)?;
        Some(to_base(amount, self.class_of(code), rate))
    }

    fn from_base(&self, base_amount: f64, code: &str, base_currency: &str) -> Option<f64> {
        if code == base_currency {
            return Some(base_amount);
        }
        let rate = self.rates.get(code)?;
        Some(from_base(base_amount, self.class_of(code), rate))
    }
}

/// Clears the loading flag however the fetch ends, including when its future
/// is dropped mid-flight.
struct LoadingGuard<'a> {
    engine: &'a ConversionEngine,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.engine.state().is_loading = false;
        self.engine.notify(EngineEvent::LoadingChanged(false));
    }
}

pub struct ConversionEngine {
    provider: Arc<dyn RateProvider>,
    cache: RateCache,
    registry: tokio::sync::Mutex<SelectionRegistry>,
    state: Mutex<EngineState>,
    events: broadcast::Sender<EngineEvent>,
    clock: Arc<dyn Clock>,
    policy: StalenessPolicy,
    base_currency: String,
}

fn resolve_currencies(codes: &[String]) -> Vec<Currency> {
    codes
        .iter()
        .filter_map(|code| {
            let found = find_currency(code);
            if found.is_none() {
                warn!(code = %code, "Unknown default currency, skipping");
            }
            found
        })
        .collect()
}

impl ConversionEngine {
    pub async fn new(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn Store>,
        config: EngineConfig,
    ) -> Self {
        Self::with_clock(provider, store, config, Arc::new(SystemClock)).await
    }

    /// Loads the persisted selection and cached rates.
    pub async fn with_clock(
        provider: Arc<dyn RateProvider>,
        store: Arc<dyn Store>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let defaults = resolve_currencies(&config.default_currencies);
        let registry =
            SelectionRegistry::open(Arc::clone(&store), defaults, config.max_currencies).await;
        let cache = RateCache::new(store);

        let (rates, last_fetched_at) = match cache.load().await {
            Some(cached) => (cached.table, cached.fetched_at),
            None => (RateTable::new(), None),
        };
        debug!(
            selected = registry.list().len(),
            cached_rates = rates.len(),
            ?last_fetched_at,
            "Conversion engine ready"
        );

        let state = EngineState {
            conversion: ConversionState::default(),
            rates,
            selection: registry.list().clone(),
            last_fetched_at,
            is_loading: false,
            error_message: None,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            provider,
            cache,
            registry: tokio::sync::Mutex::new(registry),
            state: Mutex::new(state),
            events,
            clock,
            policy: StalenessPolicy::new(config.staleness_window),
            base_currency: normalize_code(&config.base_currency),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    // Amounts

    /// Sets the canonical amount from an amount typed in `code`. Without a
    /// rate for `code` the previous amount is kept.
    pub fn update_amount(&self, amount: f64, code: &str) {
        let code = normalize_code(code);
        {
            let mut state = self.state();
            state.conversion.editing_code = Some(code.clone());

            if !amount.is_finite() {
                debug!(code = %code, amount, "Ignoring non-finite amount");
                return;
            }
            match state.to_base(amount, &code, &self.base_currency) {
                Some(canonical) => state.conversion.canonical_amount = canonical,
                None => {
                    debug!(code = %code, "No rate yet, keeping previous amount");
                    return;
                }
            }
        }
        self.notify(EngineEvent::AmountChanged);
    }

    /// Amount of `code` equivalent to the canonical amount. Falls back to the
    /// canonical amount itself when no rate is known.
    pub fn display_amount(&self, code: &str) -> f64 {
        let code = normalize_code(code);
        let state = self.state();
        let canonical = state.conversion.canonical_amount;
        state
            .from_base(canonical, &code, &self.base_currency)
            .unwrap_or(canonical)
    }

    /// Converts through the base without touching engine state.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> Option<f64> {
        let (from, to) = (normalize_code(from), normalize_code(to));
        let state = self.state();
        let base_amount = state.to_base(amount, &from, &self.base_currency)?;
        state.from_base(base_amount, &to, &self.base_currency)
    }

    pub fn display_rows(&self) -> Vec<DisplayRow> {
        let state = self.state();
        let canonical = state.conversion.canonical_amount;
        state
            .selection
            .iter()
            .map(|currency| {
                let rate = state.rate_of(&currency.code, &self.base_currency);
                let amount = state
                    .from_base(canonical, &currency.code, &self.base_currency)
                    .unwrap_or(canonical);
                DisplayRow {
                    currency: currency.clone(),
                    amount,
                    rate,
                }
            })
            .collect()
    }

    pub fn conversion_state(&self) -> ConversionState {
        self.state().conversion.clone()
    }

    pub fn canonical_amount(&self) -> f64 {
        self.state().conversion.canonical_amount
    }

    pub fn editing_code(&self) -> Option<String> {
        self.state().conversion.editing_code.clone()
    }

    // Rates

    pub fn rates(&self) -> RateTable {
        self.state().rates.clone()
    }

    pub fn rate(&self, code: &str) -> Option<f64> {
        self.state()
            .rate_of(&normalize_code(code), &self.base_currency)
    }

    pub fn last_fetched_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_fetched_at
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn error_message(&self) -> Option<String> {
        self.state().error_message.clone()
    }

    /// Evaluated fresh on every call, since the selection may have changed.
    pub fn needs_refresh(&self) -> Option<RefreshReason> {
        let now = self.clock.now();
        let state = self.state();
        self.policy.evaluate(
            &state.rates,
            &state.selection,
            &self.base_currency,
            state.last_fetched_at,
            now,
        )
    }

    /// Fetches only when the table is empty, stale, or missing a selected
    /// code. Returns `None` when nothing was fetched.
    pub async fn fetch_rates_if_needed(&self) -> Option<FetchOutcome> {
        match self.needs_refresh() {
            Some(reason) => {
                debug!(?reason, "Refreshing rates");
                Some(self.fetch_rates().await)
            }
            None => {
                debug!("Rates are fresh, skipping fetch");
                None
            }
        }
    }

    /// Runs [`Self::fetch_rates_if_needed`] on a background task.
    pub fn spawn_refresh(self: &Arc<Self>) -> JoinHandle<Option<FetchOutcome>> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.fetch_rates_if_needed().await })
    }

    /// Unconditional refresh. A call made while another fetch is in flight
    /// is ignored.
    pub async fn fetch_rates(&self) -> FetchOutcome {
        let requested: Vec<Currency> = {
            let mut state = self.state();
            if state.is_loading {
                debug!("Fetch already in flight, ignoring");
                return FetchOutcome::AlreadyInFlight;
            }
            state.is_loading = true;
            state.selection.as_slice().to_vec()
        };
        self.notify(EngineEvent::LoadingChanged(true));
        let _loading = LoadingGuard { engine: self };

        match self.provider.fetch(&requested).await {
            Ok(fetched) => self.install_fetched(&requested, fetched).await,
            Err(err) => self.fall_back_to_cache(err).await,
        }
    }

    async fn install_fetched(&self, requested: &[Currency], fetched: RateTable) -> FetchOutcome {
        let now = self.clock.now();
        let missing: Vec<String> = requested
            .iter()
            .map(|c| c.code.clone())
            .filter(|code| *code != self.base_currency && !fetched.contains(code))
            .collect();

        // Never shrink: codes outside this fetch keep their last known rate.
        let merged = {
            let mut state = self.state();
            state.rates.merge(&fetched);
            state.last_fetched_at = Some(now);
            state.error_message = None;
            state.rates.clone()
        };
        info!(
            fetched = fetched.len(),
            total = merged.len(),
            ?missing,
            "Rates updated"
        );
        self.notify(EngineEvent::RatesUpdated);

        self.cache.save(&merged, now).await;
        FetchOutcome::Fetched { missing }
    }

    async fn fall_back_to_cache(&self, err: FetchError) -> FetchOutcome {
        match self.cache.load().await {
            Some(cached) => {
                warn!(error = %err, "Rate fetch failed, using cached rates");
                {
                    // last_fetched_at keeps tracking the real fetch time
                    let mut state = self.state();
                    state.rates = cached.table;
                    state.error_message = None;
                }
                self.notify(EngineEvent::RatesUpdated);
                FetchOutcome::FromCache
            }
            None => {
                error!(error = %err, "Rate fetch failed and no cached rates exist");
                let message = err.to_string();
                self.state().error_message = Some(message.clone());
                self.notify(EngineEvent::Error(message));
                FetchOutcome::Failed(err)
            }
        }
    }

    // Selection

    pub fn selected_currencies(&self) -> Vec<Currency> {
        self.state().selection.as_slice().to_vec()
    }

    /// The UI keeps at least one currency selected; the engine itself
    /// tolerates an empty selection.
    pub fn can_remove_more(&self) -> bool {
        self.state().selection.len() > 1
    }

    /// Appends `currency` and refreshes rates if the new code needs one.
    /// Returns `Ok(false)` when the code was already selected.
    pub async fn add_currency(&self, currency: Currency) -> Result<bool, SelectionError> {
        let added = {
            let mut registry = self.registry.lock().await;
            match registry.add(currency).await {
                Ok(added) => {
                    if added {
                        self.state().selection = registry.list().clone();
                    }
                    added
                }
                Err(e) => {
                    let message = e.to_string();
                    self.state().error_message = Some(message.clone());
                    self.notify(EngineEvent::Error(message));
                    return Err(e);
                }
            }
        };

        if added {
            self.notify(EngineEvent::SelectionChanged);
            if let Some(outcome) = self.fetch_rates_if_needed().await {
                debug!(?outcome, "Refreshed rates after adding a currency");
            }
        }
        Ok(added)
    }

    pub async fn remove_currency(&self, code: &str) -> bool {
        let removed = {
            let mut registry = self.registry.lock().await;
            let removed = registry.remove(code).await;
            if removed {
                self.state().selection = registry.list().clone();
            }
            removed
        };
        if removed {
            self.notify(EngineEvent::SelectionChanged);
        }
        removed
    }

    pub async fn move_currency(&self, from: usize, to: usize) -> bool {
        let moved = {
            let mut registry = self.registry.lock().await;
            let moved = registry.move_currency(from, to).await;
            if moved {
                self.state().selection = registry.list().clone();
            }
            moved
        };
        if moved {
            self.notify(EngineEvent::SelectionChanged);
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::PersistenceError;
    use crate::core::store::{LAST_RATES_KEY, LAST_UPDATE_KEY, SELECTED_CURRENCIES_KEY};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TOLERANCE: f64 = 1e-9;

    fn assert_close(actual: f64, expected: f64) {
        let scale = expected.abs().max(1.0);
        assert!(
            (actual - expected).abs() <= TOLERANCE * scale,
            "expected {expected}, got {actual}"
        );
    }

    struct ManualClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()),
            }
        }

        fn advance(&self, delta: TimeDelta) {
            *self.now.lock().unwrap() += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    /// Replays queued results, then keeps failing.
    struct ScriptedProvider {
        results: Mutex<VecDeque<Result<RateTable, FetchError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedProvider {
        fn new(results: Vec<Result<RateTable, FetchError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for ScriptedProvider {
        async fn fetch(&self, _currencies: &[Currency]) -> Result<RateTable, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(offline()))
        }
    }

    struct FailingStore;

    #[async_trait]
    impl Store for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
            Err(PersistenceError::Backend("read-only volume".to_string()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>) -> Result<(), PersistenceError> {
            Err(PersistenceError::Backend("read-only volume".to_string()))
        }
    }

    fn offline() -> FetchError {
        FetchError::Network {
            source_name: "test".to_string(),
            message: "offline".to_string(),
        }
    }

    fn rates(entries: &[(&str, f64)]) -> RateTable {
        entries
            .iter()
            .map(|(code, rate)| (code.to_string(), *rate))
            .collect()
    }

    fn scenario_rates() -> RateTable {
        rates(&[("USD", 1.0), ("EUR", 0.85), ("BTC", 50000.0)])
    }

    fn config(defaults: &[&str]) -> EngineConfig {
        EngineConfig {
            default_currencies: defaults.iter().map(|c| c.to_string()).collect(),
            ..EngineConfig::default()
        }
    }

    async fn engine_with(
        provider: Arc<ScriptedProvider>,
        store: Arc<MemoryStore>,
        defaults: &[&str],
    ) -> (ConversionEngine, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let engine =
            ConversionEngine::with_clock(provider, store, config(defaults), clock.clone()).await;
        (engine, clock)
    }

    async fn loaded_engine() -> ConversionEngine {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(scenario_rates())]));
        let (engine, _) = engine_with(
            provider,
            Arc::new(MemoryStore::new()),
            &["USD", "EUR", "BTC"],
        )
        .await;
        engine.fetch_rates().await;
        engine
    }

    #[tokio::test]
    async fn test_initial_state() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (engine, _) = engine_with(provider, Arc::new(MemoryStore::new()), &["USD", "CNY", "RUB", "BTC"]).await;

        assert_eq!(engine.canonical_amount(), 1.0);
        assert!(engine.editing_code().is_none());
        assert!(engine.rates().is_empty());
        assert!(!engine.is_loading());
        assert!(engine.error_message().is_none());
        let codes: Vec<String> = engine
            .selected_currencies()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["USD", "CNY", "RUB", "BTC"]);
    }

    #[tokio::test]
    async fn test_usd_eur_btc_scenario() {
        let engine = loaded_engine().await;

        engine.update_amount(100.0, "USD");
        assert_close(engine.display_amount("EUR"), 85.0);
        assert_close(engine.display_amount("BTC"), 0.002);

        engine.update_amount(1.0, "BTC");
        assert_close(engine.display_amount("USD"), 50000.0);
        assert_close(engine.display_amount("EUR"), 42500.0);

        let conversion = engine.conversion_state();
        assert_eq!(conversion.editing_code.as_deref(), Some("BTC"));
        assert_close(conversion.canonical_amount, 50000.0);
    }

    #[tokio::test]
    async fn test_round_trip_identity() {
        let engine = loaded_engine().await;

        for code in ["USD", "EUR", "BTC"] {
            for amount in [0.0, 0.001, 1.0, 42.5, 1234567.89] {
                engine.update_amount(amount, code);
                assert_close(engine.display_amount(code), amount);
            }
        }
    }

    #[tokio::test]
    async fn test_transitivity_through_base() {
        let engine = loaded_engine().await;

        for (from, to) in [("EUR", "BTC"), ("BTC", "EUR"), ("USD", "BTC"), ("EUR", "USD")] {
            let amount = 250.0;
            engine.update_amount(amount, from);
            let via_state = engine.display_amount(to);
            let direct = engine.convert(amount, from, to).unwrap();
            assert_close(via_state, direct);
        }

        // 85 EUR -> 100 USD -> 0.002 BTC
        assert_close(engine.convert(85.0, "EUR", "BTC").unwrap(), 0.002);
    }

    #[tokio::test]
    async fn test_missing_rate_degrades() {
        let engine = loaded_engine().await;
        engine.update_amount(100.0, "USD");

        // Update for a code without a rate keeps the previous amount
        engine.update_amount(5.0, "RUB");
        assert_eq!(engine.canonical_amount(), 100.0);
        assert_eq!(engine.editing_code().as_deref(), Some("RUB"));

        // Display falls back to the canonical amount
        assert_eq!(engine.display_amount("RUB"), 100.0);
        assert!(engine.convert(1.0, "RUB", "EUR").is_none());
        assert!(engine.rate("RUB").is_none());
        assert_eq!(engine.rate("USD"), Some(1.0));
    }

    #[tokio::test]
    async fn test_non_finite_amount_is_ignored() {
        let engine = loaded_engine().await;
        engine.update_amount(10.0, "USD");
        engine.update_amount(f64::NAN, "EUR");
        assert_eq!(engine.canonical_amount(), 10.0);
    }

    #[tokio::test]
    async fn test_update_for_unselected_code_uses_catalog_class() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(rates(&[
            ("EUR", 0.85),
            ("ETH", 2000.0),
        ]))]));
        let (engine, _) = engine_with(provider, Arc::new(MemoryStore::new()), &["USD", "EUR"]).await;
        engine.fetch_rates().await;

        // ETH is not selected but known as crypto
        engine.update_amount(2.0, "eth");
        assert_close(engine.canonical_amount(), 4000.0);
    }

    #[tokio::test]
    async fn test_display_rows() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(rates(&[
            ("EUR", 0.85),
            ("BTC", 50000.0),
        ]))]));
        let (engine, _) =
            engine_with(provider, Arc::new(MemoryStore::new()), &["USD", "EUR", "RUB", "BTC"]).await;
        engine.fetch_rates().await;
        engine.update_amount(200.0, "USD");

        let rows = engine.display_rows();
        let summary: Vec<(&str, Option<f64>)> = rows
            .iter()
            .map(|r| (r.currency.code.as_str(), r.rate))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("USD", Some(1.0)),
                ("EUR", Some(0.85)),
                ("RUB", None),
                ("BTC", Some(50000.0))
            ]
        );
        assert_close(rows[1].amount, 170.0);
        assert_eq!(rows[2].amount, 200.0);
        assert_close(rows[3].amount, 0.004);
    }

    #[tokio::test]
    async fn test_empty_selection_yields_no_rows() {
        let engine = loaded_engine().await;
        for code in ["USD", "EUR", "BTC"] {
            assert!(engine.remove_currency(code).await);
        }
        assert!(engine.display_rows().is_empty());
        assert!(!engine.can_remove_more());
        assert_close(engine.display_amount("EUR"), 0.85);
    }

    #[tokio::test]
    async fn test_fetch_if_needed_is_noop_when_fresh() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(scenario_rates()),
            Ok(scenario_rates()),
        ]));
        let (engine, clock) = engine_with(
            provider.clone(),
            Arc::new(MemoryStore::new()),
            &["USD", "EUR", "BTC"],
        )
        .await;

        // Empty table triggers the first fetch
        assert_eq!(engine.needs_refresh(), Some(RefreshReason::EmptyTable));
        assert!(engine.fetch_rates_if_needed().await.is_some());
        assert_eq!(provider.calls(), 1);

        clock.advance(TimeDelta::hours(6));
        assert!(engine.fetch_rates_if_needed().await.is_none());
        assert_eq!(provider.calls(), 1);

        // Past the staleness window the predicate flips
        clock.advance(TimeDelta::minutes(1));
        assert!(matches!(
            engine.needs_refresh(),
            Some(RefreshReason::Stale { .. })
        ));
        assert!(engine.fetch_rates_if_needed().await.is_some());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_adding_currency_without_rate_triggers_fetch() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(scenario_rates()),
            Ok(rates(&[("RUB", 90.0)])),
        ]));
        let (engine, _) = engine_with(
            provider.clone(),
            Arc::new(MemoryStore::new()),
            &["USD", "EUR", "BTC"],
        )
        .await;
        engine.fetch_rates().await;

        let added = engine
            .add_currency(Currency::fiat("RUB", "Russian Ruble"))
            .await
            .unwrap();

        assert!(added);
        assert_eq!(provider.calls(), 2);
        assert_eq!(engine.rate("RUB"), Some(90.0));
        // Earlier rates survive the narrower fetch result
        assert_eq!(engine.rate("BTC"), Some(50000.0));
    }

    #[tokio::test]
    async fn test_add_currency_is_idempotent() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(scenario_rates())]));
        let store = Arc::new(MemoryStore::new());
        let (engine, _) = engine_with(provider.clone(), store.clone(), &["USD", "EUR", "BTC"]).await;
        engine.fetch_rates().await;

        let added = engine
            .add_currency(Currency::fiat("EUR", "Euro"))
            .await
            .unwrap();

        assert!(!added);
        assert_eq!(engine.selected_currencies().len(), 3);
        // Nothing was written for the selection and no refetch happened
        assert!(store.get(SELECTED_CURRENCIES_KEY).await.unwrap().is_none());
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_add_currency_limit_is_reported() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let clock = Arc::new(ManualClock::new());
        let config = EngineConfig {
            max_currencies: 2,
            ..config(&["USD", "EUR"])
        };
        let engine = ConversionEngine::with_clock(
            provider,
            Arc::new(MemoryStore::new()),
            config,
            clock,
        )
        .await;
        let mut events = engine.subscribe();

        let result = engine.add_currency(Currency::crypto("BTC", "Bitcoin")).await;

        assert_eq!(result, Err(SelectionError::LimitExceeded { max: 2 }));
        assert_eq!(engine.selected_currencies().len(), 2);
        assert_eq!(
            engine.error_message().as_deref(),
            Some("Maximum number of currencies reached (2)")
        );
        assert!(matches!(events.try_recv(), Ok(EngineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_partial_success_keeps_known_rates() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(scenario_rates()),
            // Crypto partition failed upstream: only fiat came back
            Ok(rates(&[("USD", 1.0), ("EUR", 0.9)])),
        ]));
        let store = Arc::new(MemoryStore::new());
        let (engine, _) = engine_with(provider, store.clone(), &["USD", "EUR", "BTC"]).await;
        engine.fetch_rates().await;

        let outcome = engine.fetch_rates().await;

        assert_eq!(
            outcome,
            FetchOutcome::Fetched {
                missing: vec!["BTC".to_string()]
            }
        );
        assert_eq!(engine.rate("EUR"), Some(0.9));
        assert_eq!(engine.rate("BTC"), Some(50000.0));

        // The merged table is what gets cached
        let cached: RateTable =
            serde_json::from_slice(&store.get(LAST_RATES_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(cached.get("BTC"), Some(50000.0));
        assert_eq!(cached.get("EUR"), Some(0.9));
    }

    #[tokio::test]
    async fn test_failure_with_cache_installs_cached_table() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(scenario_rates())]));
        let (first, clock) = engine_with(provider, store.clone(), &["USD", "EUR", "BTC"]).await;
        first.fetch_rates().await;
        let fetched_at = first.last_fetched_at().unwrap();
        clock.advance(TimeDelta::hours(7));

        // A later session starts from the cache, then fails to refresh
        let offline_provider = Arc::new(ScriptedProvider::new(vec![]));
        let engine = ConversionEngine::with_clock(
            offline_provider,
            store,
            config(&["USD", "EUR", "BTC"]),
            clock,
        )
        .await;
        assert_eq!(engine.rates(), scenario_rates());
        let outcome = engine.fetch_rates().await;

        assert_eq!(outcome, FetchOutcome::FromCache);
        assert!(engine.error_message().is_none());
        assert_eq!(engine.rates(), scenario_rates());
        assert!(!engine.is_loading());
        // Staleness still tracks the real fetch time
        assert_eq!(engine.last_fetched_at(), Some(fetched_at));
        assert!(matches!(
            engine.needs_refresh(),
            Some(RefreshReason::Stale { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_without_cache_surfaces_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(offline())]));
        let (engine, _) = engine_with(provider, Arc::new(MemoryStore::new()), &["USD", "EUR"]).await;
        let mut events = engine.subscribe();

        let outcome = engine.fetch_rates().await;

        assert_eq!(outcome, FetchOutcome::Failed(offline()));
        assert_eq!(
            engine.error_message().as_deref(),
            Some("Network error from test: offline")
        );
        assert!(engine.rates().is_empty());
        assert!(!engine.is_loading());
        assert!(engine.last_fetched_at().is_none());

        assert_eq!(events.try_recv().unwrap(), EngineEvent::LoadingChanged(true));
        assert!(matches!(events.try_recv().unwrap(), EngineEvent::Error(_)));
        assert_eq!(events.try_recv().unwrap(), EngineEvent::LoadingChanged(false));
    }

    #[tokio::test]
    async fn test_success_clears_previous_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(offline()),
            Ok(scenario_rates()),
        ]));
        let store = Arc::new(MemoryStore::new());
        let (engine, clock) = engine_with(provider, store.clone(), &["USD", "EUR", "BTC"]).await;

        engine.fetch_rates().await;
        assert!(engine.error_message().is_some());

        engine.fetch_rates().await;
        assert!(engine.error_message().is_none());
        assert_eq!(engine.last_fetched_at(), Some(clock.now()));

        let stored_at: DateTime<Utc> =
            serde_json::from_slice(&store.get(LAST_UPDATE_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored_at, clock.now());
    }

    #[tokio::test]
    async fn test_concurrent_fetch_is_ignored() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![Ok(scenario_rates()), Ok(scenario_rates())])
                .with_delay(Duration::from_millis(50)),
        );
        let (engine, _) = engine_with(
            provider.clone(),
            Arc::new(MemoryStore::new()),
            &["USD", "EUR", "BTC"],
        )
        .await;

        let (first, second) = tokio::join!(engine.fetch_rates(), engine.fetch_rates());

        assert!(matches!(first, FetchOutcome::Fetched { .. }));
        assert_eq!(second, FetchOutcome::AlreadyInFlight);
        assert_eq!(provider.calls(), 1);
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn test_store_failures_do_not_block_rate_updates() {
        let timeout = FetchError::Timeout {
            source_name: "test".to_string(),
        };
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(rates(&[("EUR", 0.85)])),
            Err(timeout.clone()),
        ]));
        let clock = Arc::new(ManualClock::new());
        let engine = ConversionEngine::with_clock(
            provider,
            Arc::new(FailingStore),
            config(&["USD", "EUR"]),
            clock.clone(),
        )
        .await;

        let first = engine.fetch_rates().await;
        assert_eq!(first, FetchOutcome::Fetched { missing: vec![] });
        assert_eq!(engine.rates(), rates(&[("EUR", 0.85)]));
        assert_eq!(engine.last_fetched_at(), Some(clock.now()));
        assert!(!engine.is_loading());

        // Nothing could be cached, so a failure surfaces but keeps the table
        clock.advance(TimeDelta::minutes(10));
        let second = engine.fetch_rates().await;
        assert_eq!(second, FetchOutcome::Failed(timeout));
        assert_eq!(engine.rates(), rates(&[("EUR", 0.85)]));
        assert_eq!(
            engine.last_fetched_at(),
            Some(clock.now() - TimeDelta::minutes(10))
        );
        assert!(engine.error_message().is_some());
        assert!(!engine.is_loading());
    }

    #[test]
    fn test_engine_config_tolerates_invalid_staleness() {
        let app_config: AppConfig =
            serde_yaml::from_str("staleness_minutes: 9223372036854775807").unwrap();
        let config = EngineConfig::from(&app_config);
        assert_eq!(config.staleness_window, TimeDelta::hours(6));

        let app_config: AppConfig = serde_yaml::from_str("staleness_minutes: 15").unwrap();
        assert_eq!(
            EngineConfig::from(&app_config).staleness_window,
            TimeDelta::minutes(15)
        );
    }

    #[tokio::test]
    async fn test_dropped_fetch_clears_loading() {
        let provider = Arc::new(
            ScriptedProvider::new(vec![Ok(scenario_rates())]).with_delay(Duration::from_secs(5)),
        );
        let (engine, _) = engine_with(provider, Arc::new(MemoryStore::new()), &["USD"]).await;

        let result = tokio::time::timeout(Duration::from_millis(20), engine.fetch_rates()).await;

        assert!(result.is_err());
        assert!(!engine.is_loading());
    }

    #[tokio::test]
    async fn test_spawn_refresh_runs_in_background() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(scenario_rates())]));
        let (engine, _) = engine_with(
            provider.clone(),
            Arc::new(MemoryStore::new()),
            &["USD", "EUR", "BTC"],
        )
        .await;
        let engine = Arc::new(engine);

        let outcome = engine.spawn_refresh().await.unwrap();

        assert!(matches!(outcome, Some(FetchOutcome::Fetched { .. })));
        assert_eq!(engine.rates(), scenario_rates());
    }

    #[tokio::test]
    async fn test_move_and_remove_persist_and_notify() {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let (engine, _) = engine_with(provider.clone(), store.clone(), &["USD", "EUR", "BTC"]).await;
        let mut events = engine.subscribe();

        assert!(engine.move_currency(2, 0).await);
        assert!(engine.remove_currency("eur").await);
        assert!(!engine.move_currency(5, 0).await);

        assert_eq!(events.try_recv().unwrap(), EngineEvent::SelectionChanged);
        assert_eq!(events.try_recv().unwrap(), EngineEvent::SelectionChanged);
        assert!(events.try_recv().is_err());

        let (reopened, _) = engine_with(provider, store, &["USD", "EUR", "BTC"]).await;
        let codes: Vec<String> = reopened
            .selected_currencies()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(codes, vec!["BTC", "USD"]);
    }
}
