pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod providers;
pub mod store;

use crate::config::AppConfig;
use crate::core::currency::CurrencyClass;
use crate::engine::{ConversionEngine, EngineConfig};
use crate::providers::{CoinGeckoSource, ExchangeRateSource, RateAggregator};
use crate::store::DiskStore;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Show {
        amount: Option<f64>,
        code: Option<String>,
        refresh: bool,
    },
    Add {
        code: String,
    },
    Remove {
        code: String,
    },
    Move {
        from: usize,
        to: usize,
    },
    List {
        query: String,
        class: Option<CurrencyClass>,
    },
    Refresh,
}

/// Wires the configured rate sources and on-disk store into an engine.
pub async fn build_engine(config: &AppConfig) -> Result<ConversionEngine> {
    let data_path = config.default_data_path()?;
    let store = DiskStore::open(&data_path)
        .with_context(|| format!("Failed to open data store at {}", data_path.display()))?;

    let fiat_config = &config.providers.exchange_rate;
    let fiat = ExchangeRateSource::new(
        &fiat_config.base_url,
        &config.base_currency,
        Duration::from_secs(fiat_config.timeout_secs),
    )
    .context("Failed to create fiat rate source")?;

    let crypto_config = &config.providers.coingecko;
    let crypto = CoinGeckoSource::new(
        &crypto_config.base_url,
        &config.base_currency,
        Duration::from_secs(crypto_config.timeout_secs),
    )
    .context("Failed to create crypto rate source")?;

    let provider = RateAggregator::new(
        Arc::new(fiat),
        Arc::new(crypto),
        &config.base_currency,
        config.include_base_rate,
    );

    Ok(ConversionEngine::new(
        Arc::new(provider),
        Arc::new(store),
        EngineConfig::from(config),
    )
    .await)
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("xcur starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let engine = build_engine(&config).await?;

    match command {
        AppCommand::Show {
            amount,
            code,
            refresh,
        } => cli::convert::show(&engine, amount, code.as_deref(), refresh).await,
        AppCommand::Add { code } => cli::selection::add(&engine, &code).await,
        AppCommand::Remove { code } => cli::selection::remove(&engine, &code).await,
        AppCommand::Move { from, to } => cli::selection::move_to(&engine, from, to).await,
        AppCommand::List { query, class } => {
            cli::list::run(&query, class, &engine.selected_currencies());
            Ok(())
        }
        AppCommand::Refresh => cli::convert::refresh(&engine).await,
    }
}
