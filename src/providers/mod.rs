pub mod aggregate;
pub mod coingecko;
pub mod exchange_rate;
pub mod util;

pub use aggregate::RateAggregator;
pub use coingecko::CoinGeckoSource;
pub use exchange_rate::ExchangeRateSource;
