use anyhow::Result;
use clap::{ArgGroup, CommandFactory, Parser, Subcommand};
use xcur::core::CurrencyClass;
use xcur::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for xcur::AppCommand {
    fn from(cmd: Commands) -> xcur::AppCommand {
        match cmd {
            Commands::Show {
                amount,
                code,
                refresh,
            } => xcur::AppCommand::Show {
                amount,
                code,
                refresh,
            },
            Commands::Add { code } => xcur::AppCommand::Add { code },
            Commands::Remove { code } => xcur::AppCommand::Remove { code },
            Commands::Move { from, to } => xcur::AppCommand::Move { from, to },
            Commands::List {
                fiat,
                crypto,
                query,
            } => {
                let class = match (fiat, crypto) {
                    (true, _) => Some(CurrencyClass::Fiat),
                    (_, true) => Some(CurrencyClass::Crypto),
                    _ => None,
                };
                xcur::AppCommand::List {
                    query: query.unwrap_or_default(),
                    class,
                }
            }
            Commands::Refresh => xcur::AppCommand::Refresh,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Convert an amount into every selected currency
    Show {
        /// Amount to convert
        amount: Option<f64>,
        /// Currency of the amount, defaults to the base currency
        code: Option<String>,
        /// Fetch rates even if the cached ones are fresh
        #[arg(short, long)]
        refresh: bool,
    },
    /// Add a currency to the selection
    Add { code: String },
    /// Remove a currency from the selection
    Remove { code: String },
    /// Move a currency to another position (1-based)
    Move { from: usize, to: usize },
    /// Search known currencies
    #[command(group(ArgGroup::new("class").args(["fiat", "crypto"])))]
    List {
        /// Only fiat currencies
        #[arg(long)]
        fiat: bool,
        /// Only cryptocurrencies
        #[arg(long)]
        crypto: bool,
        /// Text to match against code or name
        query: Option<String>,
    },
    /// Fetch the latest rates
    Refresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => xcur::cli::setup::setup(),
        Some(cmd) => xcur::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
