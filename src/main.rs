use async_trait::async_trait;
use chrono::Utc;
use clap::Parser;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use tradeguard::cli::{self, Cli, Commands, ConfigCommands, JournalCommands};
use tradeguard::config::AppConfig;
use tradeguard::coordination::LifecycleManager;
use tradeguard::domain::TradeIntent;
use tradeguard::error::{GuardError, Result};
use tradeguard::exchange::PaperExchange;
use tradeguard::execution::OrderGateway;
use tradeguard::persistence::TradeJournal;
use tradeguard::signals::{JsonlSignalSource, TradeSignalSource};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, shutdown_signal};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, signals } => {
            let config = load_config(&config)?;
            init_logging(&config.logging);
            run_session(config, &signals).await?;
        }
        Commands::Journal { command } => {
            init_logging_simple();
            match command {
                JournalCommands::Summary { path } => {
                    let journal = TradeJournal::open(path).await?;
                    cli::print_journal_summary(&journal.summary().await?);
                }
                JournalCommands::Today { path, limit } => {
                    let journal = TradeJournal::open(path).await?;
                    let today = Utc::now().date_naive();
                    let pnl = journal.daily_pnl(today).await?;
                    let loss = journal.daily_loss(today).await?;
                    cli::print_daily(today, pnl, loss, limit);
                }
            }
        }
        Commands::Config {
            command: ConfigCommands::Check { config },
        } => {
            init_logging_simple();
            let loaded = load_config(&config)?;
            println!("  \x1b[32m✓ Configuration valid\x1b[0m");
            println!("  risk:      {:?}", loaded.risk);
            println!("  execution: {:?}", loaded.execution);
            println!("  journal:   {}", loaded.journal.path.display());
        }
    }

    Ok(())
}

fn load_config(dir: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from(dir)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("  \x1b[31m✗ {}\x1b[0m", e);
        }
        return Err(GuardError::InvalidConfig(errors.join("; ")));
    }
    Ok(config)
}

async fn run_session(config: AppConfig, signals: &Path) -> Result<()> {
    info!(
        "Starting paper session (balance {}, journal {})",
        config.paper.starting_balance,
        config.journal.path.display()
    );

    let exchange = Arc::new(
        PaperExchange::new(config.paper.starting_balance).with_volatility(config.paper.volatility_bps),
    );
    let gateway = Arc::new(OrderGateway::new(exchange.clone(), &config.execution));
    let journal = Arc::new(TradeJournal::open(&config.journal.path).await?);
    let manager = LifecycleManager::new(gateway, journal, config.risk.clone(), &config.execution);

    let mut source = PriceSeeding {
        inner: JsonlSignalSource::open(signals).await?,
        exchange,
        seeded: HashSet::new(),
    };

    manager.start();

    // A shutdown signal stops acceptance; an intent mid-accept still completes
    let stats = manager
        .run_signals_until(&mut source, shutdown_signal())
        .await;
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        "Signal intake finished, waiting for open positions"
    );

    manager.stop();
    cli::print_status(&manager.status_summary().await);

    // Open positions are supervised until they close; there is no forced exit
    manager.shutdown().await;

    cli::print_status(&manager.status_summary().await);
    Ok(())
}

/// Sets the paper price of each symbol from the first intent that names it
struct PriceSeeding<S> {
    inner: S,
    exchange: Arc<PaperExchange>,
    seeded: HashSet<String>,
}

#[async_trait]
impl<S: TradeSignalSource> TradeSignalSource for PriceSeeding<S> {
    async fn next_intent(&mut self) -> Option<TradeIntent> {
        let intent = self.inner.next_intent().await?;
        if self.seeded.insert(intent.symbol.clone()) {
            self.exchange.set_price(&intent.symbol, intent.entry_price);
        }
        Some(intent)
    }
}
