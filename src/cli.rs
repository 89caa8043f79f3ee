use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::coordination::LifecycleStatus;
use crate::persistence::JournalSummary;

#[derive(Parser)]
#[command(name = "tradeguard")]
#[command(version)]
#[command(about = "Risk-gated order lifecycle engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a paper-trading session fed by a signal file
    Run {
        /// Configuration directory
        #[arg(short, long, default_value = "config")]
        config: PathBuf,
        /// JSONL file of trade intents
        #[arg(short, long)]
        signals: PathBuf,
    },
    /// Trade journal analytics
    Journal {
        #[command(subcommand)]
        command: JournalCommands,
    },
    /// Configuration utilities
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum JournalCommands {
    /// Win/loss statistics over every finished position
    Summary {
        #[arg(short, long, default_value = "data/trade_journal.jsonl")]
        path: PathBuf,
    },
    /// Today's realized pnl and losses
    Today {
        #[arg(short, long, default_value = "data/trade_journal.jsonl")]
        path: PathBuf,
        /// Daily loss limit to compare against
        #[arg(long)]
        limit: Option<Decimal>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Load and validate a configuration directory
    Check {
        #[arg(short, long, default_value = "config")]
        config: PathBuf,
    },
}

pub fn print_journal_summary(summary: &JournalSummary) {
    println!("\x1b[36m╔══════════════════════════════════════╗\x1b[0m");
    println!("\x1b[36m║          TRADE JOURNAL SUMMARY       ║\x1b[0m");
    println!("\x1b[36m╚══════════════════════════════════════╝\x1b[0m");
    println!("  Trades:        {}", summary.trades);
    println!("  Wins/Losses:   {}/{}", summary.wins, summary.losses);
    match summary.win_rate() {
        Some(rate) => println!("  Win rate:      {}%", (rate * Decimal::ONE_HUNDRED).round_dp(1)),
        None => println!("  Win rate:      n/a"),
    }
    println!("  Rejected:      {}", summary.rejected);
    println!("  Total PnL:     {}", colored_pnl(summary.total_pnl));
    println!("  Best trade:    {}", colored_pnl(summary.best_trade));
    println!("  Worst trade:   {}", colored_pnl(summary.worst_trade));
    println!("  Max drawdown:  {}", summary.max_drawdown);
}

pub fn print_daily(date: NaiveDate, pnl: Decimal, loss: Decimal, limit: Option<Decimal>) {
    println!("  Date:          {}", date);
    println!("  Net PnL:       {}", colored_pnl(pnl));
    println!("  Losses:        {}", colored_pnl(loss));

    if let Some(limit) = limit {
        if loss.abs() >= limit {
            println!("  \x1b[31m✗ Daily loss limit {} reached, new entries blocked\x1b[0m", limit);
        } else {
            println!("  \x1b[32m✓ {} remaining before daily loss limit\x1b[0m", limit - loss.abs());
        }
    }
}

pub fn print_status(status: &LifecycleStatus) {
    println!(
        "  Accepting: {}  Live: {}  Finished: {}",
        status.accepting, status.live_positions, status.archived_positions
    );
    println!(
        "  Opened: {}  Closed: {}  Rejected: {}  Degraded: {}",
        status.monitor.positions_opened,
        status.monitor.positions_closed,
        status.monitor.positions_rejected,
        status.monitor.degraded_positions
    );
    match status.daily_pnl {
        Some(pnl) => println!("  Today's PnL: {}", colored_pnl(pnl)),
        None => println!("  Today's PnL: \x1b[33munknown (journal unreadable)\x1b[0m"),
    }
}

fn colored_pnl(pnl: Decimal) -> String {
    if pnl > Decimal::ZERO {
        format!("\x1b[32m+{}\x1b[0m", pnl)
    } else if pnl < Decimal::ZERO {
        format!("\x1b[31m{}\x1b[0m", pnl)
    } else {
        pnl.to_string()
    }
}
