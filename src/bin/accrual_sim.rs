//! Accrual Ledger simulator
//!
//! Runs deterministic scenarios against an in-memory ledger and prints
//! what happened to supply, yield and claims.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use console::{style, Term};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use accrual_ledger::core::config::LedgerConfig;
use accrual_ledger::core::token::TokenAmount;
use accrual_ledger::error::Error;
use accrual_ledger::external::{AssetSource, InMemoryAsset, StaticPool};
use accrual_ledger::protocol::{LedgerEngine, LedgerEvent, LedgerOperation};
use accrual_ledger::utils::constants::{BASE_UNIT, SECONDS_PER_DAY};
use accrual_ledger::utils::crypto::Address;

type SimEngine = LedgerEngine<InMemoryAsset, StaticPool>;

/// Accrual Ledger simulator - taxed, yield-bearing token ledger
#[derive(Parser)]
#[command(name = "accrual-sim")]
#[command(author = "Accrual Ledger Team")]
#[command(version = accrual_ledger::VERSION)]
#[command(about = "Simulate wraps, transfers, accrual and claims on an in-memory ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Ledger configuration (JSON); defaults to the standard configuration
    #[arg(short, long, env = "ACCRUAL_CONFIG")]
    config: Option<PathBuf>,

    /// Simulation start (RFC 3339); defaults to now
    #[arg(short, long)]
    start: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in daily scenario
    Run {
        /// Number of simulated days
        #[arg(short, long, default_value = "30")]
        days: u64,

        /// Number of holders
        #[arg(long, default_value = "4")]
        holders: u8,

        /// Whole tokens each holder wraps on day zero
        #[arg(long, default_value = "1000")]
        deposit: u64,

        /// Claim and withdraw every N days
        #[arg(long, default_value = "7")]
        settle_every: u64,

        /// Seed for the daily transfer pattern
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Replay a JSON list of operations, one block each
    Replay {
        /// Operations file
        script: PathBuf,

        /// Seconds between blocks
        #[arg(long, default_value = "3600")]
        step: u64,

        /// Whole tokens of external asset given to every caller
        #[arg(long, default_value = "1000000")]
        fund: u64,
    },

    /// Print the standard configuration as JSON
    Config,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════════════════════

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run {
            days,
            holders,
            deposit,
            settle_every,
            seed,
        } => cmd_run(cli, *days, *holders, *deposit, *settle_every, *seed, term),
        Commands::Replay { script, step, fund } => cmd_replay(cli, script, *step, *fund, term),
        Commands::Config => {
            term.write_line(&LedgerConfig::standard().to_json()?)?;
            Ok(())
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMAND HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_run(
    cli: &Cli,
    days: u64,
    holder_count: u8,
    deposit: u64,
    settle_every: u64,
    seed: u64,
    term: &Term,
) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let start = start_time(cli)?;
    let admin = Address::from_label("admin");
    let holders: Vec<Address> = (0..holder_count.max(1))
        .map(|i| Address::from_label(&format!("holder-{}", i)))
        .collect();

    let deposit_units = deposit
        .checked_mul(BASE_UNIT)
        .ok_or_else(|| anyhow::anyhow!("deposit too large"))?;
    let mut asset = InMemoryAsset::new();
    for holder in &holders {
        asset.fund(*holder, deposit_units.saturating_mul(2));
    }

    let mut engine =
        LedgerEngine::new(config, admin, asset, StaticPool::empty())?.start_at(start);

    term.write_line(&format!(
        "{} Simulating {} days for {} holders from {}",
        style("→").cyan(),
        days,
        holders.len(),
        format_time(start)
    ))?;

    for holder in &holders {
        engine.set_guarantee(admin, *holder, deposit_units / 10)?;
        engine.wrap(*holder, deposit_units, None)?;
    }

    let mut rng = StdRng::seed_from_u64(seed);

    for day in 1..=days {
        let now = start + day * SECONDS_PER_DAY;
        engine.begin_block(day, now)?;
        engine.distribute(admin)?;

        // Move between 1% and 5% of a random holder's balance
        let from = holders[rng.gen_range(0..holders.len())];
        let to = holders[rng.gen_range(0..holders.len())];
        let amount = engine.balance_of(&from).units() / 100 * rng.gen_range(1..=5);
        if amount > 0 && from != to {
            tolerate(engine.transfer(from, to, amount).map(|_| ()))?;
        }

        if settle_every > 0 && day % settle_every == 0 {
            for holder in &holders {
                tolerate(engine.claim(*holder).map(|_| ()))?;
                tolerate(engine.withdraw(*holder).map(|_| ()))?;
            }
            term.write_line(&format!(
                "  {} day {:>3} ({}): supply {}",
                style("•").dim(),
                day,
                format_time(now),
                engine.total_supply().to_string_formatted()
            ))?;
        }
    }

    engine.verify_invariants()?;
    print_summary(&engine, &holders, term)?;
    Ok(())
}

fn cmd_replay(cli: &Cli, script: &PathBuf, step: u64, fund: u64, term: &Term) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let start = start_time(cli)?;
    let contents = std::fs::read_to_string(script)?;
    let operations: Vec<LedgerOperation> = serde_json::from_str(&contents)?;

    let admin = Address::from_label("admin");
    let mut asset = InMemoryAsset::new();
    let mut callers: Vec<Address> = operations.iter().map(|op| *op.caller()).collect();
    callers.sort();
    callers.dedup();
    for caller in &callers {
        asset.fund(*caller, fund.saturating_mul(BASE_UNIT));
    }

    let mut engine =
        LedgerEngine::new(config, admin, asset, StaticPool::empty())?.start_at(start);

    term.write_line(&format!(
        "{} Replaying {} operations from {}",
        style("→").cyan(),
        operations.len(),
        script.display()
    ))?;

    let mut failures = 0;
    for (i, op) in operations.into_iter().enumerate() {
        let height = i as u64 + 1;
        engine.begin_block(height, start + height * step)?;
        let name = op.operation_type();
        match engine.execute(op) {
            Ok(result) => term.write_line(&format!(
                "  {} #{:<4} {:<16} {:?}",
                style("✓").green(),
                height,
                name,
                result
            ))?,
            Err(e) => {
                failures += 1;
                term.write_line(&format!(
                    "  {} #{:<4} {:<16} {} (code {})",
                    style("✗").red(),
                    height,
                    name,
                    e,
                    e.code()
                ))?;
            }
        }
    }

    engine.verify_invariants()?;
    term.write_line(&format!(
        "{} {} failed, state hash {}",
        style("ℹ").blue(),
        failures,
        engine.state_hash()
    ))?;
    print_summary(&engine, &callers, term)?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn load_config(cli: &Cli) -> anyhow::Result<LedgerConfig> {
    match &cli.config {
        Some(path) => Ok(LedgerConfig::from_json_file(path)?),
        None => Ok(LedgerConfig::standard()),
    }
}

fn start_time(cli: &Cli) -> anyhow::Result<u64> {
    let start = match &cli.start {
        Some(s) => DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc),
        None => Utc::now(),
    };
    u64::try_from(start.timestamp()).map_err(|_| anyhow::anyhow!("start before 1970"))
}

fn format_time(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Expected rejections in the scenario (nothing to claim yet, no yield,
/// feature off) are skipped; anything else aborts
fn tolerate(result: accrual_ledger::error::Result<()>) -> anyhow::Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(Error::InsufficientEntitlement(_) | Error::ZeroAmount | Error::FeatureDisabled(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn print_summary(engine: &SimEngine, holders: &[Address], term: &Term) -> anyhow::Result<()> {
    let session = engine.claims().session();

    term.write_line(&format!("\n{} Ledger", style("→").cyan()))?;
    term.write_line(&format!(
        "  Token supply:        {}",
        style(engine.total_supply().to_string_formatted()).green()
    ))?;
    term.write_line(&format!(
        "  Share supply:        {}",
        TokenAmount::from_units(engine.share_supply()).to_string_formatted()
    ))?;
    term.write_line(&format!(
        "  Yield supply:        {}",
        TokenAmount::from_units(engine.yield_pool().yield_supply()).to_string_formatted()
    ))?;
    term.write_line(&format!(
        "  Yield per share:     {}",
        engine.yield_pool().yield_per_share()
    ))?;
    term.write_line(&format!(
        "  Operational reserve: {} (session {})",
        TokenAmount::from_units(engine.claims().operational_reserve(session)).to_string_formatted(),
        session
    ))?;
    term.write_line(&format!(
        "  Debt:                {} / {}",
        TokenAmount::from_units(engine.treasury().debt_supply()).to_string_formatted(),
        TokenAmount::from_units(engine.treasury().debt_reserve()).to_string_formatted()
    ))?;
    term.write_line(&format!(
        "  Custody:             {}",
        TokenAmount::from_units(engine.asset().custody_balance()).to_string_formatted()
    ))?;

    term.write_line(&format!("\n{} Holders", style("→").cyan()))?;
    for holder in holders {
        let statement = engine.statement(holder);
        term.write_line(&format!(
            "  {}  balance {}  pending {}  withdrawn {}  claimed {}",
            style(holder.short()).yellow(),
            engine.balance_of(holder).to_string_formatted(),
            TokenAmount::from_units(engine.yield_of(holder)?).to_string_formatted(),
            statement.withdrawn.to_string_formatted(),
            statement.claimed.to_string_formatted()
        ))?;
    }

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for event in engine.events().events() {
        *counts.entry(event.event_type()).or_default() += 1;
    }
    let transacts = engine.events().filter_by_type("Transact").len();
    term.write_line(&format!(
        "\n{} Events ({} accrual ticks)",
        style("→").cyan(),
        transacts
    ))?;
    for (kind, count) in counts {
        term.write_line(&format!("  {:<16} {}", kind, count))?;
    }

    if let Some(LedgerEvent::Transact(last)) = engine
        .events()
        .events()
        .iter()
        .rev()
        .find(|e| e.event_type() == "Transact")
    {
        term.write_line(&format!(
            "  last tick at {} accrued {}",
            format_time(last.timestamp),
            last.accrued.to_string_formatted()
        ))?;
    }
    Ok(())
}
