//! Agentstats — stats ingestion and leaderboard CLI.
//!
//! Usage:
//!   agentstats submit --account <id> [file]   Ingest a pasted stats export
//!   agentstats top <stat>                     Show a leaderboard
//!   agentstats rank-of <agent> <stat>         Show an agent's rank
//!   agentstats progress <agent>               Show a progress report
//!   agentstats improvers <stat>               Progress leaderboard
//!   agentstats history <agent>                Submission history
//!   agentstats status                         Store counters
//!   agentstats daemon                         Run the maintenance daemon

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use agentstats::catalog;
use agentstats::config;
use agentstats::maintenance::MaintenanceDaemon;
use agentstats::rank::RankCache;
use agentstats::service::StatsService;
use agentstats::state::Database;
use agentstats::types::{AccountMeta, Faction, Period};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agentstats")]
#[command(version = "0.1.0")]
#[command(about = "Stats ingestion and leaderboard aggregation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the agentstats home directory.
    #[arg(long, default_value = "~/.agentstats")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest a pasted stats export from a file (or stdin).
    Submit {
        /// File containing the raw export; stdin when omitted.
        file: Option<PathBuf>,

        /// External account identifier of the submitter.
        #[arg(long)]
        account: String,

        /// Display name for a newly created account.
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the leaderboard for a stat.
    Top {
        /// Stat reference: index, name, or short alias (e.g. "ap").
        stat: String,

        #[arg(long, value_enum, default_value = "all")]
        period: Period,

        /// Restrict to one faction (Enlightened or Resistance).
        #[arg(long)]
        faction: Option<Faction>,

        #[arg(long)]
        limit: Option<usize>,

        /// Emit the raw ranking as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show an agent's rank for a stat.
    RankOf {
        agent: String,
        stat: String,

        #[arg(long, value_enum, default_value = "all")]
        period: Period,
    },

    /// Show an agent's progress over a lookback window.
    Progress {
        agent: String,

        /// Lookback window in days.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Rank agents by improvement in a stat (or a comma-separated set).
    Improvers {
        /// Single stat reference; ignored when --stats is given.
        stat: Option<String>,

        /// Comma-separated stat set for the combined leaderboard.
        #[arg(long)]
        stats: Option<String>,

        #[arg(long)]
        days: Option<u32>,

        #[arg(long)]
        faction: Option<Faction>,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show an agent's submission history.
    History {
        agent: String,

        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Show store counters and cache state.
    Status,

    /// Run the maintenance daemon (cache eviction + health logging).
    Daemon,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Submit { file, account, name } => cmd_submit(&home_dir, file, account, name).await,
        Commands::Top { stat, period, faction, limit, json } => {
            cmd_top(&home_dir, &stat, period, faction, limit, json).await
        }
        Commands::RankOf { agent, stat, period } => cmd_rank_of(&home_dir, &agent, &stat, period).await,
        Commands::Progress { agent, days } => cmd_progress(&home_dir, &agent, days).await,
        Commands::Improvers { stat, stats, days, faction, limit } => {
            cmd_improvers(&home_dir, stat, stats, days, faction, limit).await
        }
        Commands::History { agent, limit } => cmd_history(&home_dir, &agent, limit).await,
        Commands::Status => cmd_status(&home_dir).await,
        Commands::Daemon => cmd_daemon(&home_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_submit(
    home_dir: &Path,
    file: Option<PathBuf>,
    account: String,
    name: Option<String>,
) -> Result<()> {
    let (_config, service) = bootstrap(home_dir)?;

    let raw_text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stats text from stdin")?;
            buf
        }
    };

    let meta = AccountMeta { display_name: name };
    let result = service.submit_stats_text(&account, &raw_text, &meta).await?;

    if result.accepted {
        println!(
            "{} Stored {} fields for {} ({})",
            ">>>".green().bold(),
            result.field_count,
            result.agent_name.bold(),
            result.faction,
        );
        if result.new_agent {
            println!("    New agent registered.");
        }
        if result.faction_changed {
            println!("    {} Faction change recorded.", "!".yellow().bold());
        }
    } else {
        println!(
            "{} Duplicate submission for {} — already recorded.",
            "===".yellow().bold(),
            result.agent_name.bold(),
        );
    }

    for warning in &result.warnings {
        println!("    {} {}", "warn:".yellow(), warning.message);
    }

    Ok(())
}

async fn cmd_top(
    home_dir: &Path,
    stat: &str,
    period: Period,
    faction: Option<Faction>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let (config, service) = bootstrap(home_dir)?;
    let stat_idx = resolve_stat(stat)?;
    let limit = limit.unwrap_or(config.default_limit);

    let list = service.rank(stat_idx, period, faction, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!();
    println!(
        "{} — {} ({})",
        list.stat_name.bold(),
        period,
        faction.map(|f| f.to_string()).unwrap_or_else(|| "all factions".into()),
    );
    println!();
    if list.entries.is_empty() {
        println!("  No eligible submissions.");
        return Ok(());
    }
    for entry in &list.entries {
        let badge = entry
            .badge_tier
            .as_deref()
            .map(|t| format!("  [{t}]"))
            .unwrap_or_default();
        println!(
            "  {:>3}. {:<24} {:>16} {}{}",
            entry.rank,
            entry.agent_name,
            entry.value,
            colorize_faction(entry.faction),
            badge,
        );
    }
    println!();

    Ok(())
}

async fn cmd_rank_of(home_dir: &Path, agent: &str, stat: &str, period: Period) -> Result<()> {
    let (_config, service) = bootstrap(home_dir)?;
    let stat_idx = resolve_stat(stat)?;

    let rank = service.rank_of(agent, stat_idx, period).await?;
    println!(
        "{} is ranked {} of {} ({} = {})",
        agent.bold(),
        format!("#{}", rank.rank).bold(),
        rank.population,
        stat,
        rank.value,
    );

    Ok(())
}

async fn cmd_progress(home_dir: &Path, agent: &str, days: Option<u32>) -> Result<()> {
    let (config, service) = bootstrap(home_dir)?;
    let days = days.unwrap_or(config.default_lookback_days);

    let report = service.progress(agent, days).await?;

    println!();
    println!(
        "Progress for {} ({}) — last {} days, {} snapshots",
        report.agent_name.bold(),
        colorize_faction(report.faction),
        report.lookback_days,
        report.snapshot_count,
    );
    println!();
    if report.stats.is_empty() {
        println!("  Not enough snapshots in the window; submit stats more often.");
        return Ok(());
    }
    for stat in &report.stats {
        println!(
            "  {:<32} +{:<14} ({:.1}/day over {} snapshots)",
            stat.stat_name, stat.delta, stat.rate_per_day, stat.snapshot_count,
        );
    }
    println!();

    Ok(())
}

async fn cmd_improvers(
    home_dir: &Path,
    stat: Option<String>,
    stats: Option<String>,
    days: Option<u32>,
    faction: Option<Faction>,
    limit: Option<usize>,
) -> Result<()> {
    let (config, service) = bootstrap(home_dir)?;
    let days = days.unwrap_or(config.default_lookback_days);
    let limit = limit.unwrap_or(config.default_limit);

    if let Some(stats) = stats {
        let idxs: Vec<u16> = stats
            .split(',')
            .map(|s| resolve_stat(s.trim()))
            .collect::<Result<_>>()?;
        let entries = service.multi_stat_progress(&idxs, days, limit).await?;

        println!();
        println!("Combined improvement over {} stats — last {days} days", idxs.len());
        println!();
        for entry in &entries {
            println!(
                "  {:>3}. {:<24} score {:>6.2}  ({} of {} stats improving)",
                entry.rank,
                entry.agent_name,
                entry.score,
                entry.improving_stats,
                entry.total_stats,
            );
        }
        return Ok(());
    }

    let Some(stat) = stat else {
        bail!("provide a stat reference or --stats");
    };
    let stat_idx = resolve_stat(&stat)?;
    let entries = service.progress_leaderboard(stat_idx, days, faction, limit).await?;

    println!();
    println!("Most improved — {stat} over the last {days} days");
    println!();
    if entries.is_empty() {
        println!("  No agent improved in the window.");
        return Ok(());
    }
    for entry in &entries {
        println!(
            "  {:>3}. {:<24} +{:<14} ({:.1}/day) {}",
            entry.rank,
            entry.agent_name,
            entry.delta,
            entry.rate_per_day,
            colorize_faction(entry.faction),
        );
    }
    println!();

    Ok(())
}

async fn cmd_history(home_dir: &Path, agent: &str, limit: usize) -> Result<()> {
    let (_config, service) = bootstrap(home_dir)?;
    let history = service.agent_history(agent, limit).await?;

    println!();
    println!("Submissions for {}", agent.bold());
    println!();
    for entry in &history {
        println!(
            "  {} {}  level {:<2}  AP {:<14}  {} fields",
            entry.submission_date,
            entry.submission_time,
            entry.level.map(|l| l.to_string()).unwrap_or_else(|| "-".into()),
            entry.lifetime_ap.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
            entry.field_count,
        );
    }
    println!();

    Ok(())
}

async fn cmd_status(home_dir: &Path) -> Result<()> {
    let (_config, service) = bootstrap(home_dir)?;
    let stats = service.store_stats().await?;

    println!();
    println!("{}", "=== Agentstats Status ===".bold());
    println!();
    println!("  {}:", "Store".bold());
    println!("    Accounts:     {}", stats.accounts);
    println!("    Agents:       {}", stats.agents);
    println!("    Submissions:  {}", stats.submissions);
    println!("    Field values: {}", stats.field_values);
    println!("    Snapshots:    {}", stats.snapshots);
    println!();
    println!("  {}:", "Factions".bold());
    println!("    {}:  {}", "Enlightened".green(), stats.enlightened);
    println!("    {}:   {}", "Resistance".blue(), stats.resistance);
    println!();
    println!("  {}:", "Cache".bold());
    println!("    Entries:      {}", service.cache().len());
    println!();

    Ok(())
}

async fn cmd_daemon(home_dir: &Path) -> Result<()> {
    let (config, service) = bootstrap(home_dir)?;

    println!("{} Starting maintenance daemon ...", ">>>".green().bold());

    let cancel = CancellationToken::new();
    let daemon = MaintenanceDaemon::new(&config, service);
    let daemon_cancel = cancel.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = daemon.run(daemon_cancel).await {
            error!("Maintenance daemon error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    println!("\n{} Shutting down gracefully...", "<<<".red().bold());
    cancel.cancel();

    let shutdown_timeout = tokio::time::Duration::from_secs(10);
    let _ = tokio::time::timeout(shutdown_timeout, handle).await;

    info!("Daemon shutdown complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap the runtime: load config, open the database, build the service.
fn bootstrap(home_dir: &Path) -> Result<(config::StatsConfig, StatsService)> {
    if !home_dir.exists() {
        std::fs::create_dir_all(home_dir).with_context(|| {
            format!("Failed to create home directory: {}", home_dir.display())
        })?;
    }

    let config_path = home_dir.join("agentstats.toml");
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = cfg.resolved_db_path();
    let db = Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    let service = StatsService::new(db, RankCache::new(cfg.cache_ttl_secs));
    Ok((cfg, service))
}

fn resolve_stat(reference: &str) -> Result<u16> {
    catalog::resolve_stat_ref(reference).with_context(|| {
        format!("unknown stat '{reference}' (try an index, a full name, or an alias like 'ap')")
    })
}

fn colorize_faction(faction: Faction) -> String {
    match faction {
        Faction::Enlightened => "Enlightened".green().to_string(),
        Faction::Resistance => "Resistance".blue().to_string(),
    }
}
