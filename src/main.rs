//! Agenthub — state store and management CLI.
//!
//! Usage:
//!   agenthub init                 Create config and database
//!   agenthub status               Show platform overview
//!   agenthub user add ...         Manage accounts
//!   agenthub agent list ...       Manage agents
//!   agenthub logs tail            Inspect agent activity

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use agenthub::config::{self, HubConfig};
use agenthub::store::agents::{AgentFilter, NewAgent};
use agenthub::store::catalog::StoreItemFilter;
use agenthub::store::mcps::{McpFilter, NewMcp};
use agenthub::store::subscriptions::NewSubscription;
use agenthub::store::triggers::NewTrigger;
use agenthub::store::users::NewUser;
use agenthub::store::{Database, Page};
use agenthub::types::{AgentStatus, ItemType, PlanType, TriggerType};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "agenthub")]
#[command(version = "0.1.0")]
#[command(about = "State store and management CLI for the agenthub platform")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to agenthub home directory.
    #[arg(long, default_value = "~/.agenthub")]
    home: String,

    /// Log level (debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the config file and initialize the database.
    Init,

    /// Show a platform overview.
    Status,

    /// Account management.
    #[command(subcommand)]
    User(UserCommands),

    /// Agent management.
    #[command(subcommand)]
    Agent(AgentCommands),

    /// MCP catalog and bindings.
    #[command(subcommand)]
    Mcp(McpCommands),

    /// Agent triggers.
    #[command(subcommand)]
    Trigger(TriggerCommands),

    /// Marketplace listings.
    #[command(subcommand)]
    Store(StoreCommands),

    /// Agent activity logs.
    #[command(subcommand)]
    Logs(LogCommands),
}

#[derive(Subcommand, Debug)]
enum UserCommands {
    /// Create an account.
    Add {
        username: String,
        email: String,
        /// Starting point balance.
        #[arg(long, default_value_t = 0)]
        points: i64,
        /// Enable daily auto-recharge.
        #[arg(long)]
        auto_recharge: bool,
        /// Subscribe to a plan (FREE, PRO, ELITE) using configured defaults.
        #[arg(long)]
        plan: Option<String>,
    },
    /// List accounts.
    List,
    /// Top an account's points up to its subscription's daily grant.
    Recharge { username: String },
}

#[derive(Subcommand, Debug)]
enum AgentCommands {
    /// Create an agent for a user.
    Add {
        name: String,
        /// Owner username.
        #[arg(long)]
        owner: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// List agents, optionally filtered.
    List {
        /// Filter by status (RUNNING, STOPPED, ERROR).
        #[arg(long)]
        status: Option<String>,
        /// Filter by owner username.
        #[arg(long)]
        owner: Option<String>,
    },
    /// Set an agent's status.
    SetStatus { id: String, status: String },
}

#[derive(Subcommand, Debug)]
enum McpCommands {
    /// Register an MCP service in the catalog.
    Add {
        name: String,
        #[arg(long = "type")]
        mcp_type: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated tags.
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
    },
    /// List catalog entries, optionally by tag.
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Bind an agent to an MCP service.
    Bind {
        agent_id: String,
        mcp_id: String,
        /// Pairing configuration as inline JSON.
        #[arg(long)]
        config: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum TriggerCommands {
    /// Add a trigger to an agent.
    Add {
        agent_id: String,
        /// SCHEDULED, EVENT_SOCIAL, EVENT_PRICE, or EVENT_CHAIN.
        trigger_type: String,
        /// Trigger configuration as inline JSON.
        config: String,
    },
    /// List triggers for an agent.
    List { agent_id: String },
}

#[derive(Subcommand, Debug)]
enum StoreCommands {
    /// List marketplace items.
    List {
        /// Filter by type (AGENT_TEMPLATE, MCP_SERVICE).
        #[arg(long = "type")]
        item_type: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum LogCommands {
    /// Show the newest log lines.
    Tail {
        #[arg(long, default_value_t = 20)]
        lines: u32,
    },
    /// Delete log lines older than the given number of days.
    Prune {
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    match cli.command {
        Commands::Init => cmd_init(&home_dir),
        Commands::Status => cmd_status(&home_dir),
        Commands::User(cmd) => cmd_user(&home_dir, cmd),
        Commands::Agent(cmd) => cmd_agent(&home_dir, cmd),
        Commands::Mcp(cmd) => cmd_mcp(&home_dir, cmd),
        Commands::Trigger(cmd) => cmd_trigger(&home_dir, cmd),
        Commands::Store(cmd) => cmd_store(&home_dir, cmd),
        Commands::Logs(cmd) => cmd_logs(&home_dir, cmd),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_init(home_dir: &Path) -> Result<()> {
    let config_path = home_dir.join("agenthub.toml");
    let cfg = config::load_config(&config_path)?;
    config::save_config(&cfg, &config_path)?;

    let db_path = cfg.resolved_db_path();
    Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to initialize database at {db_path}"))?;

    println!(
        "{} Initialized agenthub at {}",
        ">>>".green().bold(),
        home_dir.display()
    );
    Ok(())
}

fn cmd_status(home_dir: &Path) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    let users = db.count_users()?;
    let points = db.user_points_aggregate()?;
    let agents = db.agent_count_by_status()?;
    let plans = db.subscription_count_by_plan()?;
    let mcps = db.count_mcps()?;
    let triggers = db.trigger_count_by_type()?;
    let items = db.item_count_by_type()?;
    let sessions = db.count_sessions()?;
    let logs = db.count_logs(None)?;

    println!();
    println!("{}", "=== Agenthub Status ===".bold());
    println!();
    println!("  {}:    {} ({} points in circulation)", "Users".bold(), users, points.total);
    for (plan, count) in &plans {
        println!("    {:<14} {}", format!("{plan}:"), count);
    }
    println!("  {}:", "Agents".bold());
    for (status, count) in &agents {
        println!("    {:<14} {}", format!("{status}:"), colorize_count(*status, *count));
    }
    println!("  {}:     {}", "MCPs".bold(), mcps);
    println!("  {}:", "Triggers".bold());
    for (tt, count) in &triggers {
        println!("    {:<14} {}", format!("{tt}:"), count);
    }
    println!("  {}:", "Store".bold());
    for (it, count) in &items {
        println!("    {:<14} {}", format!("{it}:"), count);
    }
    println!("  {}: {}", "Sessions".bold(), sessions);
    println!("  {}:     {}", "Logs".bold(), logs);
    println!();

    Ok(())
}

fn cmd_user(home_dir: &Path, cmd: UserCommands) -> Result<()> {
    let (cfg, db) = bootstrap(home_dir)?;

    match cmd {
        UserCommands::Add {
            username,
            email,
            points,
            auto_recharge,
            plan,
        } => {
            let user = db.create_user(NewUser {
                username,
                email,
                current_points: points,
                auto_recharge,
                ..Default::default()
            })?;

            if let Some(plan) = plan {
                let plan: PlanType = plan.parse()?;
                let settings = cfg.plan_settings(plan);
                db.create_subscription(NewSubscription {
                    plan_type: plan,
                    daily_points: settings.daily_points,
                    swap_fee: settings.swap_fee,
                    user_id: user.id.clone(),
                    ..Default::default()
                })?;
                println!(
                    "{} Created user '{}' on the {} plan",
                    ">>>".green().bold(),
                    user.username,
                    plan
                );
            } else {
                println!("{} Created user '{}'", ">>>".green().bold(), user.username);
            }
            println!("    id: {}", user.id);
        }
        UserCommands::List => {
            for user in db.list_users(Page::default())? {
                let plan = db
                    .subscription_for_user(&user.id)?
                    .map(|s| s.plan_type.to_string())
                    .unwrap_or_else(|| "-".into());
                println!(
                    "{:<26} {:<20} {:<8} {:>8} pts",
                    user.id, user.username, plan, user.current_points
                );
            }
        }
        UserCommands::Recharge { username } => {
            let user = db
                .user_by_username(&username)?
                .with_context(|| format!("No user named '{username}'"))?;
            let balance = db.recharge_points(&user.id)?;
            println!(
                "{} '{}' balance: {} points",
                ">>>".green().bold(),
                username,
                balance
            );
        }
    }
    Ok(())
}

fn cmd_agent(home_dir: &Path, cmd: AgentCommands) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    match cmd {
        AgentCommands::Add {
            name,
            owner,
            description,
            system_prompt,
        } => {
            let user = db
                .user_by_username(&owner)?
                .with_context(|| format!("No user named '{owner}'"))?;
            let agent = db.create_agent(NewAgent {
                name,
                description,
                system_prompt,
                user_id: user.id,
                ..Default::default()
            })?;
            println!("{} Created agent '{}'", ">>>".green().bold(), agent.name);
            println!("    id: {}", agent.id);
        }
        AgentCommands::List { status, owner } => {
            let status = status.map(|s| s.parse::<AgentStatus>()).transpose()?;
            let user_id = match owner {
                Some(owner) => Some(
                    db.user_by_username(&owner)?
                        .with_context(|| format!("No user named '{owner}'"))?
                        .id,
                ),
                None => None,
            };

            let agents = db.list_agents(
                AgentFilter {
                    user_id,
                    status,
                    ..Default::default()
                },
                Page::default(),
            )?;
            for agent in agents {
                println!(
                    "{:<26} {:<24} {}",
                    agent.id,
                    agent.name,
                    colorize_status(agent.status)
                );
            }
        }
        AgentCommands::SetStatus { id, status } => {
            let status: AgentStatus = status.parse()?;
            let agent = db.set_agent_status(&id, status)?;
            println!(
                "{} '{}' is now {}",
                ">>>".green().bold(),
                agent.name,
                colorize_status(agent.status)
            );
        }
    }
    Ok(())
}

fn cmd_mcp(home_dir: &Path, cmd: McpCommands) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    match cmd {
        McpCommands::Add {
            name,
            mcp_type,
            author,
            description,
            tags,
        } => {
            let mcp = db.create_mcp(NewMcp {
                name,
                description,
                mcp_type,
                author,
                tags,
            })?;
            println!("{} Registered MCP '{}'", ">>>".green().bold(), mcp.name);
            println!("    id: {}", mcp.id);
        }
        McpCommands::List { tag } => {
            let mcps = db.list_mcps(
                McpFilter {
                    tag,
                    ..Default::default()
                },
                Page::default(),
            )?;
            for mcp in mcps {
                println!(
                    "{:<26} {:<20} {:<10} by {} [{}]",
                    mcp.id,
                    mcp.name,
                    mcp.mcp_type,
                    mcp.author,
                    mcp.tags.join(", ")
                );
            }
        }
        McpCommands::Bind {
            agent_id,
            mcp_id,
            config,
        } => {
            let configuration = config
                .map(|c| serde_json::from_str(&c))
                .transpose()
                .context("Binding config must be valid JSON")?;
            db.upsert_binding(&agent_id, &mcp_id, configuration)?;
            println!(
                "{} Bound agent {} to MCP {}",
                ">>>".green().bold(),
                agent_id,
                mcp_id
            );
        }
    }
    Ok(())
}

fn cmd_trigger(home_dir: &Path, cmd: TriggerCommands) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    match cmd {
        TriggerCommands::Add {
            agent_id,
            trigger_type,
            config,
        } => {
            let trigger_type: TriggerType = trigger_type.parse()?;
            let configuration =
                serde_json::from_str(&config).context("Trigger config must be valid JSON")?;
            let trigger = db.create_trigger(NewTrigger {
                trigger_type,
                configuration,
                agent_id,
            })?;
            println!(
                "{} Added {} trigger {}",
                ">>>".green().bold(),
                trigger.trigger_type,
                trigger.id
            );
        }
        TriggerCommands::List { agent_id } => {
            for trigger in db.triggers_for_agent(&agent_id)? {
                println!(
                    "{:<26} {:<14} {}",
                    trigger.id, trigger.trigger_type, trigger.configuration
                );
            }
        }
    }
    Ok(())
}

fn cmd_store(home_dir: &Path, cmd: StoreCommands) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    match cmd {
        StoreCommands::List { item_type } => {
            let item_type = item_type.map(|t| t.parse::<ItemType>()).transpose()?;
            let items = db.list_items(
                StoreItemFilter {
                    item_type,
                    ..Default::default()
                },
                Page::default(),
            )?;
            for item in items {
                println!(
                    "{:<26} {:<24} {:<14} by {}",
                    item.id, item.name, item.item_type, item.creator
                );
            }
        }
    }
    Ok(())
}

fn cmd_logs(home_dir: &Path, cmd: LogCommands) -> Result<()> {
    let (_cfg, db) = bootstrap(home_dir)?;

    match cmd {
        LogCommands::Tail { lines } => {
            let mut logs = db.recent_logs(lines)?;
            logs.reverse(); // chronological for reading
            for log in logs {
                println!(
                    "{} {} {}",
                    log.created_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    log.agent_id.dimmed(),
                    log.message
                );
            }
        }
        LogCommands::Prune { days } => {
            let cutoff = chrono::Utc::now() - chrono::Duration::days(days);
            let pruned = db.prune_logs_before(cutoff)?;
            println!("{} Pruned {} log lines", ">>>".green().bold(), pruned);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load config and open the database.
fn bootstrap(home_dir: &Path) -> Result<(HubConfig, Database)> {
    let config_path = home_dir.join("agenthub.toml");

    if !config_path.exists() {
        eprintln!(
            "{} No config found at {:?}. Run `agenthub init` first.",
            "Error:".red().bold(),
            config_path
        );
        std::process::exit(1);
    }

    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = cfg.resolved_db_path();
    let db = Database::open(Path::new(&db_path))
        .with_context(|| format!("Failed to open database at {db_path}"))?;

    Ok((cfg, db))
}

fn colorize_status(status: AgentStatus) -> String {
    match status {
        AgentStatus::Running => status.to_string().green().to_string(),
        AgentStatus::Stopped => status.to_string().yellow().to_string(),
        AgentStatus::Error => status.to_string().red().bold().to_string(),
    }
}

fn colorize_count(status: AgentStatus, count: u64) -> String {
    match status {
        AgentStatus::Error if count > 0 => count.to_string().red().to_string(),
        _ => count.to_string(),
    }
}
