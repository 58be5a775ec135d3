use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::application::{NewTournament, QueryFacade, RegistrationService};
use crate::domain::{format_coins, parse_coins, Coins, TournamentStatus};
use crate::storage::{LedgerStore, MemoryCatalog, MemoryLedger, Repository, TournamentCatalog};

/// Tourney - tournament registration and coin ledger
#[derive(Parser)]
#[command(name = "tourney")]
#[command(about = "Tournament registration backed by an append-only coin ledger")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, default_value = "tourney.db", env = "TOURNEY_DATABASE")]
    pub database: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Credit coins to an account
    Deposit {
        /// Account username
        username: String,

        /// Amount of coins (e.g., "500" or "1,500")
        amount: String,
    },

    /// Debit coins from an account
    Withdraw {
        /// Account username
        username: String,

        /// Amount of coins
        amount: String,
    },

    /// Tournament management commands
    #[command(subcommand)]
    Tournament(TournamentCommands),

    /// Register an account for a tournament and pay its entry fee
    Join {
        /// Tournament id or title
        tournament: String,

        /// Account username
        #[arg(short, long)]
        user: String,

        /// Team identifier
        #[arg(short, long)]
        team: Option<String>,
    },

    /// Leave an upcoming tournament and get the entry fee back
    Leave {
        /// Tournament id or title
        tournament: String,

        /// Account username
        #[arg(short, long)]
        user: String,
    },

    /// Pay prize coins to a participant of a completed tournament
    Award {
        /// Tournament id or title
        tournament: String,

        /// Account username
        #[arg(short, long)]
        user: String,

        /// Amount of coins
        amount: String,
    },

    /// Show ledger entries for an account, newest first
    History {
        /// Account username
        username: String,

        /// Maximum number of entries to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rank accounts by prize coins won
    Leaderboard {
        /// Number of rows to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Verify ledger and roster integrity
    Check,

    /// Repair registrations whose fees are missing or were never refunded
    Reconcile,

    /// Export data to CSV or JSON
    Export {
        /// What to export: entries, accounts, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Restrict entries to one account
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080", env = "TOURNEY_BIND")]
        bind: String,

        /// Keep all state in memory instead of the database file
        #[arg(long)]
        in_memory: bool,
    },
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account
    Open {
        /// Username (must be unique)
        username: String,

        /// Opening balance in coins
        #[arg(short, long, default_value = "0")]
        balance: String,
    },

    /// Show account details
    Show {
        /// Account username
        username: String,
    },

    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum TournamentCommands {
    /// Create a new tournament
    Create {
        /// Tournament title
        title: String,

        /// Game being played
        #[arg(short, long)]
        game: String,

        /// Entry fee in coins
        #[arg(short, long, default_value = "0")]
        fee: String,

        /// Maximum number of participants
        #[arg(short, long)]
        capacity: u32,

        /// Advertised prize pool in coins
        #[arg(short, long, default_value = "0")]
        prize_pool: String,

        /// Start date (YYYY-MM-DD or RFC 3339, defaults to now)
        #[arg(short, long)]
        start: Option<String>,

        /// Description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List tournaments
    List {
        /// Filter by status: upcoming, live, completed
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Move a tournament to a later status
    Status {
        /// Tournament id or title
        tournament: String,

        /// New status: live, completed
        status: String,
    },

    /// Show the participants of a tournament
    Roster {
        /// Tournament id or title
        tournament: String,
    },
}

/// Registration and query services over one SQLite database
struct Services {
    registration: RegistrationService<Repository, Repository>,
    queries: QueryFacade<Repository, Repository>,
}

impl Services {
    async fn connect(database_path: &str) -> Result<Self> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await.with_context(|| {
            format!(
                "Cannot open '{}'. Run 'tourney init' first",
                database_path
            )
        })?;
        Ok(Self::over(Arc::new(repo)))
    }

    fn over(repo: Arc<Repository>) -> Self {
        Self {
            registration: RegistrationService::new(repo.clone(), repo.clone()),
            queries: QueryFacade::new(repo.clone(), repo),
        }
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Commands::Init => {
                let db_url = format!("sqlite:{}?mode=rwc", self.database);
                Repository::init(&db_url).await?;
                println!("Database initialized: {}", self.database);
            }

            Commands::Account(account_cmd) => {
                let services = Services::connect(&self.database).await?;
                run_account_command(&services, account_cmd).await?;
            }

            Commands::Deposit { username, amount } => {
                let services = Services::connect(&self.database).await?;
                let amount = parse_amount(&amount)?;
                let account = services.queries.find_account(&username).await?;
                let entry = services.registration.deposit(account.id, amount).await?;
                println!(
                    "Deposited {} to {} (balance: {})",
                    format_coins(amount),
                    account.username,
                    format_coins(entry.balance_after)
                );
            }

            Commands::Withdraw { username, amount } => {
                let services = Services::connect(&self.database).await?;
                let amount = parse_amount(&amount)?;
                let account = services.queries.find_account(&username).await?;
                let entry = services.registration.withdraw(account.id, amount).await?;
                println!(
                    "Withdrew {} from {} (balance: {})",
                    format_coins(amount),
                    account.username,
                    format_coins(entry.balance_after)
                );
            }

            Commands::Tournament(tournament_cmd) => {
                let services = Services::connect(&self.database).await?;
                run_tournament_command(&services, tournament_cmd).await?;
            }

            Commands::Join {
                tournament,
                user,
                team,
            } => {
                let services = Services::connect(&self.database).await?;
                let tournament = services.queries.find_tournament(&tournament).await?;
                let account = services.queries.find_account(&user).await?;

                let receipt = services
                    .registration
                    .join(tournament.id, account.id, team)
                    .await?;

                match &receipt.entry {
                    Some(entry) => println!(
                        "{} joined {} for {} coins (balance: {})",
                        account.username,
                        tournament.title,
                        format_coins(-entry.amount),
                        format_coins(receipt.balance)
                    ),
                    None => println!("{} joined {} (free entry)", account.username, tournament.title),
                }
            }

            Commands::Leave { tournament, user } => {
                let services = Services::connect(&self.database).await?;
                let tournament = services.queries.find_tournament(&tournament).await?;
                let account = services.queries.find_account(&user).await?;

                let receipt = services.registration.leave(tournament.id, account.id).await?;
                match &receipt.refund {
                    Some(refund) => println!(
                        "{} left {}, refunded {} coins (balance: {})",
                        account.username,
                        tournament.title,
                        format_coins(refund.amount),
                        format_coins(receipt.balance)
                    ),
                    None => println!("{} left {}", account.username, tournament.title),
                }
            }

            Commands::Award {
                tournament,
                user,
                amount,
            } => {
                let services = Services::connect(&self.database).await?;
                let amount = parse_amount(&amount)?;
                let tournament = services.queries.find_tournament(&tournament).await?;
                let account = services.queries.find_account(&user).await?;

                let entry = services
                    .registration
                    .award_prize(tournament.id, account.id, amount)
                    .await?;
                println!(
                    "Awarded {} coins to {} for {} (balance: {})",
                    format_coins(amount),
                    account.username,
                    tournament.title,
                    format_coins(entry.balance_after)
                );
            }

            Commands::History { username, limit } => {
                let services = Services::connect(&self.database).await?;
                run_history_command(&services, &username, limit).await?;
            }

            Commands::Leaderboard { limit } => {
                let services = Services::connect(&self.database).await?;
                let rows = services.queries.prize_leaderboard(limit).await?;

                if rows.is_empty() {
                    println!("No results yet.");
                } else {
                    println!("{:<5} {:<20} {:>12} {:>8}", "RANK", "USER", "PRIZES", "PLAYED");
                    println!("{}", "-".repeat(48));
                    for row in rows {
                        println!(
                            "{:<5} {:<20} {:>12} {:>8}",
                            row.rank,
                            row.username,
                            format_coins(row.prize_total),
                            row.tournaments_joined
                        );
                    }
                }
            }

            Commands::Check => {
                let services = Services::connect(&self.database).await?;
                run_check_command(&services).await?;
            }

            Commands::Reconcile => {
                let services = Services::connect(&self.database).await?;
                let report = services.registration.reconcile().await?;

                if report.is_empty() {
                    println!("Nothing to reconcile.");
                } else {
                    println!("Charged:  {} unpaid registration(s)", report.charged.len());
                    println!("Removed:  {} unaffordable registration(s)", report.removed.len());
                    println!("Refunded: {} orphaned fee(s)", report.refunded.len());
                }
            }

            Commands::Export {
                export_type,
                output,
                user,
            } => {
                let services = Services::connect(&self.database).await?;
                run_export_command(&services, &export_type, output.as_deref(), user.as_deref())
                    .await?;
            }

            Commands::Serve { bind, in_memory } => {
                if in_memory {
                    warn!("serving from memory; state is lost on shutdown");
                    serve(
                        Arc::new(MemoryLedger::new()),
                        Arc::new(MemoryCatalog::new()),
                        &bind,
                    )
                    .await?;
                } else {
                    let db_url = format!("sqlite:{}", self.database);
                    let repo = Arc::new(Repository::connect(&db_url).await.with_context(|| {
                        format!("Cannot open '{}'. Run 'tourney init' first", self.database)
                    })?);
                    serve(repo.clone(), repo, &bind).await?;
                }
            }
        }

        Ok(())
    }
}

async fn run_account_command(services: &Services, cmd: AccountCommands) -> Result<()> {
    match cmd {
        AccountCommands::Open { username, balance } => {
            let balance = parse_coins(&balance)
                .with_context(|| format!("Invalid opening balance '{}'", balance))?;
            let account = services.registration.open_account(&username, balance).await?;
            println!(
                "Opened account: {} ({} coins)",
                account.username,
                format_coins(account.balance)
            );
        }

        AccountCommands::Show { username } => {
            let account = services.queries.find_account(&username).await?;
            let summary = services.queries.account_summary(account.id).await?;
            let joined = services.queries.user_joined_tournaments(account.id).await?;

            println!("Account: {}", account.username);
            println!("  ID:          {}", account.id);
            println!("  Balance:     {}", format_coins(account.balance));
            println!("  Opening:     {}", format_coins(account.initial_balance));
            println!(
                "  Created:     {}",
                account.created_at.format("%Y-%m-%d %H:%M:%S")
            );
            println!("  Entries:     {}", summary.entries);
            println!("  Tournaments: {}", summary.tournaments_joined);
            for item in joined {
                println!(
                    "    - {} ({}, {})",
                    item.tournament.title, item.tournament.game, item.tournament.status
                );
            }
        }

        AccountCommands::List => {
            let accounts = services.queries.list_accounts().await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<20} {:>12}", "USERNAME", "BALANCE");
                println!("{}", "-".repeat(33));
                for account in accounts {
                    println!(
                        "{:<20} {:>12}",
                        account.username,
                        format_coins(account.balance)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_tournament_command(services: &Services, cmd: TournamentCommands) -> Result<()> {
    match cmd {
        TournamentCommands::Create {
            title,
            game,
            fee,
            capacity,
            prize_pool,
            start,
            description,
        } => {
            let entry_fee =
                parse_coins(&fee).with_context(|| format!("Invalid entry fee '{}'", fee))?;
            let prize_pool = parse_coins(&prize_pool)
                .with_context(|| format!("Invalid prize pool '{}'", prize_pool))?;
            let start_time = match start {
                Some(s) => parse_start(&s)?,
                None => Utc::now(),
            };

            let tournament = services
                .registration
                .create_tournament(NewTournament {
                    title,
                    game,
                    description,
                    entry_fee,
                    capacity,
                    prize_pool,
                    start_time,
                })
                .await?;
            println!(
                "Created tournament: {} ({}, fee {}, {} slots) {}",
                tournament.title,
                tournament.game,
                format_coins(tournament.entry_fee),
                tournament.capacity,
                tournament.id
            );
        }

        TournamentCommands::List { status } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let tournaments = services.queries.list_tournaments(status).await?;

            if tournaments.is_empty() {
                println!("No tournaments found.");
            } else {
                println!(
                    "{:<24} {:<14} {:<10} {:>8} {:>6} {:<16}",
                    "TITLE", "GAME", "STATUS", "FEE", "SLOTS", "STARTS"
                );
                println!("{}", "-".repeat(83));
                for t in tournaments {
                    println!(
                        "{:<24} {:<14} {:<10} {:>8} {:>6} {:<16}",
                        t.title,
                        t.game,
                        t.status,
                        format_coins(t.entry_fee),
                        t.capacity,
                        t.start_time.format("%Y-%m-%d %H:%M")
                    );
                }
            }
        }

        TournamentCommands::Status { tournament, status } => {
            let status = parse_status(&status)?;
            let tournament = services.queries.find_tournament(&tournament).await?;
            let updated = services
                .registration
                .update_status(tournament.id, status)
                .await?;
            println!(
                "{}: {} -> {}",
                updated.title, tournament.status, updated.status
            );
        }

        TournamentCommands::Roster { tournament } => {
            let tournament = services.queries.find_tournament(&tournament).await?;
            let roster = services.queries.tournament_roster(tournament.id).await?;

            println!("{} ({})", roster.tournament.title, roster.tournament.status);
            println!(
                "  {} of {} slots taken",
                roster.participants.len(),
                roster.tournament.capacity
            );

            let accounts = services.queries.list_accounts().await?;
            for participant in &roster.participants {
                let username = accounts
                    .iter()
                    .find(|a| a.id == participant.account_id)
                    .map(|a| a.username.as_str())
                    .unwrap_or("<unknown>");
                match &participant.team_id {
                    Some(team) => println!(
                        "  {:<20} team {:<12} {}",
                        username,
                        team,
                        participant.joined_at.format("%Y-%m-%d %H:%M")
                    ),
                    None => println!(
                        "  {:<20} {:<17} {}",
                        username,
                        "",
                        participant.joined_at.format("%Y-%m-%d %H:%M")
                    ),
                }
            }
        }
    }
    Ok(())
}

async fn run_history_command(
    services: &Services,
    username: &str,
    limit: Option<usize>,
) -> Result<()> {
    let account = services.queries.find_account(username).await?;
    let mut entries = services.queries.transaction_history(account.id).await?;
    if let Some(limit) = limit {
        entries.truncate(limit);
    }

    if entries.is_empty() {
        println!("No entries for {}.", account.username);
        return Ok(());
    }

    println!(
        "{:<17} {:<11} {:>10} {:>10}  REFERENCE",
        "DATE", "KIND", "AMOUNT", "BALANCE"
    );
    println!("{}", "-".repeat(70));
    for entry in entries {
        println!(
            "{:<17} {:<11} {:>10} {:>10}  {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.kind,
            format_coins(entry.amount),
            format_coins(entry.balance_after),
            entry.reference
        );
    }
    Ok(())
}

async fn run_check_command(services: &Services) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = services.registration.check_integrity().await?;

    println!("Accounts:    {}", report.accounts_checked);
    println!("Tournaments: {}", report.tournaments_checked);
    println!("Entries:     {}", report.entries_checked);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed. Run 'tourney reconcile' to repair fees");
    }

    Ok(())
}

async fn run_export_command(
    services: &Services,
    export_type: &str,
    output: Option<&str>,
    user: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{stdout, Write};

    let exporter = Exporter::new(&services.queries);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    match export_type {
        "entries" => {
            let account = match user {
                Some(username) => Some(services.queries.find_account(username).await?.id),
                None => None,
            };
            let count = exporter.export_entries_csv(writer, account).await?;
            if output.is_some() {
                eprintln!("Exported {} entries", count);
            }
        }
        "accounts" => {
            let count = exporter.export_accounts_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} accounts", count);
            }
        }
        "full" => {
            let snapshot = exporter.export_snapshot_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported full database: {} accounts, {} tournaments, {} participants, {} entries",
                    snapshot.accounts.len(),
                    snapshot.tournaments.len(),
                    snapshot.participants.len(),
                    snapshot.entries.len()
                );
            }
        }
        _ => {
            anyhow::bail!(
                "Invalid export type '{}'. Valid types: entries, accounts, full",
                export_type
            );
        }
    }

    Ok(())
}

/// Serve the HTTP API until ctrl-c. Leftovers from an earlier crash are
/// reconciled before the listener opens.
async fn serve<L, C>(ledger: Arc<L>, catalog: Arc<C>, bind: &str) -> Result<()>
where
    L: LedgerStore + 'static,
    C: TournamentCatalog + 'static,
{
    let state = ApiState::new(ledger, catalog);

    let report = state.registration.reconcile().await?;
    if !report.is_empty() {
        info!(
            charged = report.charged.len(),
            removed = report.removed.len(),
            refunded = report.refunded.len(),
            "startup reconciliation repaired registrations"
        );
    }

    let app = api::router(state);
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
    }
}

fn parse_amount(input: &str) -> Result<Coins> {
    let amount = parse_coins(input)
        .with_context(|| format!("Invalid amount '{}'. Use whole coins, e.g. '500'", input))?;
    if amount == 0 {
        anyhow::bail!("Amount must be positive");
    }
    Ok(amount)
}

fn parse_status(input: &str) -> Result<TournamentStatus> {
    TournamentStatus::from_str(input).ok_or_else(|| {
        anyhow::anyhow!(
            "Invalid status '{}'. Valid statuses: upcoming, live, completed",
            input
        )
    })
}

/// Accepts a full RFC 3339 timestamp or a bare date (midnight UTC).
fn parse_start(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    let naive_date = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .with_context(|| format!("Invalid start '{}'. Use YYYY-MM-DD or RFC 3339", input))?;
    let naive_datetime = naive_date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;

    Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
}
