use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "rbx")]
#[command(about = "Rent cycle reconciliation CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> site overrides)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Bring guests' due dates and balances up to date
    Reconcile {
        #[command(subcommand)]
        cmd: ReconcileCmd,
    },

    /// Print upcoming due dates for a cadence (no DB)
    NextDue {
        /// Current due date, RFC 3339 (e.g. 2024-01-31T00:00:00Z)
        #[arg(long)]
        from: String,

        /// minutes | hours | days | weeks | months
        #[arg(long)]
        unit: String,

        /// Units per cycle
        #[arg(long)]
        value: u32,

        /// Billing anchor day (months only)
        #[arg(long)]
        anchor: Option<u32>,

        /// How many successive due dates to print
        #[arg(long, default_value_t = 1)]
        count: u32,
    },

    /// List rent reminders due for an owner's active guests
    Reminders {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum ReconcileCmd {
    /// Batch over every owner's active guests
    All {
        /// Max guests to advance (overrides reconcile.limit)
        #[arg(long)]
        limit: Option<usize>,

        /// Guests of one owner processed in parallel (overrides reconcile.concurrency)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Wall-clock budget in seconds (overrides reconcile.deadline_secs)
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Reconcile a single guest
    Guest {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        guest: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // dev-time convenience; absent file is fine
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    let cfg = commands::load_config(&cli.config_paths)?;
    commands::init_tracing(&cfg.settings.logging.filter);

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect(&cfg.settings).await?;
            match cmd {
                DbCmd::Status => {
                    let s = rbx_db::status(&pool).await?;
                    println!("db_ok={} has_guests_table={}", s.ok, s.has_guests_table);
                }
                DbCmd::Migrate => {
                    rbx_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = rbx_config::load_layered_yaml(&paths)?;
            let report =
                rbx_config::report_unused_keys(&loaded.config_json, rbx_config::UnusedKeyPolicy::Warn)?;
            for p in &report.unused_leaf_pointers {
                eprintln!("WARN unused_config_key={p}");
            }
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Reconcile { cmd } => match cmd {
            ReconcileCmd::All {
                limit,
                concurrency,
                deadline_secs,
            } => {
                commands::reconcile::run_all(&cfg, limit, concurrency, deadline_secs).await?;
            }
            ReconcileCmd::Guest { owner, guest } => {
                commands::reconcile::run_guest(&cfg, &owner, &guest).await?;
            }
        },

        Commands::NextDue {
            from,
            unit,
            value,
            anchor,
            count,
        } => {
            commands::next_due::run(&from, &unit, value, anchor, count)?;
        }

        Commands::Reminders { owner } => {
            commands::reminders::run(&cfg, &owner).await?;
        }
    }

    Ok(())
}
