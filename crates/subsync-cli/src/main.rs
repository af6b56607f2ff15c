use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

mod commands;

use commands::{classify, load_config, parse_now, read_json_file, reconcile};

#[derive(Parser)]
#[command(name = "subsync")]
#[command(about = "Subscription entitlement reconciliation CLI", long_about = None)]
struct Cli {
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
        /// Paths in merge order (base -> env -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Classify a saved billing subscriber payload (offline)
    Classify {
        /// Path to the provider's subscriber JSON
        #[arg(long)]
        snapshot: String,

        /// Evaluation time, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Show what a saved webhook payload would trigger (offline)
    Webhook {
        /// Path to the webhook JSON body
        #[arg(long = "payload-file")]
        payload_file: String,

        /// Evaluation time, RFC 3339 (default: now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Run one reconcile cycle for a user against billing + DB
    Reconcile {
        #[arg(long)]
        user: String,

        /// Link the billing identity to the user first
        #[arg(long, default_value_t = false)]
        link: bool,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,
    },

    /// Print the persisted record for a user (created as free if missing)
    Record {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = subsync_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = subsync_db::status(&pool).await?;
                    println!(
                        "db_ok={} has_records_table={} record_count={}",
                        s.ok,
                        s.has_records_table,
                        s.record_count
                            .map(|n| n.to_string())
                            .unwrap_or_else(|| "n/a".to_string())
                    );
                }
                DbCmd::Migrate => {
                    subsync_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let loaded = load_config(&paths)?;
            // validates the typed view too
            loaded.engine()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Classify {
            snapshot,
            now,
            config_paths,
        } => {
            let cfg = load_config(&config_paths)?.engine()?;
            let now = parse_now(now.as_deref())?;
            let raw = read_json_file(&snapshot)?;
            let v = classify::classify_snapshot_json(&raw, now, &cfg.classifier_rules())?;
            println!("{}", serde_json::to_string_pretty(&v)?);
        }

        Commands::Webhook { payload_file, now } => {
            let now = parse_now(now.as_deref())?;
            let raw = read_json_file(&payload_file)?;
            let v = classify::classify_webhook_json(&raw, now)?;
            println!("{}", serde_json::to_string_pretty(&v)?);
        }

        Commands::Reconcile {
            user,
            link,
            config_paths,
        } => {
            let cfg = load_config(&config_paths)?.engine()?;
            let coordinator = reconcile::build_coordinator(&cfg).await?;
            let out = if link {
                coordinator.link_and_reconcile(&user).await?
            } else {
                coordinator.reconcile(&user).await?
            };
            println!("{}", reconcile::outcome_line(&user, &out));
        }

        Commands::Record { user } => {
            let pool = subsync_db::connect_from_env().await?;
            let store = subsync_db::PgRecordStore::new(pool);
            let rec = subsync_db::RecordStore::read_record(&store, &user, Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&rec)?);
        }
    }

    Ok(())
}
