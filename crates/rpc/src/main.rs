//! ChainDocs CLI - Main entry point

use chaindocs_core::{AlertId, DocumentId, Role, TradeId};
use chaindocs_rpc::{commands, AppContext};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chaindocs")]
#[command(about = "ChainDocs - Trade document workflow and integrity ledger", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the local user directory
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Trade lifecycle operations
    Trade {
        #[command(subcommand)]
        command: TradeCommands,
    },

    /// Document registry operations
    Doc {
        #[command(subcommand)]
        command: DocCommands,
    },

    /// Run an integrity check over all documents
    Integrity {
        /// Acting admin user (name or id)
        #[arg(long = "as")]
        actor: String,
        /// Concurrent document checks
        #[arg(long, default_value = "8")]
        concurrency: usize,
        /// Per-document timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Inspect and manage integrity alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Recompute risk for a trade
    Risk {
        /// Trade id
        trade: TradeId,
        /// Acting user (name or id)
        #[arg(long = "as")]
        actor: String,
    },

    /// Print ledger-wide statistics
    Stats,
}

#[derive(Subcommand)]
enum UserCommands {
    /// Add a user
    Add {
        /// Display name
        name: String,
        /// Role: corporate, bank, auditor or admin
        #[arg(long)]
        role: String,
    },
    /// List users
    List,
}

#[derive(Subcommand)]
enum TradeCommands {
    /// Create a trade (buyer acts)
    Create {
        /// Buyer (name or id)
        #[arg(long = "as")]
        buyer: String,
        /// Seller (name or id)
        #[arg(long)]
        seller: String,
        /// Trade amount
        #[arg(long)]
        amount: Decimal,
        /// Three-letter currency code
        #[arg(long)]
        currency: String,
        /// Free-text description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Move a trade to a new status
    Transition {
        trade: TradeId,
        /// Target status, e.g. SELLER_CONFIRMED
        status: String,
        #[arg(long = "as")]
        actor: String,
        /// Optional notes recorded with the transition
        #[arg(long)]
        notes: Option<String>,
    },
    /// Assign a bank to a trade (buyer acts)
    AssignBank {
        trade: TradeId,
        /// Bank user (name or id)
        #[arg(long)]
        bank: String,
        #[arg(long = "as")]
        actor: String,
    },
    /// Show one trade with its timeline
    Show {
        trade: TradeId,
        #[arg(long = "as")]
        actor: String,
    },
    /// List visible trades
    List {
        #[arg(long = "as")]
        actor: String,
    },
    /// Print a trade's audit history
    History {
        trade: TradeId,
        #[arg(long = "as")]
        actor: String,
    },
}

#[derive(Subcommand)]
enum DocCommands {
    /// Upload a document, optionally against a trade
    Upload {
        /// Owning trade id, omit for a standalone document
        #[arg(long)]
        trade: Option<TradeId>,
        /// Document type, e.g. invoice or bill_of_lading
        #[arg(long = "type")]
        doc_type: String,
        /// Document number, e.g. INV-001
        #[arg(long)]
        number: String,
        /// Issue date of the underlying document, RFC 3339
        #[arg(long)]
        issued: Option<DateTime<Utc>>,
        /// File to upload
        file: PathBuf,
        #[arg(long = "as")]
        actor: String,
    },
    /// Check a local file against a claimed SHA-256 fingerprint
    Check {
        /// File to hash
        file: PathBuf,
        /// Claimed fingerprint, lowercase hex
        #[arg(long)]
        hash: String,
    },
    /// Update a document's bytes
    Update {
        document: DocumentId,
        /// overwrite or append
        #[arg(long, default_value = "overwrite")]
        mode: String,
        /// File holding the new bytes
        file: PathBuf,
        #[arg(long = "as")]
        actor: String,
    },
    /// Mark a document verified (bank or admin)
    Verify {
        document: DocumentId,
        #[arg(long = "as")]
        actor: String,
    },
    /// Download a document's bytes
    Download {
        document: DocumentId,
        /// Output file
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long = "as")]
        actor: String,
    },
    /// List a trade's documents
    List {
        #[arg(long)]
        trade: TradeId,
        #[arg(long = "as")]
        actor: String,
    },
    /// Print a document's audit history
    History {
        document: DocumentId,
        #[arg(long = "as")]
        actor: String,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List alerts
    List {
        /// Filter: active, acknowledged or resolved
        #[arg(long)]
        status: Option<String>,
        #[arg(long = "as")]
        actor: String,
    },
    /// Acknowledge an active alert
    Ack {
        alert: AlertId,
        #[arg(long = "as")]
        actor: String,
    },
    /// Resolve an alert
    Resolve {
        alert: AlertId,
        /// What was done about it
        #[arg(long)]
        notes: Option<String>,
        #[arg(long = "as")]
        actor: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let ctx = AppContext::new(&cli.data)?;

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Add { name, role } => {
                let role: Role = role
                    .to_lowercase()
                    .parse()
                    .map_err(|_| anyhow::anyhow!("unknown role '{role}'"))?;
                commands::user_add(&ctx, &name, role)?;
            }
            UserCommands::List => commands::user_list(&ctx)?,
        },

        Commands::Trade { command } => match command {
            TradeCommands::Create {
                buyer,
                seller,
                amount,
                currency,
                description,
            } => {
                commands::trade_create(&ctx, &buyer, &seller, amount, &currency, &description)?;
            }
            TradeCommands::Transition {
                trade,
                status,
                actor,
                notes,
            } => {
                commands::trade_transition(&ctx, trade, &status, &actor, notes.as_deref())?;
            }
            TradeCommands::AssignBank { trade, bank, actor } => {
                commands::trade_assign_bank(&ctx, trade, &bank, &actor)?;
            }
            TradeCommands::Show { trade, actor } => {
                commands::trade_show(&ctx, trade, &actor)?;
            }
            TradeCommands::List { actor } => {
                commands::trade_list(&ctx, &actor)?;
            }
            TradeCommands::History { trade, actor } => {
                commands::trade_history(&ctx, trade, &actor)?;
            }
        },

        Commands::Doc { command } => match command {
            DocCommands::Upload {
                trade,
                doc_type,
                number,
                issued,
                file,
                actor,
            } => {
                commands::doc_upload(&ctx, &actor, trade, &doc_type, &number, &file, issued)
                    .await?;
            }
            DocCommands::Check { file, hash } => {
                commands::doc_check(&ctx, &file, &hash)?;
            }
            DocCommands::Update {
                document,
                mode,
                file,
                actor,
            } => {
                commands::doc_update(&ctx, &actor, document, &mode, &file).await?;
            }
            DocCommands::Verify { document, actor } => {
                commands::doc_verify(&ctx, &actor, document)?;
            }
            DocCommands::Download {
                document,
                output,
                actor,
            } => {
                commands::doc_download(&ctx, &actor, document, &output).await?;
            }
            DocCommands::List { trade, actor } => {
                commands::doc_list(&ctx, &actor, trade)?;
            }
            DocCommands::History { document, actor } => {
                commands::doc_history(&ctx, &actor, document)?;
            }
        },

        Commands::Integrity {
            actor,
            concurrency,
            timeout,
        } => {
            commands::integrity_run(&ctx, &actor, concurrency, timeout).await?;
        }

        Commands::Alerts { command } => match command {
            AlertCommands::List { status, actor } => {
                commands::alerts_list(&ctx, &actor, status.as_deref())?;
            }
            AlertCommands::Ack { alert, actor } => {
                commands::alert_ack(&ctx, &actor, alert)?;
            }
            AlertCommands::Resolve { alert, notes, actor } => {
                commands::alert_resolve(&ctx, &actor, alert, notes.as_deref())?;
            }
        },

        Commands::Risk { trade, actor } => {
            commands::risk_assess(&ctx, &actor, trade)?;
        }

        Commands::Stats => commands::ledger_stats(&ctx)?,
    }

    Ok(())
}
