//! CLI commands

use std::path::Path;
use std::time::Duration;

use chaindocs_core::{AlertId, DocumentId, Role, TradeId};
use chaindocs_gate as gate;
use chaindocs_integrity::{AlertStatus, FindingStatus};
use chaindocs_registry::{sha256_hex, DocumentType, UpdateMode};
use chaindocs_trade::{Trade, TradeStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::context::AppContext;

/// Add a user to the directory
pub fn user_add(ctx: &AppContext, name: &str, role: Role) -> anyhow::Result<()> {
    let user = ctx.add_user(name, role)?;
    println!("✅ Added {} user '{}' ({})", user.role, user.name, user.id);
    Ok(())
}

/// List all known users
pub fn user_list(ctx: &AppContext) -> anyhow::Result<()> {
    let users = ctx.users();
    if users.is_empty() {
        println!("No users registered yet");
        return Ok(());
    }
    for user in users {
        println!("{}  {:10}  {}", user.id, user.role.to_string(), user.name);
    }
    Ok(())
}

/// Create a trade
pub fn trade_create(
    ctx: &AppContext,
    buyer: &str,
    seller: &str,
    amount: Decimal,
    currency: &str,
    description: &str,
) -> anyhow::Result<()> {
    let buyer = ctx.identity(buyer)?;
    let seller = ctx.user(seller)?;

    let trade = ctx
        .book
        .create_trade(&buyer, seller.id, amount, currency, description)?;

    println!(
        "✅ Created trade {} ({}) for {} {}",
        trade.trade_number, trade.id, trade.amount, trade.currency
    );
    Ok(())
}

/// Move a trade to a new status
pub fn trade_transition(
    ctx: &AppContext,
    trade_id: TradeId,
    status: &str,
    actor: &str,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let target: TradeStatus = status
        .to_uppercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown status '{status}'"))?;

    let trade = ctx.book.transition(trade_id, target, &actor, notes)?;
    println!("✅ Trade {} is now {}", trade.trade_number, trade.status);
    Ok(())
}

/// Assign a bank and move the trade into review
pub fn trade_assign_bank(
    ctx: &AppContext,
    trade_id: TradeId,
    bank: &str,
    actor: &str,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let bank = ctx.user(bank)?;

    let trade = ctx.book.assign_bank(trade_id, bank.id, &actor)?;
    println!(
        "✅ Assigned bank '{}' to trade {}; now {}",
        bank.name, trade.trade_number, trade.status
    );
    Ok(())
}

/// Show one trade with its timeline
pub fn trade_show(ctx: &AppContext, trade_id: TradeId, viewer: &str) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    let trade = ctx.book.get(trade_id, &viewer)?;
    print_trade(&trade);
    Ok(())
}

/// List trades visible to the caller
pub fn trade_list(ctx: &AppContext, viewer: &str) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    let trades = ctx.book.list_for(&viewer);
    if trades.is_empty() {
        println!("No visible trades");
        return Ok(());
    }
    for trade in trades {
        println!(
            "{}  {}  {:18}  {} {}",
            trade.id, trade.trade_number, trade.status.to_string(), trade.amount, trade.currency
        );
    }
    Ok(())
}

/// Print a trade's audit history
pub fn trade_history(ctx: &AppContext, trade_id: TradeId, viewer: &str) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    // Visibility follows the trade itself.
    ctx.book.get(trade_id, &viewer)?;

    let scope = gate::ledger_scope(&viewer);
    for entry in ctx.ledger.history_for_trade(trade_id) {
        if let gate::LedgerScope::Own(user_id) = scope {
            if entry.actor_id != user_id {
                continue;
            }
        }
        println!(
            "#{:<4} {}  {:20} by {} ({})",
            entry.sequence,
            entry.created_at.to_rfc3339(),
            entry.action.to_string(),
            entry.actor_id,
            entry.actor_role
        );
    }
    Ok(())
}

/// Upload a document, optionally against a trade
#[allow(clippy::too_many_arguments)]
pub async fn doc_upload(
    ctx: &AppContext,
    actor: &str,
    trade_id: Option<TradeId>,
    doc_type: &str,
    doc_number: &str,
    file: &Path,
    issued_at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let doc_type: DocumentType = doc_type
        .to_lowercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown document type '{doc_type}'"))?;
    let bytes = std::fs::read(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    let doc = ctx
        .registry
        .register_document(&actor, trade_id, doc_type, doc_number, &file_name, &bytes, issued_at)
        .await?;

    println!("✅ Registered {} {} as document {}", doc.doc_type, doc.doc_number, doc.id);
    println!("   SHA-256: {}", doc.file_hash);
    Ok(())
}

/// Update a document's stored bytes
pub async fn doc_update(
    ctx: &AppContext,
    actor: &str,
    document_id: DocumentId,
    mode: &str,
    file: &Path,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let mode: UpdateMode = mode
        .to_lowercase()
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown update mode '{mode}' (overwrite or append)"))?;
    let bytes = std::fs::read(file)?;

    let doc = ctx
        .registry
        .update_document(&actor, document_id, mode, &bytes)
        .await?;
    println!("✅ Updated document {} ({} bytes)", doc.id, doc.file_size);
    println!("   SHA-256: {}", doc.file_hash);
    Ok(())
}

/// Mark a document verified
pub fn doc_verify(ctx: &AppContext, actor: &str, document_id: DocumentId) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let doc = ctx.registry.mark_verified(&actor, document_id)?;
    println!("✅ Document {} verified; bytes are now frozen", doc.id);
    Ok(())
}

/// Download a document's bytes to a file
pub async fn doc_download(
    ctx: &AppContext,
    actor: &str,
    document_id: DocumentId,
    output: &Path,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let bytes = ctx.registry.download(&actor, document_id).await?;
    std::fs::write(output, &bytes)?;
    println!("✅ Wrote {} bytes to {}", bytes.len(), output.display());
    Ok(())
}

/// Hash a local file and compare against a claimed fingerprint
pub fn doc_check(ctx: &AppContext, file: &Path, claimed_hash: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)?;
    let (verified, registered) = ctx.registry.verify_upload(&bytes, claimed_hash);

    if verified {
        println!("✅ Hash matches the file contents");
    } else {
        println!("❌ Hash mismatch: file hashes to {}", sha256_hex(&bytes));
    }
    match registered {
        Some(doc) => println!("   Content already registered as document {} ({})", doc.id, doc.doc_number),
        None => println!("   Content is not registered yet"),
    }
    Ok(())
}

/// List a trade's documents
pub fn doc_list(ctx: &AppContext, viewer: &str, trade_id: TradeId) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    let docs = ctx.registry.list_for_trade(&viewer, trade_id)?;
    if docs.is_empty() {
        println!("No documents for this trade");
        return Ok(());
    }
    for doc in docs {
        let verified = if doc.verified_at.is_some() { "verified" } else { "" };
        println!(
            "{}  {:22} {:12} {:>9}B  {}",
            doc.id,
            doc.doc_type.to_string(),
            doc.doc_number,
            doc.file_size,
            verified
        );
    }
    Ok(())
}

/// Print a document's audit history
pub fn doc_history(ctx: &AppContext, viewer: &str, document_id: DocumentId) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    for entry in ctx.registry.history(&viewer, document_id)? {
        println!(
            "#{:<4} {}  {:18} by {} ({})",
            entry.sequence,
            entry.created_at.to_rfc3339(),
            entry.action.to_string(),
            entry.actor_id,
            entry.actor_role
        );
    }
    Ok(())
}

/// Run an integrity check over every document
pub async fn integrity_run(
    ctx: &AppContext,
    actor: &str,
    concurrency: usize,
    timeout_secs: u64,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    let verifier = ctx.verifier(concurrency, Duration::from_secs(timeout_secs));
    let summary = verifier.run(&actor).await?;

    if summary.is_clean() {
        println!("✅ Integrity check {}: all {} documents verified", summary.check_id, summary.total);
    } else {
        println!(
            "❌ Integrity check {}: {} verified, {} modified, {} missing, {} unreachable",
            summary.check_id,
            summary.verified,
            summary.modified,
            summary.missing,
            summary.access_error
        );
        for finding in summary.findings.iter().filter(|f| f.status != FindingStatus::Passed) {
            println!("   {}  {}", finding.document_id, finding.detail);
        }
    }
    Ok(())
}

/// List alerts, optionally filtered by status
pub fn alerts_list(ctx: &AppContext, actor: &str, status: Option<&str>) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    gate::require_admin(&actor)?;

    let alerts = match status {
        Some(raw) => {
            let status: AlertStatus = raw
                .to_lowercase()
                .parse()
                .map_err(|_| anyhow::anyhow!("unknown alert status '{raw}'"))?;
            ctx.alerts.list_by_status(status)?
        }
        None => ctx.alerts.list_all()?,
    };

    if alerts.is_empty() {
        println!("No alerts");
        return Ok(());
    }
    for alert in alerts {
        println!(
            "{}  {:13} {:8} {:12}  {}",
            alert.id,
            alert.alert_type.to_string(),
            alert.severity.to_string(),
            alert.status.to_string(),
            alert.message
        );
    }
    Ok(())
}

/// Acknowledge an active alert
pub fn alert_ack(ctx: &AppContext, actor: &str, alert_id: AlertId) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    gate::require_admin(&actor)?;
    let alert = ctx.alerts.acknowledge(alert_id, actor.user_id)?;
    println!("✅ Alert {} acknowledged", alert.id);
    Ok(())
}

/// Resolve an alert
pub fn alert_resolve(
    ctx: &AppContext,
    actor: &str,
    alert_id: AlertId,
    notes: Option<&str>,
) -> anyhow::Result<()> {
    let actor = ctx.identity(actor)?;
    gate::require_admin(&actor)?;
    let alert = ctx.alerts.resolve(alert_id, actor.user_id, notes)?;
    println!("✅ Alert {} resolved", alert.id);
    Ok(())
}

/// Recompute and print a trade's risk assessment
pub fn risk_assess(ctx: &AppContext, viewer: &str, trade_id: TradeId) -> anyhow::Result<()> {
    let viewer = ctx.identity(viewer)?;
    let assessment = ctx.risk.assess(trade_id, &viewer)?;

    println!(
        "Risk for trade {}: {} ({}), computed {}",
        trade_id,
        assessment.score,
        assessment.level,
        assessment.computed_at.to_rfc3339()
    );
    for reason in &assessment.reasons {
        println!("   - {reason}");
    }
    Ok(())
}

/// Print ledger-wide action counts
pub fn ledger_stats(ctx: &AppContext) -> anyhow::Result<()> {
    let stats = ctx.ledger.stats();
    println!("Ledger entries: {}", stats.total());
    let mut counts: Vec<_> = stats.iter().collect();
    counts.sort_by_key(|(action, _)| action.to_string());
    for (action, count) in counts {
        println!("   {:20} {}", action.to_string(), count);
    }
    Ok(())
}

fn print_trade(trade: &Trade) {
    println!("Trade {} ({})", trade.trade_number, trade.id);
    println!("   status:      {}", trade.status);
    println!("   amount:      {} {}", trade.amount, trade.currency);
    println!("   buyer:       {}", trade.buyer_id);
    println!("   seller:      {}", trade.seller_id);
    if let Some(bank) = trade.bank_id {
        println!("   bank:        {bank}");
    }
    println!("   description: {}", trade.description);
    println!("   initiated:   {}", trade.initiated_at.to_rfc3339());
    let timeline = [
        ("confirmed", trade.confirmed_at),
        ("documents", trade.documents_uploaded_at),
        ("bank review", trade.bank_review_started_at),
        ("approved", trade.bank_approved_at),
        ("payment", trade.payment_released_at),
        ("completed", trade.completed_at),
    ];
    for (label, stamp) in timeline {
        if let Some(at) = stamp {
            println!("   {:12} {}", format!("{label}:"), at.to_rfc3339());
        }
    }
}
