//! Application context - wires everything together

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context as _;
use chaindocs_core::{Identity, Role, UserId};
use chaindocs_integrity::{AlertStore, IntegrityVerifier, VerifierConfig};
use chaindocs_ledger::LedgerStore;
use chaindocs_registry::{DocumentRegistry, FsObjectStore, ObjectStore};
use chaindocs_risk::RiskEngine;
use chaindocs_trade::TradeBook;
use serde::{Deserialize, Serialize};

/// One entry of the CLI's local user directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

/// Application context - wires together all components.
///
/// Trade and document state is rebuilt from the ledger on startup, so the
/// append-only journal is the source of truth across invocations. The user
/// directory lives in a small `users.json` beside it; a real deployment
/// would bind an identity provider here instead.
pub struct AppContext {
    pub ledger: Arc<LedgerStore>,
    pub book: Arc<TradeBook>,
    pub registry: Arc<DocumentRegistry>,
    pub alerts: Arc<AlertStore>,
    pub risk: Arc<RiskEngine>,
    storage: Arc<dyn ObjectStore>,
    users: Mutex<Vec<UserRecord>>,
    users_path: PathBuf,
}

impl AppContext {
    pub fn new(data_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let data_path = data_path.as_ref();
        std::fs::create_dir_all(data_path)
            .with_context(|| format!("creating data directory {}", data_path.display()))?;

        let ledger = Arc::new(LedgerStore::open(data_path.join("ledger.jsonl"))?);
        let storage: Arc<dyn ObjectStore> =
            Arc::new(FsObjectStore::new(data_path.join("objects")));

        let book = Arc::new(TradeBook::replay(Arc::clone(&ledger))?);
        let registry = Arc::new(DocumentRegistry::replay(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&storage),
        )?);
        let alerts = Arc::new(AlertStore::new(data_path.join("alerts.db"))?);
        let risk = Arc::new(RiskEngine::new(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&registry),
        ));

        let users_path = data_path.join("users.json");
        let users: Vec<UserRecord> = if users_path.exists() {
            let raw = std::fs::read_to_string(&users_path)
                .with_context(|| format!("reading {}", users_path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", users_path.display()))?
        } else {
            Vec::new()
        };
        for user in &users {
            book.register_user(user.id, user.role);
        }

        tracing::debug!(
            entries = ledger.len(),
            users = users.len(),
            "context rebuilt from {}",
            data_path.display()
        );

        Ok(Self {
            ledger,
            book,
            registry,
            alerts,
            risk,
            storage,
            users: Mutex::new(users),
            users_path,
        })
    }

    /// Add a user to the directory and persist it.
    pub fn add_user(&self, name: &str, role: Role) -> anyhow::Result<UserRecord> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.name == name) {
            anyhow::bail!("user '{name}' already exists");
        }

        let record = UserRecord {
            id: UserId::generate(),
            name: name.to_string(),
            role,
        };
        users.push(record.clone());
        std::fs::write(&self.users_path, serde_json::to_string_pretty(&*users)?)
            .with_context(|| format!("writing {}", self.users_path.display()))?;

        self.book.register_user(record.id, record.role);
        Ok(record)
    }

    /// Resolve a CLI `--as` argument (user name or raw id) to an identity.
    pub fn identity(&self, who: &str) -> anyhow::Result<Identity> {
        let users = self.users.lock().unwrap();
        let found = users
            .iter()
            .find(|u| u.name == who)
            .or_else(|| who.parse::<UserId>().ok().and_then(|id| users.iter().find(|u| u.id == id)));
        match found {
            Some(user) => Ok(Identity::new(user.id, user.role)),
            None => anyhow::bail!("unknown user '{who}' (add with: chaindocs user add)"),
        }
    }

    /// Look up a user record by name or id.
    pub fn user(&self, who: &str) -> anyhow::Result<UserRecord> {
        let identity = self.identity(who)?;
        let users = self.users.lock().unwrap();
        users
            .iter()
            .find(|u| u.id == identity.user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown user '{who}'"))
    }

    pub fn users(&self) -> Vec<UserRecord> {
        self.users.lock().unwrap().clone()
    }

    /// Build an integrity verifier over the wired components.
    pub fn verifier(&self, concurrency: usize, timeout: Duration) -> IntegrityVerifier {
        IntegrityVerifier::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.storage),
            Arc::clone(&self.ledger),
            Arc::clone(&self.alerts),
            VerifierConfig {
                max_concurrency: concurrency,
                per_document_timeout: timeout,
            },
        )
    }
}
