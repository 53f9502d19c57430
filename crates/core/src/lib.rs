//! ChainDocs core domain types
//!
//! Shared building blocks for every other crate: the positive-decimal
//! `Amount`, type-safe `Currency` codes, the closed `Role` set, uuid-backed
//! entity ids, and the `DomainError` taxonomy.

pub mod amount;
pub mod currency;
pub mod error;
pub mod identity;

pub use amount::{Amount, AmountError};
pub use currency::{Currency, CurrencyError};
pub use error::{DomainError, DomainResult};
pub use identity::{AlertId, CheckId, DocumentId, EntryId, Identity, Role, TradeId, UserId};
