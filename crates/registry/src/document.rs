//! Document records

use chaindocs_core::{DocumentId, TradeId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Kinds of trade documents the registry accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    BillOfLading,
    LetterOfCredit,
    CertificateOfOrigin,
    InsuranceCertificate,
    PackingList,
    Contract,
    PaymentProof,
    Other,
}

/// How an update combines with the stored bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Replace the stored object with the new bytes.
    Overwrite,
    /// Keep the stored object, add the new bytes after a newline.
    Append,
}

/// One registered document.
///
/// `file_hash` is always the SHA-256 of the bytes the registry last wrote;
/// whether the object store still holds those bytes is the integrity
/// verifier's question, not the registry's. `file_hash` and `doc_number`
/// are each unique across the whole registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Owning trade, if the document was uploaded against one.
    pub trade_id: Option<TradeId>,
    pub doc_type: DocumentType,
    pub doc_number: String,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: u64,
    pub storage_key: String,
    pub uploaded_by: UserId,
    pub issued_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_doc_type_tokens() {
        assert_eq!(DocumentType::BillOfLading.to_string(), "bill_of_lading");
        assert_eq!(DocumentType::LetterOfCredit.to_string(), "letter_of_credit");
        assert_eq!(
            DocumentType::from_str("certificate_of_origin").unwrap(),
            DocumentType::CertificateOfOrigin
        );
        assert_eq!(
            DocumentType::from_str("payment_proof").unwrap(),
            DocumentType::PaymentProof
        );
    }

    #[test]
    fn test_update_mode_tokens() {
        assert_eq!(UpdateMode::Overwrite.to_string(), "overwrite");
        assert_eq!(UpdateMode::from_str("append").unwrap(), UpdateMode::Append);
    }
}
