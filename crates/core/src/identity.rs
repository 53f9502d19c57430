//! Identities and entity ids
//!
//! Roles are a closed enum checked exhaustively at the gate, never a raw
//! string compared ad hoc. Every call into the core carries an `Identity`
//! (user id + role) that the surrounding system has already authenticated.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

/// The closed set of user roles.
///
/// `Corporate` covers both buyers and sellers; which side of a trade a
/// corporate user sits on is a property of the trade, not of the role.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Corporate,
    Bank,
    Auditor,
    Admin,
}

impl Role {
    /// Auditors may never mutate anything
    pub fn is_read_only(&self) -> bool {
        matches!(self, Role::Auditor)
    }
}

/// An authenticated caller: user id plus role.
///
/// The core trusts this as already-authenticated; token mechanics live in
/// the surrounding system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Id of a user
    UserId
);
uuid_id!(
    /// Id of a trade
    TradeId
);
uuid_id!(
    /// Id of a document
    DocumentId
);
uuid_id!(
    /// Id of a ledger entry
    EntryId
);
uuid_id!(
    /// Id of an integrity check run
    CheckId
);
uuid_id!(
    /// Id of an alert
    AlertId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_parse_roundtrip() {
        for role in [Role::Corporate, Role::Bank, Role::Auditor, Role::Admin] {
            let s = role.to_string();
            assert_eq!(Role::from_str(&s).unwrap(), role);
        }
    }

    #[test]
    fn test_auditor_is_read_only() {
        assert!(Role::Auditor.is_read_only());
        assert!(!Role::Corporate.is_read_only());
        assert!(!Role::Bank.is_read_only());
        assert!(!Role::Admin.is_read_only());
    }

    #[test]
    fn test_id_display_parse_roundtrip() {
        let id = TradeId::generate();
        let parsed = TradeId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(UserId::generate(), UserId::generate());
    }
}
