//! Account and credential storage used by the login flow.

mod memory;
mod sqlite;

pub use memory::MemoryAccountStore;
pub use sqlite::SqliteAccountStore;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// A customer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Stable account identifier.
    pub id: String,
    /// Email as stored; lookups compare it lowercased.
    pub email: String,
    /// Given name, if known.
    pub first_name: Option<String>,
    /// Family name, if known.
    pub last_name: Option<String>,
}

/// Password hash imported from the legacy site for one account.
///
/// Kept after migration as an audit trail; `migrated` flips to `true` once
/// and the hash is never consulted again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyHashRecord {
    /// Owning account.
    pub account_id: String,
    /// The hash exactly as imported.
    pub legacy_hash: String,
    /// Whether a modern credential has replaced this hash.
    pub migrated: bool,
}

/// The account's current bcrypt credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernCredential {
    /// Credential identifier carried in issued tokens.
    pub id: String,
    /// Owning account.
    pub account_id: String,
    /// bcrypt hash.
    pub modern_hash: String,
}

/// Storage the login flow reads accounts and credentials from.
///
/// Implementations must make [`mark_migrated`](Self::mark_migrated) a
/// conditional update and keep the credential id stable across
/// [`upsert_modern_credential`](Self::upsert_modern_credential) calls, so
/// racing first logins converge on one state.
pub trait AccountStore: Send + Sync {
    /// Find an account by its already lowercased and trimmed email.
    fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>>;

    /// The imported legacy hash for an account, migrated or not.
    fn find_legacy_hash(&self, account_id: &str) -> StoreResult<Option<LegacyHashRecord>>;

    /// Store `modern_hash` as the account's credential, creating the
    /// credential (and its id) if this is the first one.
    fn upsert_modern_credential(
        &self,
        account_id: &str,
        modern_hash: &str,
    ) -> StoreResult<ModernCredential>;

    /// Flag the legacy hash as migrated. Returns `true` only for the call
    /// that performed the transition.
    fn mark_migrated(&self, account_id: &str) -> StoreResult<bool>;

    /// The account's modern credential, if it has one.
    fn find_modern_credential(&self, account_id: &str) -> StoreResult<Option<ModernCredential>>;
}

impl<S: AccountStore + ?Sized> AccountStore for Arc<S> {
    fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>> {
        (**self).find_by_email(normalized_email)
    }

    fn find_legacy_hash(&self, account_id: &str) -> StoreResult<Option<LegacyHashRecord>> {
        (**self).find_legacy_hash(account_id)
    }

    fn upsert_modern_credential(
        &self,
        account_id: &str,
        modern_hash: &str,
    ) -> StoreResult<ModernCredential> {
        (**self).upsert_modern_credential(account_id, modern_hash)
    }

    fn mark_migrated(&self, account_id: &str) -> StoreResult<bool> {
        (**self).mark_migrated(account_id)
    }

    fn find_modern_credential(&self, account_id: &str) -> StoreResult<Option<ModernCredential>> {
        (**self).find_modern_credential(account_id)
    }
}

/// Lowercase and trim an email the way every lookup expects it.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Fresh credential identifier.
pub(crate) fn new_credential_id() -> String {
    format!("authid_{}", uuid::Uuid::new_v4().simple())
}

/// Current epoch seconds.
pub(crate) fn epoch_secs() -> i64 {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    i64::try_from(secs).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod test {
    use super::{new_credential_id, normalize_email};

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Jane.Doe@Example.COM \n"), "jane.doe@example.com");
    }

    #[test]
    fn credential_ids_are_unique() {
        let a = new_credential_id();
        let b = new_credential_id();
        assert!(a.starts_with("authid_"));
        assert_eq!(a.len(), "authid_".len() + 32);
        assert_ne!(a, b);
    }
}
