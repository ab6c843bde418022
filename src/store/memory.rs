//! In-process account store.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::{
    new_credential_id, normalize_email, Account, AccountStore, LegacyHashRecord, ModernCredential,
};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    /// normalized email -> account id
    emails: HashMap<String, String>,
    legacy: HashMap<String, LegacyHashRecord>,
    modern: HashMap<String, ModernCredential>,
}

/// [`AccountStore`] held in memory behind a single lock.
#[derive(Default)]
pub struct MemoryAccountStore {
    tables: Mutex<Tables>,
}

impl MemoryAccountStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account.
    pub fn insert_account(&self, account: Account) {
        let mut tables = self.tables.lock();
        if let Some(previous) = tables.accounts.get(&account.id) {
            let stale = normalize_email(&previous.email);
            tables.emails.remove(&stale);
        }
        tables
            .emails
            .insert(normalize_email(&account.email), account.id.clone());
        tables.accounts.insert(account.id.clone(), account);
    }

    /// Record a hash imported from the legacy site, not yet migrated.
    pub fn import_legacy_hash(&self, account_id: &str, legacy_hash: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if !tables.accounts.contains_key(account_id) {
            return Err(StoreError::UnknownAccount(account_id.to_owned()));
        }
        tables.legacy.insert(
            account_id.to_owned(),
            LegacyHashRecord {
                account_id: account_id.to_owned(),
                legacy_hash: legacy_hash.to_owned(),
                migrated: false,
            },
        );
        Ok(())
    }

    /// Drop the legacy record for an account, returning it.
    pub fn remove_legacy_hash(&self, account_id: &str) -> Option<LegacyHashRecord> {
        self.tables.lock().legacy.remove(account_id)
    }

    /// Number of stored modern credentials.
    #[must_use]
    pub fn modern_credential_count(&self) -> usize {
        self.tables.lock().modern.len()
    }
}

impl AccountStore for MemoryAccountStore {
    fn find_by_email(&self, normalized_email: &str) -> StoreResult<Option<Account>> {
        let tables = self.tables.lock();
        Ok(tables
            .emails
            .get(normalized_email)
            .and_then(|id| tables.accounts.get(id))
            .cloned())
    }

    fn find_legacy_hash(&self, account_id: &str) -> StoreResult<Option<LegacyHashRecord>> {
        Ok(self.tables.lock().legacy.get(account_id).cloned())
    }

    fn upsert_modern_credential(
        &self,
        account_id: &str,
        modern_hash: &str,
    ) -> StoreResult<ModernCredential> {
        let mut tables = self.tables.lock();
        if !tables.accounts.contains_key(account_id) {
            return Err(StoreError::UnknownAccount(account_id.to_owned()));
        }

        let credential = tables
            .modern
            .entry(account_id.to_owned())
            .or_insert_with(|| ModernCredential {
                id: new_credential_id(),
                account_id: account_id.to_owned(),
                modern_hash: String::new(),
            });
        modern_hash.clone_into(&mut credential.modern_hash);
        Ok(credential.clone())
    }

    fn mark_migrated(&self, account_id: &str) -> StoreResult<bool> {
        let mut tables = self.tables.lock();
        Ok(match tables.legacy.get_mut(account_id) {
            Some(record) if !record.migrated => {
                record.migrated = true;
                true
            }
            _ => false,
        })
    }

    fn find_modern_credential(&self, account_id: &str) -> StoreResult<Option<ModernCredential>> {
        Ok(self.tables.lock().modern.get(account_id).cloned())
    }
}

#[cfg(test)]
mod test {
    use super::MemoryAccountStore;
    use crate::store::{Account, AccountStore};

    fn store_with_account() -> MemoryAccountStore {
        let store = MemoryAccountStore::new();
        store.insert_account(Account {
            id: "cus_1".into(),
            email: "Jane@Example.com".into(),
            first_name: Some("Jane".into()),
            last_name: None,
        });
        store
    }

    #[test]
    fn lookup_by_normalized_email() {
        let store = store_with_account();
        assert_eq!(
            store.find_by_email("jane@example.com").unwrap().unwrap().id,
            "cus_1"
        );
        assert!(store.find_by_email("john@example.com").unwrap().is_none());
    }

    #[test]
    fn mark_migrated_transitions_once() {
        let store = store_with_account();
        store.import_legacy_hash("cus_1", "$P$B...").unwrap();

        assert!(store.mark_migrated("cus_1").unwrap());
        assert!(!store.mark_migrated("cus_1").unwrap());
        assert!(store.find_legacy_hash("cus_1").unwrap().unwrap().migrated);
        assert!(!store.mark_migrated("cus_2").unwrap());
    }

    #[test]
    fn upsert_keeps_credential_id() {
        let store = store_with_account();
        let first = store.upsert_modern_credential("cus_1", "$2a$04$one").unwrap();
        let second = store.upsert_modern_credential("cus_1", "$2a$04$two").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(
            store.find_modern_credential("cus_1").unwrap().unwrap().modern_hash,
            "$2a$04$two"
        );
        assert_eq!(store.modern_credential_count(), 1);
    }

    #[test]
    fn writes_require_an_account() {
        let store = MemoryAccountStore::new();
        assert!(store.import_legacy_hash("ghost", "$P$B").is_err());
        assert!(store.upsert_modern_credential("ghost", "$2a$").is_err());
    }
}
