//! Login that migrates legacy password hashes on first use.
//!
//! Per attempt:
//!
//! 1. reject empty input before touching the store
//! 2. look the account up by normalized email
//! 3. if an unmigrated legacy hash exists and verifies: rehash, upsert the
//!    modern credential and flag the legacy record migrated
//! 4. otherwise verify against the modern credential
//! 5. sign a token for the account and credential
//!
//! Every failure between 2 and 4 that is the client's fault collapses into
//! [`LoginError::InvalidCredentials`].

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::LoginConfig;
use crate::error::{LoginError, StoreError};
use crate::store::{normalize_email, Account, AccountStore, ModernCredential};
use crate::token::{Claims, TokenSigner};
use crate::verify::{rehash_with_cost, verify, verify_modern};

/// Credentials submitted by the client. Missing fields deserialize empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    /// Account email, any case.
    pub email: String,
    /// Plaintext password.
    pub password: String,
}

impl LoginRequest {
    /// Build a request.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Public view of the authenticated account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    /// Account identifier.
    pub id: String,
    /// Email as stored.
    pub email: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            first_name: account.first_name,
            last_name: account.last_name,
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Signed session token.
    pub token: String,
    /// The account that logged in.
    pub account: AccountSummary,
    /// Present only on the login that migrated the account's password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_notice: Option<String>,
}

/// Which check accepted the password.
enum Verified {
    /// The legacy hash matched and was replaced. `transitioned` is false when
    /// a concurrent attempt flagged the record first.
    Legacy {
        credential: ModernCredential,
        transitioned: bool,
    },
    Modern {
        credential: ModernCredential,
    },
}

/// Login orchestration over an [`AccountStore`] and a [`TokenSigner`].
pub struct MigratingLoginFlow<S, T> {
    store: S,
    signer: T,
    config: LoginConfig,
}

impl<S: AccountStore, T: TokenSigner> MigratingLoginFlow<S, T> {
    /// Wire the flow to its collaborators.
    pub fn new(store: S, signer: T, config: LoginConfig) -> Self {
        Self {
            store,
            signer,
            config,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Authenticate and issue a token, migrating a legacy hash if needed.
    pub fn login(&self, request: &LoginRequest) -> Result<LoginResponse, LoginError> {
        let email = normalize_email(&request.email);
        if email.is_empty() || request.password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let Some(account) = self
            .store
            .find_by_email(&email)
            .map_err(|e| persistence("account lookup", e))?
        else {
            warn!("login rejected: unknown email");
            return Err(LoginError::InvalidCredentials);
        };

        let verified = match self.try_legacy(&account, &request.password)? {
            Some(verified) => verified,
            None => self.try_modern(&account, &request.password)?,
        };

        let (credential, migration_notice) = match verified {
            Verified::Legacy {
                credential,
                transitioned,
            } => {
                let notice = transitioned.then(|| self.config.migration_notice().to_owned());
                (credential, notice)
            }
            Verified::Modern { credential } => (credential, None),
        };

        let claims = Claims {
            actor_id: account.id.clone(),
            actor_type: self.config.actor_type().to_owned(),
            auth_identity_id: credential.id,
        };
        let token = self
            .signer
            .sign(&claims, self.config.secret(), self.config.token_ttl())
            .map_err(|e| {
                error!(account_id = %account.id, error = %e, "token signing failed");
                LoginError::Token(e)
            })?;

        debug!(account_id = %account.id, "login succeeded");
        Ok(LoginResponse {
            token,
            account: account.into(),
            migration_notice,
        })
    }

    /// Legacy path. `Ok(None)` means fall through to the modern check.
    fn try_legacy(&self, account: &Account, password: &str) -> Result<Option<Verified>, LoginError> {
        let record = self
            .store
            .find_legacy_hash(&account.id)
            .map_err(|e| persistence("legacy hash lookup", e))?;

        let Some(record) = record.filter(|r| !r.migrated) else {
            return Ok(None);
        };
        if !verify(password, &record.legacy_hash) {
            debug!(account_id = %account.id, "legacy hash did not verify");
            return Ok(None);
        }

        let modern_hash = rehash_with_cost(password, self.config.bcrypt_cost()).map_err(|e| {
            error!(account_id = %account.id, error = %e, "rehash failed");
            LoginError::Hashing(e)
        })?;
        let credential = self
            .store
            .upsert_modern_credential(&account.id, &modern_hash)
            .map_err(|e| persistence("modern credential upsert", e))?;
        let transitioned = self
            .store
            .mark_migrated(&account.id)
            .map_err(|e| persistence("mark migrated", e))?;

        if transitioned {
            info!(account_id = %account.id, credential_id = %credential.id, "migrated legacy password hash");
        } else {
            debug!(account_id = %account.id, "legacy hash already migrated by a concurrent login");
        }

        Ok(Some(Verified::Legacy {
            credential,
            transitioned,
        }))
    }

    fn try_modern(&self, account: &Account, password: &str) -> Result<Verified, LoginError> {
        let credential = self
            .store
            .find_modern_credential(&account.id)
            .map_err(|e| persistence("modern credential lookup", e))?;

        match credential {
            Some(credential) if verify_modern(password, &credential.modern_hash) => {
                Ok(Verified::Modern { credential })
            }
            _ => {
                warn!(account_id = %account.id, "login rejected: password mismatch");
                Err(LoginError::InvalidCredentials)
            }
        }
    }
}

fn persistence(operation: &'static str, e: StoreError) -> LoginError {
    error!(operation, error = %e, "account store failure during login");
    LoginError::Persistence(e)
}
