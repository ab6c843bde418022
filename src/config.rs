//! Login configuration.
//!
//! ```toml
//! jwt_secret = "..."          # required, at least 32 bytes
//! token_ttl_secs = 604800     # 7 days
//! bcrypt_cost = 10
//! actor_type = "customer"
//! migration_notice = "Your account has been upgraded to our new system."
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::bcrypt_mcf::{MAX_COST, MIN_COST};
use crate::error::ConfigError;
use crate::verify::REHASH_COST;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Default token lifetime: 7 days (seconds).
const DEFAULT_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;

const DEFAULT_ACTOR_TYPE: &str = "customer";
const DEFAULT_MIGRATION_NOTICE: &str = "Your account has been upgraded to our new system.";

/// HMAC key for session tokens. Wiped on drop, hidden from `Debug`.
#[derive(Clone)]
pub struct SigningSecret(Zeroizing<String>);

impl SigningSecret {
    /// Accept a secret of at least [`MIN_SECRET_LEN`] bytes.
    pub fn new(secret: impl Into<String>) -> Result<Self, ConfigError> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                len: secret.len(),
                min: MIN_SECRET_LEN,
            });
        }
        Ok(Self(secret))
    }

    /// Raw key bytes.
    #[must_use]
    pub fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(***)")
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    jwt_secret: Option<String>,
    token_ttl_secs: Option<u64>,
    bcrypt_cost: Option<u32>,
    actor_type: Option<String>,
    migration_notice: Option<String>,
}

/// Settings for [`MigratingLoginFlow`](crate::MigratingLoginFlow).
#[derive(Debug, Clone)]
pub struct LoginConfig {
    secret: SigningSecret,
    token_ttl: Duration,
    bcrypt_cost: u32,
    actor_type: String,
    migration_notice: String,
}

impl LoginConfig {
    /// Defaults for everything except the secret, which has none.
    #[must_use]
    pub fn new(secret: SigningSecret) -> Self {
        Self {
            secret,
            token_ttl: Duration::from_secs(DEFAULT_TOKEN_TTL_SECS),
            bcrypt_cost: REHASH_COST,
            actor_type: DEFAULT_ACTOR_TYPE.to_owned(),
            migration_notice: DEFAULT_MIGRATION_NOTICE.to_owned(),
        }
    }

    /// Read a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML. Fails without a usable `jwt_secret`.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content)?;
        let secret = raw.jwt_secret.ok_or(ConfigError::MissingSecret)?;
        let mut config = Self::new(SigningSecret::new(secret)?);

        if let Some(ttl) = raw.token_ttl_secs {
            config.token_ttl = Duration::from_secs(ttl);
        }
        if let Some(cost) = raw.bcrypt_cost {
            config = config.with_bcrypt_cost(cost)?;
        }
        if let Some(actor_type) = raw.actor_type {
            config.actor_type = actor_type;
        }
        if let Some(notice) = raw.migration_notice {
            config.migration_notice = notice;
        }
        Ok(config)
    }

    /// Override the token lifetime.
    #[must_use]
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Override the bcrypt cost for migrated hashes.
    pub fn with_bcrypt_cost(mut self, cost: u32) -> Result<Self, ConfigError> {
        if !(MIN_COST..=MAX_COST).contains(&cost) {
            return Err(ConfigError::InvalidCost {
                cost,
                min: MIN_COST,
                max: MAX_COST,
            });
        }
        self.bcrypt_cost = cost;
        Ok(self)
    }

    /// Override the actor type written into token claims.
    #[must_use]
    pub fn with_actor_type(mut self, actor_type: impl Into<String>) -> Self {
        self.actor_type = actor_type.into();
        self
    }

    /// Signing secret for session tokens.
    #[must_use]
    pub fn secret(&self) -> &SigningSecret {
        &self.secret
    }

    /// Lifetime of issued tokens.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// bcrypt cost for hashes written during migration.
    #[must_use]
    pub fn bcrypt_cost(&self) -> u32 {
        self.bcrypt_cost
    }

    /// Actor type written into token claims.
    #[must_use]
    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    /// Message returned once, on the login that migrated the account.
    #[must_use]
    pub fn migration_notice(&self) -> &str {
        &self.migration_notice
    }
}

#[cfg(test)]
mod test {
    use super::{LoginConfig, SigningSecret};
    use crate::error::ConfigError;
    use std::io::Write;
    use std::time::Duration;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn missing_secret_fails() {
        assert!(matches!(
            LoginConfig::from_toml_str("bcrypt_cost = 10"),
            Err(ConfigError::MissingSecret)
        ));
        assert!(matches!(
            LoginConfig::from_toml_str("jwt_secret = \"\""),
            Err(ConfigError::MissingSecret)
        ));
    }

    #[test]
    fn short_secret_fails() {
        assert!(matches!(
            SigningSecret::new("supersecret"),
            Err(ConfigError::WeakSecret { len: 11, min: 32 })
        ));
    }

    #[test]
    fn defaults_apply() {
        let config = LoginConfig::from_toml_str(&format!("jwt_secret = \"{SECRET}\"")).unwrap();
        assert_eq!(config.token_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.bcrypt_cost(), 10);
        assert_eq!(config.actor_type(), "customer");
        assert!(config.migration_notice().contains("upgraded"));
        assert_eq!(config.secret().expose(), SECRET.as_bytes());
    }

    #[test]
    fn overrides_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "jwt_secret = \"{SECRET}\"\ntoken_ttl_secs = 60\nbcrypt_cost = 4\nactor_type = \"user\""
        )
        .unwrap();

        let config = LoginConfig::load(file.path()).unwrap();
        assert_eq!(config.token_ttl(), Duration::from_secs(60));
        assert_eq!(config.bcrypt_cost(), 4);
        assert_eq!(config.actor_type(), "user");
    }

    #[test]
    fn bad_cost_and_unknown_keys_fail() {
        let toml = format!("jwt_secret = \"{SECRET}\"\nbcrypt_cost = 40");
        assert!(matches!(
            LoginConfig::from_toml_str(&toml),
            Err(ConfigError::InvalidCost { cost: 40, .. })
        ));

        let toml = format!("jwt_secret = \"{SECRET}\"\njwt_secert = \"typo\"");
        assert!(matches!(
            LoginConfig::from_toml_str(&toml),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn builders_override_defaults() {
        let config = LoginConfig::new(SigningSecret::new(SECRET).unwrap())
            .with_token_ttl(Duration::from_secs(900))
            .with_actor_type("admin");
        assert_eq!(config.token_ttl(), Duration::from_secs(900));
        assert_eq!(config.actor_type(), "admin");
        assert!(matches!(
            config.with_bcrypt_cost(3),
            Err(ConfigError::InvalidCost { cost: 3, min: 4, max: 31 })
        ));
    }

    #[test]
    fn debug_hides_secret() {
        let config = LoginConfig::new(SigningSecret::new(SECRET).unwrap());
        assert!(!format!("{config:?}").contains(SECRET));
    }
}
