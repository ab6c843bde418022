//! Error types.
//!
//! Only [`LoginError::client_message`] is meant to reach an end user. The
//! `Display` output of every error here carries detail for server logs.

use thiserror::Error;

/// Result type for account store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures raised by an [`AccountStore`](crate::AccountStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A write referenced an account that does not exist.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// The backing store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failures while signing or checking a session token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// Claims could not be serialized or parsed.
    #[error("token serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The signing secret was rejected by the MAC.
    #[error("invalid signing key")]
    InvalidKey,

    /// The token is not three base64url segments.
    #[error("malformed token")]
    Malformed,

    /// The token declares an algorithm other than HS256.
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The signature does not match the payload.
    #[error("token signature mismatch")]
    BadSignature,

    /// The token is past its `exp` claim.
    #[error("token expired")]
    Expired,
}

/// Failures while loading [`LoginConfig`](crate::LoginConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No signing secret was configured.
    #[error("jwt_secret is required")]
    MissingSecret,

    /// The signing secret is too short to be safe for HMAC-SHA256.
    #[error("jwt_secret must be at least {min} bytes, got {len}")]
    WeakSecret {
        /// Length that was supplied.
        len: usize,
        /// Minimum accepted length.
        min: usize,
    },

    /// The bcrypt cost is outside what bcrypt accepts.
    #[error("bcrypt_cost must be between {min} and {max}, got {cost}")]
    InvalidCost {
        /// Cost that was supplied.
        cost: u32,
        /// Lowest accepted cost.
        min: u32,
        /// Highest accepted cost.
        max: u32,
    },
}

/// Why a login attempt did not produce a token.
#[derive(Debug, Error)]
pub enum LoginError {
    /// Email or password was missing. Nothing was looked up.
    #[error("email and password are required")]
    MissingCredentials,

    /// No such account, wrong password, or an unusable stored hash.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The account store failed.
    #[error("authentication failed: {0}")]
    Persistence(#[from] StoreError),

    /// The token could not be issued.
    #[error("authentication failed: {0}")]
    Token(#[from] TokenError),

    /// The replacement hash could not be computed.
    #[error("authentication failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),
}

impl LoginError {
    /// HTTP-equivalent status for the failure.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingCredentials => 400,
            Self::InvalidCredentials => 401,
            Self::Persistence(_) | Self::Token(_) | Self::Hashing(_) => 500,
        }
    }

    /// Message safe to return to the client. Never hints at whether the
    /// account exists or which check failed.
    #[must_use]
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "Email and password are required",
            Self::InvalidCredentials => "Invalid email or password",
            Self::Persistence(_) | Self::Token(_) | Self::Hashing(_) => "Authentication failed",
        }
    }
}
