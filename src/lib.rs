#![doc = include_str!("../README.md")]
#![forbid(missing_docs, rust_2018_idioms)]
#![warn(clippy::all, clippy::pedantic)]

mod bcrypt_mcf;
pub mod config;
pub mod error;
mod format;
mod login;
pub mod phpass;
pub mod store;
pub mod token;
mod verify;

pub use bcrypt_mcf::{Bcrypt, Params as BcryptParams};
pub use config::{LoginConfig, SigningSecret};
pub use error::{ConfigError, LoginError, StoreError, TokenError};
pub use format::HashFormat;
pub use login::{AccountSummary, LoginRequest, LoginResponse, MigratingLoginFlow};
pub use phpass::Phpass;
pub use store::{
    Account, AccountStore, LegacyHashRecord, MemoryAccountStore, ModernCredential,
    SqliteAccountStore,
};
pub use token::{Claims, Hs256Signer, TokenSigner};
pub use verify::{
    is_legacy_format, rehash, rehash_with_cost, upgrade_to_phc, verify, verify_modern, REHASH_COST,
};
