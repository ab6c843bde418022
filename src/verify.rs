//! Password verification across every hash format the legacy site wrote,
//! and the modern hash migrated accounts move to.

use password_hash::McfHasher;
use tracing::debug;

use crate::bcrypt_mcf::Bcrypt;
use crate::format::{strip_backslashes, unescape, HashFormat};
use crate::phpass::Phpass;

/// bcrypt cost used for hashes written during migration.
pub const REHASH_COST: u32 = 10;

/// Shortest string that can hold a phpass prefix, count and salt.
const MIN_PHPASS_LEN: usize = 12;

/// Check `password` against a stored legacy or bcrypt hash.
///
/// Malformed, truncated or unknown hashes verify as `false`; nothing here
/// returns an error or panics on bad input.
#[must_use]
pub fn verify(password: &str, stored_hash: &str) -> bool {
    if password.is_empty() || stored_hash.is_empty() {
        return false;
    }

    let hash = unescape(stored_hash);
    let format = HashFormat::detect(&hash);
    debug!(%format, "verifying stored hash");

    let verified = match format {
        HashFormat::Phpass => verify_phpass(password, &hash),
        HashFormat::WordPressBcrypt => verify_wordpress_bcrypt(password, &hash),
        HashFormat::StandardBcrypt => verify_bcrypt(password, &hash),
        HashFormat::Unrecognized => false,
    };

    if !verified {
        debug!(%format, "stored hash did not verify");
    }
    verified
}

/// Check `password` against a hash written by this system. Accepts every
/// bcrypt revision and nothing else.
#[must_use]
pub fn verify_modern(password: &str, modern_hash: &str) -> bool {
    if password.is_empty() || modern_hash.is_empty() {
        return false;
    }
    bcrypt::verify(password, modern_hash).unwrap_or(false)
}

/// Hash `password` for storage at [`REHASH_COST`].
pub fn rehash(password: &str) -> Result<String, bcrypt::BcryptError> {
    rehash_with_cost(password, REHASH_COST)
}

/// Hash `password` for storage at the given bcrypt cost.
///
/// The output uses the `$2a$` revision so that [`verify`] accepts it too.
pub fn rehash_with_cost(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    let parts = bcrypt::hash_with_result(password, cost)?;
    Ok(parts.format_for_version(bcrypt::Version::TwoA))
}

/// Whether the hash came from the legacy site and should be migrated:
/// `$P$`, `$H$`, or anything under the `$wp$` prefix, after unescaping.
///
/// This is a prefix check only. A `$wp$2b$` hash counts as legacy here even
/// though [`verify`] does not recognise it.
#[must_use]
pub fn is_legacy_format(hash: &str) -> bool {
    let hash = unescape(hash);
    hash.starts_with("$P$") || hash.starts_with("$H$") || hash.starts_with("$wp$")
}

/// Rewrite a recognised hash as a PHC string, so it can be stored next to
/// Argon2 and verified through a list of [`password_hash::PasswordVerifier`]s.
pub fn upgrade_to_phc(stored_hash: &str) -> password_hash::Result<String> {
    let hash = unescape(stored_hash);
    let upgraded = match HashFormat::detect(&hash) {
        HashFormat::Phpass => {
            let hash = strip_backslashes(&hash);
            Phpass.upgrade_mcf_hash(&hash)?.to_string()
        }
        HashFormat::WordPressBcrypt => {
            let hash = normalize_wordpress_bcrypt(&strip_backslashes(&hash));
            Bcrypt.upgrade_mcf_hash(&hash)?.to_string()
        }
        HashFormat::StandardBcrypt => Bcrypt.upgrade_mcf_hash(&hash)?.to_string(),
        HashFormat::Unrecognized => return Err(password_hash::Error::Algorithm),
    };

    Ok(upgraded)
}

fn verify_phpass(password: &str, hash: &str) -> bool {
    let hash = strip_backslashes(hash);
    if hash.len() < MIN_PHPASS_LEN {
        return false;
    }
    Phpass.verify_mcf_hash(password.as_bytes(), &hash).is_ok()
}

fn verify_wordpress_bcrypt(password: &str, hash: &str) -> bool {
    let hash = normalize_wordpress_bcrypt(&strip_backslashes(hash));
    verify_bcrypt(password, &hash)
}

fn verify_bcrypt(password: &str, hash: &str) -> bool {
    Bcrypt.verify_mcf_hash(password.as_bytes(), hash).is_ok()
}

/// `$wp$2y$...` and `$wp$2a$...` become `$2a$...`.
fn normalize_wordpress_bcrypt(hash: &str) -> String {
    ["$wp$2y$", "$wp$2a$"]
        .iter()
        .find_map(|prefix| hash.strip_prefix(prefix))
        .map_or_else(|| hash.to_owned(), |rest| format!("$2a${rest}"))
}
