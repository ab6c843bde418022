//! Stored-hash format detection.

use std::fmt;

/// The scheme a stored hash string was produced with, derived from its prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HashFormat {
    /// Portable phpass (`$P$`, `$H$`).
    Phpass,
    /// WordPress 6.8+ bcrypt with the vendor prefix (`$wp$2y$`, `$wp$2a$`).
    WordPressBcrypt,
    /// Plain bcrypt (`$2y$`, `$2a$`).
    StandardBcrypt,
    /// Anything else. Never verifies.
    Unrecognized,
}

impl HashFormat {
    /// Classify an already unescaped hash. Prefixes are checked in order, so
    /// `$wp$2y$` is never mistaken for anything shorter.
    #[must_use]
    pub fn detect(hash: &str) -> Self {
        if hash.starts_with("$P$") || hash.starts_with("$H$") {
            Self::Phpass
        } else if hash.starts_with("$wp$2y$") || hash.starts_with("$wp$2a$") {
            Self::WordPressBcrypt
        } else if hash.starts_with("$2y$") || hash.starts_with("$2a$") {
            Self::StandardBcrypt
        } else {
            Self::Unrecognized
        }
    }
}

impl fmt::Display for HashFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Phpass => "phpass",
            Self::WordPressBcrypt => "wordpress-bcrypt",
            Self::StandardBcrypt => "bcrypt",
            Self::Unrecognized => "unrecognized",
        })
    }
}

/// Undo quoting that SQL dumps and JSON exports leave in hash columns.
pub(crate) fn unescape(hash: &str) -> String {
    hash.replace("\\'", "'")
        .replace("\\\"", "\"")
        .replace("\\\\", "\\")
}

/// Remove every remaining backslash. Neither phpass nor bcrypt use one.
pub(crate) fn strip_backslashes(hash: &str) -> String {
    hash.replace('\\', "")
}
