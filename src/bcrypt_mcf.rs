//! bcrypt exposed through the `password-hash` traits.
//!
//! [`Bcrypt`] hashes into PHC strings (`$bcrypt$r=10$<salt>$<hash>`) and reads
//! the classic modular crypt format for every revision WordPress and PHP emit
//! (`$2a$`, `$2b$`, `$2x$`, `$2y$`).

use password_hash::{
    errors::InvalidValue, Encoding, Error, Ident, McfHasher, Output, ParamsString, PasswordHash,
    PasswordHasher, Salt,
};
use zeroize::Zeroizing;

const ALGORITHM: Ident<'static> = Ident::new_unwrap("bcrypt");

/// Revisions accepted in the MCF prefix. They share the same key schedule for
/// passwords that fit the 72 byte limit.
const REVISIONS: [&str; 4] = ["2a", "2b", "2x", "2y"];

/// Length of the bcrypt-alphabet salt inside an MCF string.
const MCF_SALT_LEN: usize = 22;

/// Lowest cost accepted by the bcrypt key schedule.
pub const MIN_COST: u32 = 4;

/// Highest cost accepted by the bcrypt key schedule.
pub const MAX_COST: u32 = 31;

/// bcrypt parameters
#[derive(Clone, Copy, Debug)]
pub struct Params {
    cost: u32,
}

impl Params {
    /// Build parameters for the given cost, rejecting values bcrypt can't run.
    pub fn new(cost: u32) -> password_hash::Result<Self> {
        if cost < MIN_COST {
            return Err(Error::ParamValueInvalid(InvalidValue::TooShort));
        }
        if cost > MAX_COST {
            return Err(Error::ParamValueInvalid(InvalidValue::TooLong));
        }
        Ok(Self { cost })
    }

    /// The cost factor (log2 of the key expansion rounds).
    #[must_use]
    pub fn cost(self) -> u32 {
        self.cost
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl<'a> TryFrom<&'a PasswordHash<'a>> for Params {
    type Error = Error;

    fn try_from(value: &'a PasswordHash<'a>) -> Result<Self, Self::Error> {
        let rounds = value
            .params
            .get_decimal("r")
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;

        Self::new(rounds)
    }
}

impl TryInto<ParamsString> for Params {
    type Error = Error;

    fn try_into(self) -> Result<ParamsString, Self::Error> {
        let mut string = ParamsString::new();
        string.add_decimal("r", self.cost)?;
        Ok(string)
    }
}

/// Longest password prefix bcrypt reads, NUL terminator included.
const MAX_INPUT_LEN: usize = 72;

/// Raw digest bytes kept in the encoded hash. bcrypt drops the last one.
const DIGEST_LEN: usize = 23;

/// bcrypt hasher
pub struct Bcrypt;

impl PasswordHasher for Bcrypt {
    type Params = Params;

    fn hash_password_customized<'a>(
        &self,
        password: &[u8],
        algorithm: Option<Ident<'a>>,
        _version: Option<password_hash::Decimal>,
        params: Self::Params,
        salt: impl Into<Salt<'a>>,
    ) -> password_hash::Result<PasswordHash<'a>> {
        if algorithm.is_some_and(|ident| ident != ALGORITHM) {
            return Err(Error::Algorithm);
        }

        let salt = salt.into();
        let raw = bcrypt::bcrypt(params.cost, decode_salt(&salt)?, &key_material(password));

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(salt),
            hash: Some(Output::new(&raw[..DIGEST_LEN])?),
        })
    }
}

/// Salts lifted out of MCF strings keep the bcrypt alphabet, freshly
/// generated PHC salts use standard B64.
fn decode_salt(salt: &Salt<'_>) -> password_hash::Result<[u8; 16]> {
    let mut bytes = [0; 16];
    if Encoding::Bcrypt.decode(salt.as_str(), &mut bytes).is_err() {
        salt.decode_b64(&mut bytes)?;
    }
    Ok(bytes)
}

/// NUL-terminated password cut to what bcrypt reads, like PHP's crypt().
fn key_material(password: &[u8]) -> Zeroizing<Vec<u8>> {
    let mut input = Zeroizing::new(Vec::with_capacity(password.len() + 1));
    input.extend_from_slice(password);
    input.push(0);
    input.truncate(MAX_INPUT_LEN);
    input
}

impl McfHasher for Bcrypt {
    fn upgrade_mcf_hash<'a>(&self, hash: &'a str) -> password_hash::Result<PasswordHash<'a>> {
        let malformed = Error::ParamValueInvalid(InvalidValue::Malformed);

        let mut mcf_split = hash
            .strip_prefix('$')
            .ok_or(Error::PhcStringField)?
            .splitn(3, '$');

        let revision = mcf_split.next().ok_or(Error::PhcStringField)?;
        if !REVISIONS.contains(&revision) {
            return Err(Error::Algorithm);
        }

        let cost = mcf_split
            .next()
            .and_then(|cost_str| cost_str.parse::<u32>().ok())
            .ok_or(malformed)?;
        let params = Params::new(cost)?;

        let mcf_content = mcf_split.next().ok_or(malformed)?;
        let (b64_salt, b64_hash) = match (
            mcf_content.get(..MCF_SALT_LEN),
            mcf_content.get(MCF_SALT_LEN..),
        ) {
            (Some(salt), Some(hash)) if !hash.is_empty() => (salt, hash),
            _ => return Err(Error::SaltInvalid(InvalidValue::TooShort)),
        };

        let mut raw_hash = [0; DIGEST_LEN];
        Encoding::Bcrypt.decode(b64_hash, &mut raw_hash)?;

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(Salt::from_b64(b64_salt)?),
            hash: Some(Output::new(&raw_hash)?),
        })
    }
}

#[cfg(test)]
mod test {
    use crate::Bcrypt;
    use password_hash::{McfHasher, PasswordHasher, PasswordVerifier, SaltString};

    const NODE_MCF: &str = "$2a$04$n4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi";

    #[test]
    fn own_hash_round_trips() {
        let salt = SaltString::generate(rand::thread_rng());
        let params = super::Params::new(4).unwrap();
        let own = Bcrypt
            .hash_password_customized("test".as_bytes(), None, None, params, &salt)
            .unwrap();
        own.verify_password(&[&Bcrypt], "test").unwrap();
        assert!(own.verify_password(&[&Bcrypt], "tset").is_err());
    }

    #[test]
    fn phc_string_from_node_verifies() {
        let hash = "$bcrypt$v=98$r=10$tAe1bhm5zoo0Sx7ZfrCd7w$0T4Cf8htpt/8FbjK+cErdaTh8T6ClYQ";
        let passwd_hash = hash.try_into().unwrap();
        Bcrypt.verify_password(b"password", &passwd_hash).unwrap();
    }

    #[test]
    fn python_2b_string_verifies() {
        let hash = "$2b$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie";
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), hash)
            .unwrap();
    }

    #[test]
    fn node_2a_string_verifies() {
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), NODE_MCF)
            .unwrap();
    }

    #[test]
    fn php_2y_revision_verifies() {
        let hash = NODE_MCF.replacen("$2a$", "$2y$", 1);
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), &hash)
            .unwrap();
        assert!(Bcrypt
            .verify_mcf_hash("correct horse".as_bytes(), &hash)
            .is_err());
    }

    #[test]
    fn malformed_mcf_is_an_error() {
        for hash in [
            "",
            "$2a$",
            "$2a$04$",
            "$2a$04$n4Uy0eSnMfvnESYL",
            "$2a$04$n4Uy0eSnMfvnESYL.bLwuu",
            "$2a$99$n4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi",
            "$2a$xx$n4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi",
            "$2q$04$n4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi",
            "$2a$04$ñ4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi",
        ] {
            assert!(
                Bcrypt.verify_mcf_hash(b"password", hash).is_err(),
                "{hash:?} should not verify"
            );
        }
    }

    #[test]
    fn cost_bounds() {
        assert!(super::Params::new(3).is_err());
        assert!(super::Params::new(32).is_err());
        assert_eq!(super::Params::new(10).unwrap().cost(), 10);
        assert_eq!(super::Params::default().cost(), bcrypt::DEFAULT_COST);
    }

    #[test]
    fn mcf_cost_becomes_rounds_param() {
        let phc = Bcrypt.upgrade_mcf_hash(NODE_MCF).unwrap();
        assert_eq!(super::Params::try_from(&phc).unwrap().cost(), 4);
        assert!(phc.to_string().starts_with("$bcrypt$r=4$"));
    }
}
