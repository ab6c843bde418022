//! Portable phpass, the salted and iterated MD5 scheme WordPress used before
//! 6.8 (`$P$` hashes, `$H$` on some phpBB-derived installs).
//!
//! A portable hash is `$P$` + one count symbol + 8 salt symbols + 22 digest
//! symbols, all drawn from [`ITOA64`]. The digest is
//! `md5(md5(salt ++ password) ++ password ...)` repeated `2^count` times and
//! packed with phpass' own little-endian base64 variant.

use md5::{Digest, Md5};
use password_hash::{
    errors::InvalidValue, Error, Ident, McfHasher, ParamsString, PasswordHash, PasswordHasher,
    Salt,
};
use zeroize::Zeroizing;

const ALGORITHM: Ident<'static> = Ident::new_unwrap("phpass");

/// The phpass symbol table. This is not RFC 4648 order.
pub const ITOA64: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Lowest iteration exponent phpass accepts.
pub const MIN_COUNT_LOG2: u32 = 7;

/// Highest iteration exponent phpass accepts.
pub const MAX_COUNT_LOG2: u32 = 30;

/// Exponent WordPress writes into new portable hashes (the `B` in `$P$B`).
pub const DEFAULT_COUNT_LOG2: u32 = 13;

/// Number of salt symbols following the count symbol.
pub const SALT_LEN: usize = 8;

const DIGEST_LEN: usize = 16;
const ENCODED_DIGEST_LEN: usize = 22;

/// Prefix phpass writes; `$H$` is accepted as an alias on input.
const PORTABLE_PREFIX: &str = "$P$";
const PHPBB_PREFIX: &str = "$H$";

/// phpass parameters
#[derive(Clone, Copy, Debug)]
pub struct Params {
    count_log2: u32,
}

impl Params {
    /// Parameters for `2^count_log2` MD5 rounds.
    pub fn new(count_log2: u32) -> password_hash::Result<Self> {
        if count_log2 < MIN_COUNT_LOG2 {
            return Err(Error::ParamValueInvalid(InvalidValue::TooShort));
        }
        if count_log2 > MAX_COUNT_LOG2 {
            return Err(Error::ParamValueInvalid(InvalidValue::TooLong));
        }
        Ok(Self { count_log2 })
    }

    /// The iteration exponent.
    #[must_use]
    pub fn count_log2(self) -> u32 {
        self.count_log2
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            count_log2: DEFAULT_COUNT_LOG2,
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
        string.add_decimal("r", self.count_log2)?;
        Ok(string)
    }
}

/// Portable phpass hasher
pub struct Phpass;

impl Phpass {
    /// Produce a `$P$` string for `password` with an explicit salt.
    ///
    /// The salt must be exactly [`SALT_LEN`] symbols from [`ITOA64`].
    pub fn hash_mcf(
        &self,
        password: &[u8],
        count_log2: u32,
        salt: &str,
    ) -> password_hash::Result<String> {
        let params = Params::new(count_log2)?;
        let hash = self.hash_password_customized(
            password,
            None,
            None,
            params,
            Salt::from_b64(salt)?,
        )?;
        let digest = hash.hash.ok_or(Error::Crypto)?;

        let mut mcf =
            String::with_capacity(PORTABLE_PREFIX.len() + 1 + SALT_LEN + ENCODED_DIGEST_LEN);
        mcf.push_str(PORTABLE_PREFIX);
        mcf.push(char::from(ITOA64[count_log2 as usize]));
        mcf.push_str(salt);
        mcf.push_str(&encode64(digest.as_bytes()));
        Ok(mcf)
    }
}

impl PasswordHasher for Phpass {
    type Params = Params;

    fn hash_password_customized<'a>(
        &self,
        password: &[u8],
        algorithm: Option<Ident<'a>>,
        _version: Option<password_hash::Decimal>,
        params: Self::Params,
        salt: impl Into<Salt<'a>>,
    ) -> password_hash::Result<PasswordHash<'a>> {
        if let Some(algorithm) = algorithm {
            if algorithm != ALGORITHM {
                return Err(Error::Algorithm);
            }
        }

        let salt = salt.into();
        let salt_str = salt.as_str();
        if salt_str.len() != SALT_LEN {
            return Err(Error::SaltInvalid(InvalidValue::Malformed));
        }
        if let Some(c) = salt_str.chars().find(|c| symbol_index(*c).is_none()) {
            return Err(Error::SaltInvalid(InvalidValue::InvalidChar(c)));
        }

        let digest = stretch(password, salt_str.as_bytes(), 1u64 << params.count_log2);

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(salt),
            hash: Some(digest.as_slice().try_into()?),
        })
    }
}

impl McfHasher for Phpass {
    fn upgrade_mcf_hash<'a>(&self, hash: &'a str) -> password_hash::Result<PasswordHash<'a>> {
        let body = hash
            .strip_prefix(PORTABLE_PREFIX)
            .or_else(|| hash.strip_prefix(PHPBB_PREFIX))
            .ok_or(Error::Algorithm)?;

        let count_log2 = body
            .chars()
            .next()
            .and_then(symbol_index)
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;
        let params = Params::new(count_log2)?;

        let salt = body
            .get(1..=SALT_LEN)
            .ok_or(Error::SaltInvalid(InvalidValue::TooShort))?;
        let encoded = body.get(SALT_LEN + 1..).ok_or(Error::PhcStringField)?;
        let digest = decode_digest(encoded).ok_or(Error::PhcStringField)?;

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(Salt::from_b64(salt)?),
            hash: Some(digest.as_ref().try_into()?),
        })
    }
}

fn stretch(password: &[u8], salt: &[u8], rounds: u64) -> Zeroizing<[u8; DIGEST_LEN]> {
    let mut digest = Zeroizing::new([0u8; DIGEST_LEN]);
    digest.copy_from_slice(&Md5::new().chain_update(salt).chain_update(password).finalize());

    for _ in 0..rounds {
        let next = Md5::new()
            .chain_update(digest.as_slice())
            .chain_update(password)
            .finalize();
        digest.copy_from_slice(&next);
    }

    digest
}

fn symbol_index(c: char) -> Option<u32> {
    let byte = u8::try_from(c).ok()?;
    ITOA64
        .iter()
        .position(|&s| s == byte)
        .and_then(|i| u32::try_from(i).ok())
}

/// phpass' encode64: every 3 input bytes become 4 symbols, low bits first.
/// A trailing partial group emits one symbol more than it has bytes.
pub(crate) fn encode64(input: &[u8]) -> String {
    let symbol = |value: u32| char::from(ITOA64[(value & 0x3f) as usize]);
    let mut output = String::with_capacity(input.len().div_ceil(3) * 4);

    for chunk in input.chunks(3) {
        let mut value = u32::from(chunk[0]);
        if let Some(&byte) = chunk.get(1) {
            value |= u32::from(byte) << 8;
        }
        if let Some(&byte) = chunk.get(2) {
            value |= u32::from(byte) << 16;
        }

        output.push(symbol(value));
        output.push(symbol(value >> 6));
        if chunk.len() < 2 {
            break;
        }
        output.push(symbol(value >> 12));
        if chunk.len() < 3 {
            break;
        }
        output.push(symbol(value >> 18));
    }

    output
}

/// Inverse of [`encode64`] for a 16 byte digest. Non-canonical encodings
/// (stray bits in the final symbol) are rejected.
fn decode_digest(encoded: &str) -> Option<[u8; DIGEST_LEN]> {
    if encoded.len() != ENCODED_DIGEST_LEN {
        return None;
    }

    let symbols = encoded
        .chars()
        .map(symbol_index)
        .collect::<Option<Vec<u32>>>()?;

    let mut digest = [0u8; DIGEST_LEN];
    let mut out = digest.iter_mut();
    for group in symbols.chunks(4) {
        let value = group
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &s)| acc | (s << (6 * i)));
        for shift in [0, 8, 16].into_iter().take(group.len() - 1) {
            *out.next()? = (value >> shift) as u8;
        }
    }

    (encode64(&digest) == encoded).then_some(digest)
}

#[cfg(test)]
mod test {
    use super::{decode_digest, encode64, Params, Phpass, DEFAULT_COUNT_LOG2, ITOA64};
    use password_hash::{McfHasher, PasswordVerifier};
    use rand::{Rng, RngCore};

    /// The known-good portable hash shipped with phpass' own test script.
    const PHPASS_TEST_VECTOR: &str = "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0";

    fn random_salt() -> String {
        let mut bytes = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut bytes);
        encode64(&bytes)
    }

    #[test]
    fn reference_vector_verifies() {
        Phpass
            .verify_mcf_hash(b"test12345", PHPASS_TEST_VECTOR)
            .unwrap();
        assert!(Phpass.verify_mcf_hash(b"test12346", PHPASS_TEST_VECTOR).is_err());
    }

    #[test]
    fn hash_mcf_matches_reference_implementation() {
        assert_eq!(
            Phpass.hash_mcf(b"test12345", 11, "IQRaTwmf").unwrap(),
            PHPASS_TEST_VECTOR
        );
        assert_eq!(
            Phpass.hash_mcf(b"secret123", 13, "xyz12345").unwrap(),
            "$P$Bxyz12345lwaflS6e/hYrKCY6TUOVg1"
        );
        assert_eq!(
            Phpass.hash_mcf(b"password", 7, "abcdefgh").unwrap(),
            "$P$5abcdefghTirbPJao7vjX0d/TOtGeU/"
        );
        assert_eq!(
            Phpass.hash_mcf(b"hunter2", 9, "./AZaz09").unwrap(),
            "$P$7./AZaz09gMkaD0kAPyMk1ZwXXSC2G."
        );
    }

    #[test]
    fn fresh_hashes_verify_only_their_password() {
        let mut rng = rand::thread_rng();
        for _ in 0..4 {
            let count_log2 = rng.gen_range(7..=10);
            let password: String = (0..rng.gen_range(1..24))
                .map(|_| char::from(rng.gen_range(b' '..=b'~')))
                .collect();
            let hash = Phpass
                .hash_mcf(password.as_bytes(), count_log2, &random_salt())
                .unwrap();

            Phpass.verify_mcf_hash(password.as_bytes(), &hash).unwrap();
            let wrong = format!("{password}x");
            assert!(Phpass.verify_mcf_hash(wrong.as_bytes(), &hash).is_err());
        }
    }

    #[test]
    fn phpbb_prefix_is_equivalent() {
        let hash = PHPASS_TEST_VECTOR.replacen("$P$", "$H$", 1);
        Phpass.verify_mcf_hash(b"test12345", &hash).unwrap();
    }

    #[test]
    fn upgrade_to_phc_round_trips_through_verifier() {
        let phc = Phpass.upgrade_mcf_hash(PHPASS_TEST_VECTOR).unwrap().to_string();
        assert!(phc.starts_with("$phpass$r=11$IQRaTwmf$"));

        let parsed = password_hash::PasswordHash::new(&phc).unwrap();
        parsed.verify_password(&[&Phpass], b"test12345").unwrap();
        assert!(parsed.verify_password(&[&Phpass], b"nope").is_err());
    }

    #[test]
    fn count_symbol_out_of_range_is_rejected() {
        // '4' is 6 and 's' is 56, both outside 7..=30
        for count in ['4', 's'] {
            let hash = format!("$P${count}{}", &PHPASS_TEST_VECTOR[4..]);
            assert!(Phpass.verify_mcf_hash(b"test12345", &hash).is_err());
        }
        assert!(Phpass.hash_mcf(b"x", 31, "IQRaTwmf").is_err());
        assert!(Phpass.hash_mcf(b"x", 6, "IQRaTwmf").is_err());
    }

    #[test]
    fn truncated_and_garbled_hashes_are_errors() {
        for hash in [
            "$P$",
            "$P$9",
            "$P$9IQRa",
            "$P$9IQRaTwm",
            "$P$9IQRaTwmf",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0x",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L$",
            "$P$9IQRaTwmfeRo7ud9Fñ4E2PdI0S3r.L0",
            "$Q$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0",
        ] {
            assert!(
                Phpass.verify_mcf_hash(b"test12345", hash).is_err(),
                "{hash:?} should not verify"
            );
        }
    }

    #[test]
    fn non_canonical_final_symbol_is_rejected() {
        // only the low two bits of the final symbol carry data
        let digest = &PHPASS_TEST_VECTOR[12..];
        assert!(decode_digest(digest).is_some());
        let tweaked = format!("{}{}", &digest[..21], 'z');
        assert!(decode_digest(&tweaked).is_none());
    }

    #[test]
    fn salt_must_use_phpass_alphabet() {
        assert!(Phpass.hash_mcf(b"x", 8, "abc+defg").is_err());
        assert!(Phpass.hash_mcf(b"x", 8, "abcdefg").is_err());
        assert!(Phpass.hash_mcf(b"x", 8, "abcdefghi").is_err());
    }

    #[test]
    fn encode64_packing() {
        assert_eq!(encode64(&[]), "");
        assert_eq!(encode64(&[0x00]), "..");
        assert_eq!(encode64(&[0xff]), "z1");
        assert_eq!(encode64(&[0x01, 0x02, 0x03]), "/6k.");
        assert_eq!(encode64(&[0xff; 16]).len(), 22);
        assert!(encode64(&[0xab; 9]).bytes().all(|b| ITOA64.contains(&b)));
    }

    #[test]
    fn count_symbol_becomes_rounds_param() {
        let wordpress = Phpass
            .upgrade_mcf_hash("$P$Bxyz12345lwaflS6e/hYrKCY6TUOVg1")
            .unwrap();
        assert_eq!(Params::try_from(&wordpress).unwrap().count_log2(), 13);
        assert_eq!(Params::default().count_log2(), DEFAULT_COUNT_LOG2);

        let reference = Phpass.upgrade_mcf_hash(PHPASS_TEST_VECTOR).unwrap();
        assert_eq!(Params::try_from(&reference).unwrap().count_log2(), 11);
    }

    #[test]
    fn other_algorithms_are_refused() {
        let bcrypt_phc = "$bcrypt$v=98$r=10$tAe1bhm5zoo0Sx7ZfrCd7w$0T4Cf8htpt/8FbjK+cErdaTh8T6ClYQ";
        let parsed = password_hash::PasswordHash::new(bcrypt_phc).unwrap();
        assert!(Phpass.verify_password(b"password", &parsed).is_err());
    }
}
