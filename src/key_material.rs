//! Private key parsing and the in-memory secret type
//!
//! Raw keys arrive from the user either as a decimal number or as 64 hex
//! characters. This module classifies the input, normalizes it into 32 bytes and
//! wraps the result in [`PrivateKey`], which zeroizes itself on drop.
//!
//! SECURITY: key bytes are never logged, never serialized and never shown by
//! `Debug`.

use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a private key rendered as hex, without prefix
pub const PRIVATE_KEY_HEX_LEN: usize = 64;

/// How a raw private key string is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Decimal,
    Hexadecimal,
    Invalid,
}

/// Classify a raw key by scanning its characters.
///
/// Digits alone read as decimal. The first `a-f` (either case) upgrades the
/// whole string to hexadecimal, so `"12ab"` is hex even though it starts with
/// digits. Anything outside `[0-9a-fA-F]` is invalid, including a `0x` prefix
/// (see [`strip_hex_prefix`]).
pub fn classify(raw: &str) -> KeyFormat {
    if raw.is_empty() {
        return KeyFormat::Invalid;
    }

    let mut format = KeyFormat::Decimal;
    for c in raw.chars() {
        match c.to_ascii_lowercase() {
            '0'..='9' => {}
            'a'..='f' => format = KeyFormat::Hexadecimal,
            _ => return KeyFormat::Invalid,
        }
    }
    format
}

/// Turn a classified raw key into a [`PrivateKey`].
///
/// Decimal input is parsed as an unsigned integer and rendered in base 16
/// without zero padding. The hex form must then be exactly 64 characters; short
/// keys are rejected rather than padded.
pub fn normalize(raw: &str, format: KeyFormat) -> Result<PrivateKey> {
    let hex_form: Zeroizing<String> = match format {
        KeyFormat::Decimal => {
            // Anything wider than 256 bits can never render to 64 hex chars.
            let mut value =
                U256::from_str_radix(raw, 10).map_err(|_| Error::InvalidPrivateKey)?;
            let hex_form = Zeroizing::new(format!("{:x}", value));
            wipe(&mut value);
            hex_form
        }
        KeyFormat::Hexadecimal => Zeroizing::new(raw.to_ascii_lowercase()),
        KeyFormat::Invalid => return Err(Error::InvalidPrivateKey),
    };

    if hex_form.len() != PRIVATE_KEY_HEX_LEN {
        return Err(Error::InvalidPrivateKey);
    }

    let mut bytes = Zeroizing::new([0u8; 32]);
    hex::decode_to_slice(hex_form.as_bytes(), bytes.as_mut())
        .map_err(|_| Error::InvalidPrivateKey)?;

    PrivateKey::from_slice(bytes.as_ref())
}

/// Overwrite a scalar that held key material
fn wipe(value: &mut U256) {
    // SAFETY: all-zero limbs are a valid U256
    unsafe { value.as_limbs_mut() }.zeroize();
}

/// True iff `raw` normalizes into a usable private key.
pub fn is_valid(raw: &str) -> bool {
    normalize(raw, classify(raw)).is_ok()
}

/// Remove surrounding whitespace and an optional `0x`/`0X` prefix.
pub fn strip_hex_prefix(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed)
}

/// Parse user input: strip the prefix, classify, normalize.
pub fn parse(raw: &str) -> Result<PrivateKey> {
    let raw = strip_hex_prefix(raw);
    normalize(raw, classify(raw))
}

/// A secp256k1 secret scalar
///
/// Always non-zero and below the curve order. The backing bytes are wiped when
/// the value is dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    /// Generate a fresh random key
    pub fn random() -> Self {
        let signer = PrivateKeySigner::random();
        let mut bytes = signer.to_bytes();
        let key = Self(bytes.0);
        bytes.0.zeroize();
        key
    }

    /// Build from raw bytes, rejecting anything that is not a valid scalar
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidPrivateKey)?;
        let key = Self(array);
        // Range check: zero and values >= n are refused by the signer.
        key.signer().map_err(|_| Error::InvalidPrivateKey)?;
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Canonical lowercase hex, 64 chars, no prefix
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.0))
    }

    /// Build a transient signer for this key.
    ///
    /// The signer's own signing key zeroizes on drop; callers should keep it no
    /// longer than a single signing operation.
    pub fn signer(&self) -> Result<PrivateKeySigner> {
        let mut bytes = B256::from(self.0);
        let signer = PrivateKeySigner::from_bytes(&bytes)
            .map_err(|e| Error::SigningFailure(format!("Malformed private key: {}", e)));
        bytes.0.zeroize();
        signer
    }

    /// Address derived from the public key
    pub fn address(&self) -> Result<Address> {
        Ok(self.signer()?.address())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").field(&"[REDACTED]").finish()
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for PrivateKey {}

#[cfg(test)]
mod tests {
    use super::*;

    // Anvil/Hardhat account #0, DO NOT use with real funds
    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    #[test]
    fn test_classify() {
        assert_eq!(classify("123456"), KeyFormat::Decimal);
        assert_eq!(classify("12ab"), KeyFormat::Hexadecimal);
        assert_eq!(classify("ABCDEF"), KeyFormat::Hexadecimal);
        assert_eq!(classify("12g4"), KeyFormat::Invalid);
        assert_eq!(classify("0x12"), KeyFormat::Invalid);
        assert_eq!(classify(""), KeyFormat::Invalid);
    }

    #[test]
    fn test_first_hex_letter_upgrades_classification() {
        // Leading digits look decimal until the first a-f character.
        assert_eq!(classify("99999999f"), KeyFormat::Hexadecimal);
        assert_eq!(classify("f99999999"), KeyFormat::Hexadecimal);
    }

    #[test]
    fn test_hex_normalizes_to_lowercase() {
        let upper = TEST_KEY.to_uppercase();
        assert_eq!(classify(&upper), KeyFormat::Hexadecimal);

        let key = normalize(&upper, KeyFormat::Hexadecimal).unwrap();
        assert_eq!(key.to_hex().as_str(), TEST_KEY);
    }

    #[test]
    fn test_hex_round_trip_for_many_keys() {
        for seed in 1u8..=0x7f {
            // Trailing "ab" keeps every sample hexadecimal.
            let hex_key = format!("{}ab", format!("{:02x}", seed).repeat(31));
            assert_eq!(classify(&hex_key), KeyFormat::Hexadecimal);

            let key = normalize(&hex_key.to_uppercase(), KeyFormat::Hexadecimal).unwrap();
            assert_eq!(key.to_hex().as_str(), hex_key);
        }
    }

    #[test]
    fn test_hex_length_is_strict() {
        assert!(!is_valid(&TEST_KEY[..63]));
        assert!(!is_valid(&format!("{}0", TEST_KEY)));
    }

    #[test]
    fn test_decimal_key() {
        // Decimal rendering of TEST_KEY
        let decimal = U256::from_str_radix(TEST_KEY, 16).unwrap().to_string();
        assert_eq!(classify(&decimal), KeyFormat::Decimal);

        let key = normalize(&decimal, KeyFormat::Decimal).unwrap();
        assert_eq!(key.to_hex().as_str(), TEST_KEY);
    }

    #[test]
    fn test_wipe_clears_scalar() {
        let mut value = U256::from_str_radix(TEST_KEY, 16).unwrap();
        wipe(&mut value);
        assert_eq!(value, U256::ZERO);
    }

    #[test]
    fn test_short_decimal_is_not_padded() {
        // 2^200 renders to 51 hex chars, so it is rejected even though it is a
        // valid scalar.
        let decimal = (U256::from(1u8) << 200usize).to_string();
        assert!(!is_valid(&decimal));
        assert!(!is_valid("1"));
        assert!(!is_valid("0"));
    }

    #[test]
    fn test_decimal_overflow_is_invalid() {
        let huge = "9".repeat(100);
        assert!(!is_valid(&huge));
    }

    #[test]
    fn test_zero_and_out_of_range_scalars_rejected() {
        // 64 zeros classify as decimal and render to "0"
        assert!(!is_valid(&"0".repeat(64)));
        assert!(matches!(
            normalize(&"0".repeat(64), KeyFormat::Hexadecimal),
            Err(Error::InvalidPrivateKey)
        ));
        // Curve order n itself
        let order = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364141";
        assert!(!is_valid(order));
    }

    #[test]
    fn test_parse_strips_prefix() {
        let key = parse(&format!("  0x{}\n", TEST_KEY)).unwrap();
        assert_eq!(key.address().unwrap().to_string().to_lowercase(), TEST_ADDRESS);
    }

    #[test]
    fn test_invalid_classification_fails() {
        assert!(matches!(
            normalize(TEST_KEY, KeyFormat::Invalid),
            Err(Error::InvalidPrivateKey)
        ));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = parse(TEST_KEY).unwrap();
        let debug_str = format!("{:?}", key);
        assert!(!debug_str.contains("ac0974bec"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_random_keys_are_valid_and_distinct() {
        let a = PrivateKey::random();
        let b = PrivateKey::random();
        assert_ne!(a, b);
        assert!(is_valid(a.to_hex().as_str()));
    }
}
