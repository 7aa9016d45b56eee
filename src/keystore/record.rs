//! Web3 Secret Storage (V3) keystore records
//!
//! The on-disk format shared by geth, MetaMask exports and most wallets:
//!
//! ```json
//! {
//!   "version": 3,
//!   "id": "uuid-v4",
//!   "address": "hex-address-without-0x",
//!   "crypto": {
//!     "cipher": "aes-128-ctr",
//!     "ciphertext": "hex-encrypted-key",
//!     "cipherparams": { "iv": "hex-initialization-vector" },
//!     "kdf": "scrypt",
//!     "kdfparams": { "dklen": 32, "n": 262144, "r": 8, "p": 1, "salt": "hex-salt" },
//!     "mac": "hex-keccak256-mac"
//!   }
//! }
//! ```
//!
//! New records are written with scrypt. Records using `pbkdf2` (hmac-sha256)
//! are accepted on decryption so keys exported by other wallets can be imported.
//! The MAC is keccak256(derived_key[16..32] || ciphertext).

use crate::key_material::PrivateKey;
use crate::{Error, Result};
use aes::cipher::{KeyIvInit, StreamCipher};
use alloy::hex;
use alloy::primitives::{keccak256, Address};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use zeroize::Zeroizing;

/// AES-128 in big-endian 128-bit counter mode
type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

const CIPHER: &str = "aes-128-ctr";
const KDF_SCRYPT: &str = "scrypt";
const KDF_PBKDF2: &str = "pbkdf2";
const PRF_HMAC_SHA256: &str = "hmac-sha256";

/// Derived key length in bytes
const DKLEN: u32 = 32;

/// Largest scrypt cost accepted from a record (n = 2^20)
pub const MAX_SCRYPT_LOG_N: u8 = 20;
/// Largest scrypt `r * p` accepted from a record
pub const MAX_SCRYPT_RP: u64 = 256;
/// Largest scrypt working set, `128 * r * n` bytes
const MAX_SCRYPT_MEMORY: u64 = 1 << 30;
/// Largest pbkdf2 iteration count accepted from a record
pub const MAX_PBKDF2_ROUNDS: u32 = 10_000_000;

/// Scrypt work factor used when encrypting new records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptConfig {
    /// log2 of the CPU/memory cost `n`
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl ScryptConfig {
    /// geth's standard parameters (n = 2^18, r = 8, p = 1)
    pub const fn standard() -> Self {
        Self {
            log_n: 18,
            r: 8,
            p: 1,
        }
    }

    /// geth's "light" parameters for constrained devices (n = 2^12, r = 8, p = 6)
    pub const fn light() -> Self {
        Self {
            log_n: 12,
            r: 8,
            p: 6,
        }
    }
}

impl ScryptConfig {
    /// Reject work factors that would exhaust memory or never finish
    pub fn check_bounds(&self) -> std::result::Result<(), String> {
        if self.log_n == 0 || self.log_n > MAX_SCRYPT_LOG_N {
            return Err(format!(
                "scrypt log_n must be between 1 and {}, got {}",
                MAX_SCRYPT_LOG_N, self.log_n
            ));
        }
        if self.r == 0 || self.p == 0 {
            return Err("scrypt r and p must be positive".to_string());
        }
        let rp = u64::from(self.r) * u64::from(self.p);
        if rp > MAX_SCRYPT_RP {
            return Err(format!(
                "scrypt r * p must be at most {}, got {}",
                MAX_SCRYPT_RP, rp
            ));
        }
        let memory = 128u64
            .saturating_mul(u64::from(self.r))
            .saturating_mul(1u64 << self.log_n);
        if memory > MAX_SCRYPT_MEMORY {
            return Err(format!(
                "scrypt would need {} bytes, limit is {}",
                memory, MAX_SCRYPT_MEMORY
            ));
        }
        Ok(())
    }
}

impl Default for ScryptConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// A V3 keystore document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeystoreRecord {
    /// Always 3
    pub version: u32,
    /// UUID v4 identifier
    #[serde(default)]
    pub id: String,
    /// Account address, 40 lowercase hex chars without 0x.
    ///
    /// Optional on read: the reference test vectors omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Some wallets write `Crypto` instead of `crypto`
    #[serde(alias = "Crypto")]
    pub crypto: CryptoJson,
}

/// Encrypted key data following the V3 crypto JSON format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoJson {
    pub cipher: String,
    pub ciphertext: String,
    pub cipherparams: CipherParams,
    pub kdf: String,
    pub kdfparams: KdfParams,
    pub mac: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherParams {
    /// Hex-encoded 16-byte initialization vector
    pub iv: String,
}

/// Key derivation parameters, shape depends on `kdf`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KdfParams {
    Scrypt {
        dklen: u32,
        n: u64,
        r: u32,
        p: u32,
        salt: String,
    },
    Pbkdf2 {
        dklen: u32,
        c: u32,
        prf: String,
        salt: String,
    },
}

impl KeystoreRecord {
    /// Encrypt `key` under `passphrase`
    pub fn encrypt(
        key: &PrivateKey,
        passphrase: &SecretString,
        scrypt_config: &ScryptConfig,
    ) -> Result<Self> {
        let address = key.address()?;

        let mut salt = [0u8; 32];
        let mut iv = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let kdfparams = KdfParams::Scrypt {
            dklen: DKLEN,
            n: 1u64 << scrypt_config.log_n,
            r: scrypt_config.r,
            p: scrypt_config.p,
            salt: hex::encode(salt),
        };
        let derived_key = derive_key(passphrase, &kdfparams)?;

        let mut ciphertext = key.as_bytes().to_vec();
        let mut cipher = Aes128Ctr::new(derived_key[..16].into(), iv.as_slice().into());
        cipher.apply_keystream(&mut ciphertext);

        let mac = compute_mac(&derived_key, &ciphertext);

        Ok(Self {
            version: 3,
            id: uuid::Uuid::new_v4().to_string(),
            address: Some(hex::encode(address.as_slice())),
            crypto: CryptoJson {
                cipher: CIPHER.to_string(),
                ciphertext: hex::encode(&ciphertext),
                cipherparams: CipherParams {
                    iv: hex::encode(iv),
                },
                kdf: KDF_SCRYPT.to_string(),
                kdfparams,
                mac: hex::encode(mac),
            },
        })
    }

    /// Decrypt the record.
    ///
    /// A MAC mismatch is reported as [`Error::WrongPassphrase`]; structural
    /// problems with the document are [`Error::StorageFailure`].
    pub fn decrypt(&self, passphrase: &SecretString) -> Result<PrivateKey> {
        if self.version != 3 {
            return Err(corrupted(format!(
                "unsupported keystore version {}",
                self.version
            )));
        }
        if self.crypto.cipher != CIPHER {
            return Err(corrupted(format!(
                "unsupported cipher {}",
                self.crypto.cipher
            )));
        }

        if self.crypto.kdf != self.crypto.kdfparams.kdf_name() {
            return Err(corrupted(format!(
                "kdf {} does not match its parameters",
                self.crypto.kdf
            )));
        }

        let iv = decode_field("iv", &self.crypto.cipherparams.iv)?;
        let ciphertext = decode_field("ciphertext", &self.crypto.ciphertext)?;
        let expected_mac = decode_field("mac", &self.crypto.mac)?;

        if iv.len() != 16 {
            return Err(corrupted(format!("IV must be 16 bytes, got {}", iv.len())));
        }
        if ciphertext.len() != 32 {
            return Err(corrupted(format!(
                "ciphertext must be 32 bytes, got {}",
                ciphertext.len()
            )));
        }

        let derived_key = derive_key(passphrase, &self.crypto.kdfparams)?;
        let computed_mac = compute_mac(&derived_key, &ciphertext);
        if computed_mac.as_slice() != expected_mac.as_slice() {
            return Err(Error::WrongPassphrase);
        }

        let mut plaintext = Zeroizing::new(ciphertext);
        let mut cipher = Aes128Ctr::new(derived_key[..16].into(), iv.as_slice().into());
        cipher.apply_keystream(&mut plaintext);

        let key = PrivateKey::from_slice(&plaintext)
            .map_err(|_| corrupted("decrypted key is not a valid secp256k1 scalar"))?;

        if let Some(expected) = self.address()? {
            if key.address()? != expected {
                return Err(corrupted("decrypted key does not match the stored address"));
            }
        }

        Ok(key)
    }

    /// Address stored in the record, if any
    pub fn address(&self) -> Result<Option<Address>> {
        match &self.address {
            None => Ok(None),
            Some(raw) => {
                let raw = raw.strip_prefix("0x").unwrap_or(raw);
                Address::from_str(raw)
                    .map(Some)
                    .map_err(|e| corrupted(format!("invalid address field: {}", e)))
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| corrupted(format!("unreadable keystore: {}", e)))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn derive_key(passphrase: &SecretString, params: &KdfParams) -> Result<Zeroizing<Vec<u8>>> {
    let password = passphrase.expose_secret().as_bytes();

    match params {
        KdfParams::Scrypt {
            dklen,
            n,
            r,
            p,
            salt,
        } => {
            check_dklen(*dklen)?;
            if *n < 2 || !n.is_power_of_two() {
                return Err(corrupted(format!("scrypt n must be a power of two, got {}", n)));
            }
            let log_n = n.trailing_zeros() as u8;
            ScryptConfig {
                log_n,
                r: *r,
                p: *p,
            }
            .check_bounds()
            .map_err(corrupted)?;
            let salt = decode_field("salt", salt)?;
            let params = scrypt::Params::new(log_n, *r, *p, *dklen as usize)
                .map_err(|e| corrupted(format!("invalid scrypt parameters: {}", e)))?;

            let mut derived = Zeroizing::new(vec![0u8; *dklen as usize]);
            scrypt::scrypt(password, &salt, &params, &mut derived)
                .map_err(|e| corrupted(format!("scrypt failed: {}", e)))?;
            Ok(derived)
        }
        KdfParams::Pbkdf2 {
            dklen,
            c,
            prf,
            salt,
        } => {
            check_dklen(*dklen)?;
            if *c == 0 || *c > MAX_PBKDF2_ROUNDS {
                return Err(corrupted(format!(
                    "pbkdf2 iteration count must be between 1 and {}, got {}",
                    MAX_PBKDF2_ROUNDS, c
                )));
            }
            if prf != PRF_HMAC_SHA256 {
                return Err(corrupted(format!("unsupported pbkdf2 prf {}", prf)));
            }
            let salt = decode_field("salt", salt)?;

            let mut derived = Zeroizing::new(vec![0u8; *dklen as usize]);
            pbkdf2::pbkdf2_hmac::<sha2::Sha256>(password, &salt, *c, &mut derived);
            Ok(derived)
        }
    }
}

impl KdfParams {
    /// Name written to the `kdf` field
    pub fn kdf_name(&self) -> &'static str {
        match self {
            KdfParams::Scrypt { .. } => KDF_SCRYPT,
            KdfParams::Pbkdf2 { .. } => KDF_PBKDF2,
        }
    }
}

fn check_dklen(dklen: u32) -> Result<()> {
    if dklen != DKLEN {
        return Err(corrupted(format!("dklen must be 32, got {}", dklen)));
    }
    Ok(())
}

fn compute_mac(derived_key: &[u8], ciphertext: &[u8]) -> [u8; 32] {
    let mut mac_input = Vec::with_capacity(16 + ciphertext.len());
    mac_input.extend_from_slice(&derived_key[16..32]);
    mac_input.extend_from_slice(ciphertext);
    keccak256(&mac_input).0
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| corrupted(format!("invalid {} hex: {}", name, e)))
}

fn corrupted(detail: impl std::fmt::Display) -> Error {
    Error::StorageFailure(format!("Corrupted keystore record: {}", detail))
}
