//! Cryptographic primitive for per-user encrypted storage
//!
//! Provides slow key derivation, authenticated envelope encryption and
//! tamper-evident audit hashing. Every memory record is encrypted with a
//! caller-supplied per-user key; the service never persists plaintext and
//! never stores a usable key. Nothing in this module logs plaintext or key
//! material, including on error paths.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::CryptoConfig;
use crate::error::{Error, Result};

/// AES-256-GCM key size
pub const KEY_SIZE: usize = 32;

/// Nonce size for AES-GCM
pub const NONCE_SIZE: usize = 12;

/// GCM authentication tag size
pub const TAG_SIZE: usize = 16;

/// KDF salt size
pub const SALT_SIZE: usize = 16;

/// Envelope format version
pub const ENVELOPE_VERSION: &str = "1";

/// Additional authenticated data binding ciphertexts to this application
/// context. A ciphertext lifted into another deployment fails authentication.
const AAD_CONTEXT: &[u8] = b"harbor-secure-memory-v1";

/// A derived or generated per-user encryption key.
///
/// Zeroized on drop so key material does not linger in memory after the
/// request that supplied it completes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct UserKey([u8; KEY_SIZE]);

impl UserKey {
    /// Wrap raw key bytes supplied by the identity collaborator
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes (for cipher construction only)
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never reveal key bytes, even in debug output
        f.write_str("UserKey(..)")
    }
}

/// Encrypted envelope for a single field.
///
/// Each field of a record is enveloped independently so a corrupted
/// ciphertext only loses that field, and each envelope is independently
/// tamper-evident. All byte fields are base64-encoded for storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Ciphertext without the authentication tag
    pub ciphertext: String,
    /// Fresh per-call initialization vector
    pub iv: String,
    /// GCM authentication tag
    pub auth_tag: String,
    /// KDF salt used to derive the key, when the caller derived it here.
    /// Empty for keys supplied directly by the identity context.
    pub salt: String,
    /// Envelope format version
    pub version: String,
    /// Creation time, Unix milliseconds
    pub timestamp: i64,
}

/// Derive a 32-byte key from a user secret using PBKDF2-HMAC-SHA512.
///
/// Iterations below the hard floor are refused outright; a weak work factor
/// is a configuration bug, not something to degrade around.
pub fn derive_key(secret: &[u8], salt: &[u8], iterations: u32) -> Result<UserKey> {
    if iterations < CryptoConfig::MIN_ITERATIONS {
        return Err(Error::Crypto(format!(
            "KDF iteration count {} below minimum {}",
            iterations,
            CryptoConfig::MIN_ITERATIONS
        )));
    }
    if salt.is_empty() {
        return Err(Error::Crypto("KDF salt must not be empty".to_string()));
    }

    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha512>(secret, salt, iterations, &mut key);
    Ok(UserKey(key))
}

/// Generate a random KDF salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Generate a random encryption key
pub fn generate_key() -> UserKey {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    UserKey(key)
}

/// Encrypt a plaintext under the given key using AES-256-GCM.
///
/// A fresh IV is generated per call. `kdf_salt` is recorded in the envelope
/// for keys derived via [`derive_key`]; pass an empty slice for
/// caller-supplied keys.
pub fn encrypt(key: &UserKey, plaintext: &[u8], kdf_salt: &[u8]) -> Result<EncryptedEnvelope> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut tagged = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: AAD_CONTEXT,
            },
        )
        .map_err(|_| Error::Crypto("Encryption failed".to_string()))?;

    // The AEAD output carries the tag as its trailing bytes; split it out so
    // the envelope matches the stored-record shape.
    if tagged.len() < TAG_SIZE {
        return Err(Error::Crypto("Cipher output too short".to_string()));
    }
    let tag = tagged.split_off(tagged.len() - TAG_SIZE);

    let b64 = base64::engine::general_purpose::STANDARD;
    Ok(EncryptedEnvelope {
        ciphertext: b64.encode(&tagged),
        iv: b64.encode(nonce_bytes),
        auth_tag: b64.encode(&tag),
        salt: b64.encode(kdf_salt),
        version: ENVELOPE_VERSION.to_string(),
        timestamp: chrono::Utc::now().timestamp_millis(),
    })
}

/// Decrypt an envelope under the given key.
///
/// Fails with [`Error::Decryption`] on any authentication mismatch; no
/// partial plaintext is ever returned.
pub fn decrypt(key: &UserKey, envelope: &EncryptedEnvelope) -> Result<Vec<u8>> {
    let b64 = base64::engine::general_purpose::STANDARD;
    let ciphertext = b64
        .decode(&envelope.ciphertext)
        .map_err(|_| Error::Decryption("Malformed ciphertext encoding".to_string()))?;
    let iv = b64
        .decode(&envelope.iv)
        .map_err(|_| Error::Decryption("Malformed IV encoding".to_string()))?;
    let tag = b64
        .decode(&envelope.auth_tag)
        .map_err(|_| Error::Decryption("Malformed tag encoding".to_string()))?;

    if iv.len() != NONCE_SIZE {
        return Err(Error::Decryption("Unexpected IV length".to_string()));
    }
    if tag.len() != TAG_SIZE {
        return Err(Error::Decryption("Unexpected tag length".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Failed to create cipher: {}", e)))?;

    let mut tagged = ciphertext;
    tagged.extend_from_slice(&tag);
    let nonce = Nonce::from_slice(&iv);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &tagged,
                aad: AAD_CONTEXT,
            },
        )
        .map_err(|_| Error::Decryption("Authentication failed".to_string()))
}

type HmacSha512 = Hmac<Sha512>;

/// Compute the integrity hash for an audit record.
///
/// HMAC-SHA512 keyed by the server secret over the canonical serialization
/// and timestamp, hex-encoded.
pub fn hash_audit(data: &str, timestamp: i64, secret: &str) -> String {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(data.as_bytes());
    mac.update(timestamp.to_be_bytes().as_slice());
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Verify an audit integrity hash in constant time.
pub fn verify_audit_hash(data: &str, timestamp: i64, secret: &str, expected: &str) -> bool {
    let computed = hash_audit(data, timestamp, secret);
    // ct_eq on equal-length inputs; a length mismatch is already a failure
    // and leaks nothing useful.
    computed.as_bytes().ct_eq(expected.as_bytes()).into()
}
