//! Sync key derivation using Argon2id.
//!
//! Every device of one user derives the same key from the same seed
//! phrase, so changes sealed on one device open on the others.

use argon2::Argon2;
use zeroize::ZeroizeOnDrop;

use crate::error::{ChronicleError, Result};

/// Argon2id parameters:
/// - Memory: 64 MiB (64 * 1024 KiB)
/// - Iterations: 3
/// - Parallelism: 1
const ARGON2_MEMORY_KB: u32 = 64 * 1024;
const ARGON2_ITERATIONS: u32 = 3;
const ARGON2_PARALLELISM: u32 = 1;

/// Length of the derived key in bytes (AES-256).
pub const KEY_LENGTH: usize = 32;

const MIN_SALT_BYTES: usize = 16;

/// Symmetric key used to seal and open change envelopes.
///
/// Key material is zeroized when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct SyncKey {
    key: [u8; KEY_LENGTH],
}

impl SyncKey {
    /// Derive a key from a seed phrase and salt.
    ///
    /// Same seed and salt always give the same key.
    pub fn derive(seed: &str, salt: &[u8]) -> Result<Self> {
        if seed.trim().is_empty() {
            return Err(ChronicleError::InvalidInput(
                "Seed phrase cannot be empty".to_string(),
            ));
        }
        if salt.len() < MIN_SALT_BYTES {
            return Err(ChronicleError::InvalidInput(format!(
                "Salt must be at least {} bytes",
                MIN_SALT_BYTES
            )));
        }

        let params = argon2::Params::new(
            ARGON2_MEMORY_KB,
            ARGON2_ITERATIONS,
            ARGON2_PARALLELISM,
            Some(KEY_LENGTH),
        )
        .map_err(|e| ChronicleError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; KEY_LENGTH];
        argon2
            .hash_password_into(seed.as_bytes(), salt, &mut key)
            .map_err(|e| ChronicleError::Crypto(format!("Key derivation failed: {}", e)))?;

        Ok(Self { key })
    }

    /// Salt for a user's sync key: all of that user's devices share it.
    pub fn salt_for_user(user_id: &str) -> Vec<u8> {
        format!("chronicle/v1/sync-key|{}", user_id).into_bytes()
    }

    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Parse a key persisted with `to_hex`.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|e| ChronicleError::Crypto(format!("Invalid key encoding: {}", e)))?;
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ChronicleError::Crypto(format!(
                "Invalid key length: expected {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.key)
    }

    /// Raw key bytes. Use only for immediate cipher construction.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for SyncKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncKey").field("key", &"[REDACTED]").finish()
    }
}
