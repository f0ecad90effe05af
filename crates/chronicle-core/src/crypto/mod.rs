//! Encryption of sync payloads.
//!
//! Change records leave the device sealed with AES-256-GCM. The key is
//! derived from the user's seed phrase with Argon2id and stored in config
//! as hex; the seed itself is never stored.
//!
//! ## Threat Model
//!
//! We defend against:
//! - A remote (or shared folder) reading entry content
//! - Envelopes being replayed under another device or change id
//!
//! We do NOT defend against:
//! - A compromised device holding the derived key

pub mod cipher;
pub mod key;

pub use cipher::{AesGcmCipher, ChangeCipher};
pub use key::{SyncKey, KEY_LENGTH};
