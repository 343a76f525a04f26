//! Roost Credential Crypto Library
//!
//! Sensitive account fields (emails, passwords, TOTP seeds, proxy
//! credentials) are stored as opaque ciphertext blobs. This crate provides:
//!
//! - **Codec**: AES-256-GCM AEAD with a 12-byte nonce and 16-byte tag; tokens
//!   are `base64(nonce ‖ ciphertext)`. One process-wide key, loaded once at
//!   startup from the environment.
//! - **TOTP**: RFC-6238 time-based one-time passwords for account 2FA.

pub mod codec;
pub mod error;
pub mod totp;

pub use codec::{CredentialCodec, NONCE_SIZE, TAG_SIZE};
pub use error::CryptoError;
