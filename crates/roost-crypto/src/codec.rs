//! Credential codec: AES-256-GCM with base64 token encoding.
//!
//! Every sensitive account field goes through this codec before it touches
//! the store. Tokens carry their nonce inline (`base64(nonce ‖ ciphertext)`),
//! so decryption needs only the token and the process-wide key. Decryption
//! fails closed: a single flipped bit anywhere in the token yields an error,
//! never partial plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::CryptoError;

/// Nonce size for AES-256-GCM (96-bit).
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size appended by GCM.
pub const TAG_SIZE: usize = 16;

/// Stateless after key load; safe to share across workers.
pub struct CredentialCodec {
    cipher: Aes256Gcm,
}

impl CredentialCodec {
    /// Create a codec from a raw 32-byte key.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: key.len(),
            });
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Create a codec from a base64-encoded 32-byte key, as stored in the
    /// environment.
    pub fn from_base64_key(raw: &str) -> Result<Self, CryptoError> {
        let key = BASE64
            .decode(raw.trim())
            .map_err(|e| CryptoError::InvalidToken(format!("key is not valid base64: {e}")))?;
        Self::new(&key)
    }

    /// Encrypt plaintext bytes into a token.
    ///
    /// A fresh random nonce is generated per call.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        let mut raw = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        raw.extend_from_slice(&nonce_bytes);
        raw.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(raw))
    }

    /// Convenience wrapper for string fields.
    pub fn encrypt_str(&self, plaintext: &str) -> Result<String, CryptoError> {
        self.encrypt(plaintext.as_bytes())
    }

    /// Decrypt a token back to plaintext bytes.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = BASE64
            .decode(token.trim())
            .map_err(|e| CryptoError::InvalidToken(format!("not valid base64: {e}")))?;
        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::InvalidToken(format!(
                "token too short: {} bytes",
                raw.len()
            )));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Decrypt a token holding UTF-8 text.
    pub fn decrypt_str(&self, token: &str) -> Result<String, CryptoError> {
        let bytes = self.decrypt(token)?;
        String::from_utf8(bytes)
            .map_err(|e| CryptoError::DecryptionFailed(format!("not valid UTF-8: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn codec() -> CredentialCodec {
        CredentialCodec::new(&[42u8; 32]).unwrap()
    }

    #[test]
    fn rejects_short_key() {
        let result = CredentialCodec::new(&[0u8; 16]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
    }

    #[test]
    fn base64_key_roundtrip() {
        let raw = BASE64.encode([9u8; 32]);
        let codec = CredentialCodec::from_base64_key(&raw).unwrap();
        let token = codec.encrypt_str("secret").unwrap();
        assert_eq!(codec.decrypt_str(&token).unwrap(), "secret");
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let codec = codec();
        let token = codec.encrypt_str("Hunter2!").unwrap();
        assert_eq!(codec.decrypt(&token).unwrap(), b"Hunter2!");
    }

    #[test]
    fn roundtrip_identity_across_lengths() {
        let codec = codec();
        for len in [0usize, 1, 2, 15, 16, 17, 255, 4096] {
            let plaintext: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let token = codec.encrypt(&plaintext).unwrap();
            assert_eq!(codec.decrypt(&token).unwrap(), plaintext, "len={len}");
        }
    }

    #[test]
    fn ciphertext_overhead_is_nonce_plus_tag() {
        let codec = codec();
        for len in [0usize, 1, 64, 1000] {
            let plaintext = vec![0xABu8; len];
            let token = codec.encrypt(&plaintext).unwrap();
            let raw = BASE64.decode(&token).unwrap();
            assert_eq!(raw.len(), len + NONCE_SIZE + TAG_SIZE);
        }
    }

    #[test]
    fn fresh_nonce_per_call() {
        let codec = codec();
        let a = codec.encrypt(b"same input").unwrap();
        let b = codec.encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_token_fails_cleanly() {
        let codec = codec();
        let token = codec.encrypt_str("Hunter2!").unwrap();
        let mut raw = BASE64.decode(&token).unwrap();

        // Flip one bit in every byte position; none may decrypt
        for i in 0..raw.len() {
            raw[i] ^= 0x01;
            let tampered = BASE64.encode(&raw);
            assert!(codec.decrypt(&tampered).is_err(), "byte {i} accepted");
            raw[i] ^= 0x01;
        }
    }

    #[test]
    fn wrong_key_fails() {
        let a = CredentialCodec::new(&[1u8; 32]).unwrap();
        let b = CredentialCodec::new(&[2u8; 32]).unwrap();
        let token = a.encrypt_str("secret").unwrap();
        assert!(matches!(
            b.decrypt(&token),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn truncated_token_rejected() {
        let codec = codec();
        let short = BASE64.encode([0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(
            codec.decrypt(&short),
            Err(CryptoError::InvalidToken(_))
        ));
    }

    #[test]
    fn garbage_token_rejected() {
        let codec = codec();
        assert!(codec.decrypt("not a token at all").is_err());
    }
}
