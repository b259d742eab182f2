//! At-rest encryption for stored provider API keys.
//!
//! The encryption key is derived from a configured passphrase with
//! PBKDF2-HMAC-SHA256 and used with AES-256-GCM. Ciphertexts are stored as
//! base64(nonce || ciphertext || tag) so a single TEXT column holds
//! everything needed to decrypt.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use ring::aead::{AES_256_GCM, Aad, LessSafeKey, Nonce, UnboundKey};
use sha2::Sha256;

const PBKDF2_ITERATIONS: u32 = 390_000;
const NONCE_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("ciphertext is not valid base64")]
    Encoding(#[from] base64::DecodeError),
    #[error("ciphertext is truncated")]
    Truncated,
    #[error("decryption failed (wrong key or corrupted data)")]
    Decrypt,
    #[error("decrypted key is not valid UTF-8")]
    Utf8,
}

/// Symmetric cipher for provider keys, cheap to clone and share.
#[derive(Clone)]
pub struct KeyCipher {
    key: [u8; 32],
}

impl KeyCipher {
    /// Derive the cipher key from a passphrase and salt.
    pub fn derive(secret: &str, salt: &str) -> Self {
        let mut key = [0u8; 32];
        pbkdf2_hmac::<Sha256>(
            secret.as_bytes(),
            salt.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut key,
        );
        Self { key }
    }

    /// Encrypt a plaintext API key, returning base64(nonce || ct || tag).
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .expect("AES-256-GCM key length is fixed at 32 bytes");
        let key = LessSafeKey::new(unbound);

        let mut buf = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(
            Nonce::assume_unique_for_key(nonce_bytes),
            Aad::empty(),
            &mut buf,
        )
        .expect("in-place seal cannot fail for valid key and nonce");

        let mut out = Vec::with_capacity(NONCE_LEN + buf.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&buf);
        B64.encode(out)
    }

    /// Decrypt a stored ciphertext back to the plaintext API key.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let raw = B64.decode(ciphertext)?;
        if raw.len() < NONCE_LEN + AES_256_GCM.tag_len() {
            return Err(CipherError::Truncated);
        }

        let (nonce_bytes, sealed) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CipherError::Truncated)?;

        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .expect("AES-256-GCM key length is fixed at 32 bytes");
        let key = LessSafeKey::new(unbound);

        let mut buf = sealed.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::empty(), &mut buf)
            .map_err(|_| CipherError::Decrypt)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CipherError::Utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> KeyCipher {
        KeyCipher::derive("test-secret", "test-salt")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let c = cipher();
        let ct = c.encrypt("sk-live-abc123");
        assert_ne!(ct, "sk-live-abc123");
        assert_eq!(c.decrypt(&ct).unwrap(), "sk-live-abc123");
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let c = cipher();
        assert_ne!(c.encrypt("same-key"), c.encrypt("same-key"));
    }

    #[test]
    fn test_wrong_key_fails() {
        let ct = cipher().encrypt("sk-live-abc123");
        let other = KeyCipher::derive("other-secret", "test-salt");
        assert!(matches!(other.decrypt(&ct), Err(CipherError::Decrypt)));
    }

    #[test]
    fn test_garbage_is_not_silently_empty() {
        let c = cipher();
        assert!(c.decrypt("not base64 !!!").is_err());
        assert!(c.decrypt("YWJj").is_err()); // valid base64, too short
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let c = cipher();
        let ct = c.encrypt("sk-live-abc123");
        let mut raw = B64.decode(&ct).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xff;
        assert!(c.decrypt(&B64.encode(raw)).is_err());
    }
}
