//! AES-256-GCM encryption for stored access tokens.
//!
//! Every field gets its own random nonce; the master key comes from the
//! environment as base64 and only ever lives in memory.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

/// A fresh random master key, base64-encoded for the environment.
pub fn generate_key_base64() -> String {
    BASE64.encode(Aes256Gcm::generate_key(&mut OsRng))
}

/// Decode and length-check the base64 master key.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64)
        .context("Failed to decode base64 encryption key")?;
    if key_bytes.len() != KEY_SIZE {
        return Err(anyhow!(
            "Encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        ));
    }
    Ok(key_bytes)
}

/// Encrypt a token, returning `(ciphertext, nonce)` both base64-encoded.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<(String, String)> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Invalid key: {}", e))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|e| anyhow!("Encryption failed: {}", e))?;
    Ok((BASE64.encode(ciphertext), BASE64.encode(nonce)))
}

/// Decrypt a base64 `(ciphertext, nonce)` pair produced by [`encrypt`].
pub fn decrypt(ciphertext_b64: &str, nonce_b64: &str, key: &[u8]) -> Result<String> {
    if key.len() != KEY_SIZE {
        return Err(anyhow!("Encryption key must be {} bytes", KEY_SIZE));
    }
    let ciphertext = BASE64
        .decode(ciphertext_b64)
        .context("Failed to decode ciphertext")?;
    let nonce_bytes = BASE64.decode(nonce_b64).context("Failed to decode nonce")?;
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(anyhow!("Nonce must be {} bytes", NONCE_SIZE));
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| anyhow!("Invalid key: {}", e))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|_| anyhow!("Decryption failed: wrong key or tampered data"))?;
    String::from_utf8(plaintext).context("Decrypted data is not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Vec<u8> {
        vec![7u8; KEY_SIZE]
    }

    #[test]
    fn test_roundtrip() {
        let (ciphertext, nonce) = encrypt("access-token-xyz", &key()).unwrap();
        assert_ne!(ciphertext, "access-token-xyz");
        let plain = decrypt(&ciphertext, &nonce, &key()).unwrap();
        assert_eq!(plain, "access-token-xyz");
    }

    #[test]
    fn test_unique_nonces() {
        let (c1, n1) = encrypt("same", &key()).unwrap();
        let (c2, n2) = encrypt("same", &key()).unwrap();
        assert_ne!(n1, n2);
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_fails() {
        let (ciphertext, nonce) = encrypt("secret", &key()).unwrap();
        let other = vec![9u8; KEY_SIZE];
        assert!(decrypt(&ciphertext, &nonce, &other).is_err());
    }

    #[test]
    fn test_validate_key() {
        let good = BASE64.encode([0u8; 32]);
        assert_eq!(validate_key(&good).unwrap().len(), 32);
        assert!(validate_key("short").is_err());
        assert!(validate_key(&BASE64.encode([0u8; 16])).is_err());
    }
}
