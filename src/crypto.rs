use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::{distributions::Alphanumeric, Rng};
use sha2::Sha512;
use thiserror::Error;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("`ENCRYPTION_KEY` is not set, cannot continue")]
    MissingKey,
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("invalid encrypted data")]
    InvalidCiphertext,
}

/// AES-256-GCM with a random nonce prepended to the ciphertext.
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::MissingKey);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = nonce_bytes.to_vec();
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn decrypt(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::MissingKey);
    }
    if data.len() < NONCE_LEN {
        return Err(CryptoError::InvalidCiphertext);
    }
    let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::InvalidCiphertext)
}

/// HMAC-SHA512, used to look tokens up without decrypting them.
pub fn hmac512(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::MissingKey);
    }
    let mut mac = <Hmac<Sha512> as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn md5_sum(data: &[u8]) -> Vec<u8> {
    Md5::digest(data).to_vec()
}

pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A fresh 32 char lowercase hex identifier.
pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> Vec<u8> {
        vec![7u8; 32]
    }

    #[test]
    fn encrypt_then_decrypt() {
        let sealed = encrypt(&key(), b"xoxp-token").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"xoxp-token");
        assert_eq!(decrypt(&key(), &sealed).unwrap(), b"xoxp-token");
    }

    #[test]
    fn decrypt_rejects_tampered_data() {
        let mut sealed = encrypt(&key(), b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xff;
        assert!(matches!(decrypt(&key(), &sealed), Err(CryptoError::InvalidCiphertext)));
        assert!(matches!(decrypt(&key(), &[1, 2, 3]), Err(CryptoError::InvalidCiphertext)));
    }

    #[test]
    fn empty_key_is_refused() {
        assert!(matches!(encrypt(&[], b"x"), Err(CryptoError::MissingKey)));
        assert!(matches!(hmac512(&[], b"x"), Err(CryptoError::MissingKey)));
    }

    #[test]
    fn hmac_is_stable_per_key() {
        let a = hmac512(&key(), b"token").unwrap();
        let b = hmac512(&key(), b"token").unwrap();
        let c = hmac512(&[9u8; 32], b"token").unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn md5_matches_known_digest() {
        assert_eq!(hex::encode(md5_sum(b"")), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn identifiers_have_expected_shape() {
        let id = new_uuid();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        let sid = random_string(32);
        assert_eq!(sid.len(), 32);
        assert!(sid.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
