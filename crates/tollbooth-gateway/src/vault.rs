//! Credential vault: authenticated encryption of provider API keys at rest.
//!
//! AES-256-GCM with a random 16-byte nonce per call and a 16-byte tag.
//! Stored ciphertext format: `nonce:tag:data` (colon-joined hex). Decryption
//! fails closed: any tag mismatch, malformed format or wrong key yields
//! [`VaultError::Corrupted`], never partial plaintext.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

/// AES-256-GCM with a 16-byte nonce.
type VaultCipher = AesGcm<Aes256, U16>;

const NONCE_LEN: usize = 16;
const TAG_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Ciphertext failed to decrypt. Deliberately carries no detail.
    #[error("credential ciphertext is corrupted or was encrypted with a different key")]
    Corrupted,

    #[error("encryption failed")]
    EncryptionFailed,
}

/// Process-wide credential cipher. The key is loaded once at startup and
/// immutable afterwards.
pub struct CredentialVault {
    cipher: VaultCipher,
}

impl CredentialVault {
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = VaultCipher::new_from_slice(key).expect("32-byte key");
        Self { cipher }
    }

    /// Encrypt a credential, producing `nonce:tag:data` hex.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(aes_gcm::Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        // aes-gcm appends the tag to the ciphertext; store it separately.
        let (data, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(data)
        ))
    }

    /// Decrypt a `nonce:tag:data` hex ciphertext back to the credential.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, VaultError> {
        let mut parts = ciphertext.splitn(3, ':');
        let nonce = parts
            .next()
            .and_then(|p| hex::decode(p).ok())
            .ok_or(VaultError::Corrupted)?;
        let tag = parts
            .next()
            .and_then(|p| hex::decode(p).ok())
            .ok_or(VaultError::Corrupted)?;
        let data = parts
            .next()
            .and_then(|p| hex::decode(p).ok())
            .ok_or(VaultError::Corrupted)?;

        if nonce.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(VaultError::Corrupted);
        }

        let mut sealed = data;
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(aes_gcm::Nonce::from_slice(&nonce), sealed.as_slice())
            .map_err(|_| VaultError::Corrupted)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::Corrupted)
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new(&[7u8; 32])
    }

    #[test]
    fn test_roundtrip() {
        let v = vault();
        for secret in ["sk-test-12345", "x", "пароль", "a b c : d"] {
            let ct = v.encrypt(secret).unwrap();
            assert_eq!(v.decrypt(&ct).unwrap(), secret);
        }
    }

    #[test]
    fn test_ciphertext_format() {
        let v = vault();
        let ct = v.encrypt("secret").unwrap();
        let parts: Vec<&str> = ct.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), NONCE_LEN * 2);
        assert_eq!(parts[1].len(), TAG_LEN * 2);
    }

    #[test]
    fn test_nonce_is_random() {
        let v = vault();
        assert_ne!(v.encrypt("same").unwrap(), v.encrypt("same").unwrap());
    }

    #[test]
    fn test_bitflip_fails_closed() {
        let v = vault();
        let ct = v.encrypt("secret credential").unwrap();
        // Flip one bit in every hex position; decrypt must never succeed
        for i in 0..ct.len() {
            if ct.as_bytes()[i] == b':' {
                continue;
            }
            let mut tampered: Vec<u8> = ct.bytes().collect();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == ct {
                continue;
            }
            assert!(
                v.decrypt(&tampered).is_err(),
                "bit-flip at {i} decrypted successfully"
            );
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let ct = vault().encrypt("secret").unwrap();
        let other = CredentialVault::new(&[8u8; 32]);
        assert!(matches!(other.decrypt(&ct), Err(VaultError::Corrupted)));
    }

    #[test]
    fn test_malformed_inputs_fail() {
        let v = vault();
        for bad in ["", "abc", "xx:yy:zz", "00:11", "0011:2233:4455"] {
            assert!(v.decrypt(bad).is_err(), "{bad:?} decrypted");
        }
    }

}
