//! Capability key material.
//!
//! # Algorithms
//!
//! - **Signing**: Ed25519
//! - **Key wrapping**: RSA-2048 with OAEP/SHA-256
//!
//! Public keys travel as text: the verifying key as base64, the encryption
//! key as SPKI PEM.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::types::{GuardianError, Result};

// =============================================================================
// Constants
// =============================================================================

/// RSA modulus size for capability encryption keys
pub const RSA_KEY_BITS: usize = 2048;

/// Ed25519 private key length (32 bytes)
pub const SIGNING_KEY_LEN: usize = 32;

// =============================================================================
// Encryption key (public half)
// =============================================================================

/// Recipient key for [`send_secret`](super::envelope::send_secret)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey(RsaPublicKey);

impl EncryptionKey {
    pub fn from_pem(pem: &str) -> Result<Self> {
        RsaPublicKey::from_public_key_pem(pem.trim())
            .map(Self)
            .map_err(|e| GuardianError::Crypto(format!("invalid encryption key: {e}")))
    }

    pub fn to_pem(&self) -> Result<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| GuardianError::Crypto(format!("encoding encryption key failed: {e}")))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.0
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| GuardianError::Crypto(format!("encryption failed: {e}")))
    }
}

// =============================================================================
// Capability keys
// =============================================================================

/// Signing and decryption keys held by the guardian for one minted identity
#[derive(Clone)]
pub struct CapabilityKeys {
    signing_key: SigningKey,
    decryption_key: RsaPrivateKey,
    encryption_key: EncryptionKey,
}

impl std::fmt::Debug for CapabilityKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityKeys")
            .field("verifying_key", &self.verifying_key())
            .finish_non_exhaustive()
    }
}

/// Persisted form of [`CapabilityKeys`]
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SerializedCapabilityKeys {
    /// Ed25519 private key, base64
    pub signing_key: String,
    /// RSA private key, PKCS#8 PEM
    pub decryption_key: String,
}

impl CapabilityKeys {
    /// Generate a fresh signing and decryption key pair
    pub fn create_new_keys() -> Result<Self> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let decryption_key = RsaPrivateKey::new(&mut OsRng, RSA_KEY_BITS)
            .map_err(|e| GuardianError::Crypto(format!("RSA key generation failed: {e}")))?;
        Ok(Self::from_parts(signing_key, decryption_key))
    }

    fn from_parts(signing_key: SigningKey, decryption_key: RsaPrivateKey) -> Self {
        let encryption_key = EncryptionKey(decryption_key.to_public_key());
        Self {
            signing_key,
            decryption_key,
            encryption_key,
        }
    }

    pub fn serialize(&self) -> Result<SerializedCapabilityKeys> {
        let decryption_key = self
            .decryption_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| GuardianError::Crypto(format!("encoding decryption key failed: {e}")))?;

        Ok(SerializedCapabilityKeys {
            signing_key: BASE64.encode(self.signing_key.to_bytes()),
            decryption_key: decryption_key.to_string(),
        })
    }

    pub fn deserialize(serialized: &SerializedCapabilityKeys) -> Result<Self> {
        let mut bytes = BASE64
            .decode(&serialized.signing_key)
            .map_err(|e| GuardianError::Crypto(format!("invalid signing key encoding: {e}")))?;

        if bytes.len() != SIGNING_KEY_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(GuardianError::Crypto(format!(
                "invalid signing key length: expected {}, got {}",
                SIGNING_KEY_LEN, len
            )));
        }

        let mut key = [0u8; SIGNING_KEY_LEN];
        key.copy_from_slice(&bytes);
        bytes.zeroize();
        let signing_key = SigningKey::from_bytes(&key);
        key.zeroize();

        let decryption_key = RsaPrivateKey::from_pkcs8_pem(&serialized.decryption_key)
            .map_err(|e| GuardianError::Crypto(format!("invalid decryption key: {e}")))?;

        Ok(Self::from_parts(signing_key, decryption_key))
    }

    /// Ed25519 verifying key, base64
    pub fn verifying_key(&self) -> String {
        BASE64.encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// Encryption key as SPKI PEM
    pub fn encryption_key_pem(&self) -> Result<String> {
        self.encryption_key.to_pem()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encryption_key.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decryption_key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| GuardianError::Crypto("failed to decrypt session key".into()))
    }

    /// Sign a message, returning a base64 signature
    pub fn sign(&self, message: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(message);
        BASE64.encode(signature.to_bytes())
    }
}

/// Verify a base64 Ed25519 signature against a base64 verifying key
pub fn verify_signature(verifying_key: &str, message: &[u8], signature: &str) -> Result<bool> {
    let key_bytes: [u8; 32] = BASE64
        .decode(verifying_key)
        .map_err(|e| GuardianError::Crypto(format!("invalid verifying key encoding: {e}")))?
        .try_into()
        .map_err(|_| GuardianError::Crypto("invalid verifying key length".into()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| GuardianError::Crypto(format!("invalid verifying key: {e}")))?;

    let sig_bytes: [u8; 64] = BASE64
        .decode(signature)
        .map_err(|e| GuardianError::Crypto(format!("invalid signature encoding: {e}")))?
        .try_into()
        .map_err(|_| GuardianError::Crypto("invalid signature length".into()))?;
    let signature = Signature::from_bytes(&sig_bytes);

    Ok(key.verify(message, &signature).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt() {
        let keys = CapabilityKeys::create_new_keys().unwrap();
        let ciphertext = keys.encrypt(b"session key bytes").unwrap();
        assert_eq!(keys.decrypt(&ciphertext).unwrap(), b"session key bytes");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let keys = CapabilityKeys::create_new_keys().unwrap();
        let serialized = keys.serialize().unwrap();
        let restored = CapabilityKeys::deserialize(&serialized).unwrap();

        assert_eq!(keys.verifying_key(), restored.verifying_key());
        assert_eq!(
            keys.encryption_key_pem().unwrap(),
            restored.encryption_key_pem().unwrap()
        );

        let ciphertext = keys.encrypt(b"hello").unwrap();
        assert_eq!(restored.decrypt(&ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_public_key_from_pem() {
        let keys = CapabilityKeys::create_new_keys().unwrap();
        let public = EncryptionKey::from_pem(&keys.encryption_key_pem().unwrap()).unwrap();
        let ciphertext = public.encrypt(b"for the holder").unwrap();
        assert_eq!(keys.decrypt(&ciphertext).unwrap(), b"for the holder");
    }

    #[test]
    fn test_wrong_key_fails() {
        let alice = CapabilityKeys::create_new_keys().unwrap();
        let bob = CapabilityKeys::create_new_keys().unwrap();
        let ciphertext = alice.encrypt(b"secret").unwrap();
        assert!(bob.decrypt(&ciphertext).is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = CapabilityKeys::create_new_keys().unwrap();
        let signature = keys.sign(b"provisioned");
        assert!(verify_signature(&keys.verifying_key(), b"provisioned", &signature).unwrap());
        assert!(!verify_signature(&keys.verifying_key(), b"tampered", &signature).unwrap());
    }

    #[test]
    fn test_invalid_serialized_keys() {
        let bad = SerializedCapabilityKeys {
            signing_key: BASE64.encode([1u8; 5]),
            decryption_key: "not a pem".into(),
        };
        assert!(CapabilityKeys::deserialize(&bad).is_err());
        assert!(EncryptionKey::from_pem("garbage").is_err());
    }
}
