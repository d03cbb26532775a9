//! Secret envelopes.
//!
//! A fresh 256-bit session key seals the JSON message with
//! ChaCha20-Poly1305; the session key itself is wrapped under the
//! recipient's RSA encryption key. The 12-byte nonce travels as
//! `session_key_iv`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use zeroize::Zeroizing;

use super::keys::{CapabilityKeys, EncryptionKey};
use crate::types::{GuardianError, Result, SecretEnvelope};

/// Session key length (32 bytes)
pub const SESSION_KEY_LEN: usize = 32;

/// Nonce length for ChaCha20-Poly1305 (12 bytes)
pub const NONCE_LEN: usize = 12;

/// Encrypt `message` for the holder of `recipient`
pub fn send_secret(recipient: &EncryptionKey, message: &Value) -> Result<SecretEnvelope> {
    let mut session_key = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    OsRng.fill_bytes(&mut session_key[..]);
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let plaintext = Zeroizing::new(serde_json::to_vec(message)?);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(&session_key[..]));
    let encrypted_message = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
        .map_err(|e| GuardianError::Crypto(format!("message encryption failed: {e}")))?;

    let encrypted_session_key = recipient.encrypt(&session_key[..])?;

    Ok(SecretEnvelope {
        encrypted_session_key: BASE64.encode(encrypted_session_key),
        session_key_iv: BASE64.encode(nonce),
        encrypted_message: BASE64.encode(encrypted_message),
    })
}

/// Open an envelope addressed to `keys`
pub fn recv_secret(keys: &CapabilityKeys, envelope: &SecretEnvelope) -> Result<Value> {
    let wrapped = decode_field("encrypted_session_key", &envelope.encrypted_session_key)?;
    let nonce = decode_field("session_key_iv", &envelope.session_key_iv)?;
    let ciphertext = decode_field("encrypted_message", &envelope.encrypted_message)?;

    if nonce.len() != NONCE_LEN {
        return Err(GuardianError::Crypto(format!(
            "invalid session key iv length: expected {}, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }

    let session_key = Zeroizing::new(keys.decrypt(&wrapped)?);
    if session_key.len() != SESSION_KEY_LEN {
        return Err(GuardianError::Crypto("invalid session key length".into()));
    }

    let cipher = ChaCha20Poly1305::new(Key::from_slice(session_key.as_slice()));
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
            .map_err(|_| GuardianError::Crypto("failed to decrypt message".into()))?,
    );

    Ok(serde_json::from_slice(&plaintext)?)
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| GuardianError::Crypto(format!("invalid {name} encoding: {e}")))
}
