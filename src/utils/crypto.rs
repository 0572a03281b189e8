use crate::errors::{AppError, Result};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};

/// Symmetric field-level cipher for the sensitive record columns.
///
/// The key is derived once from `FIELD_ENCRYPTION_KEY`; ciphertexts carry a
/// 4-byte checksum of the plaintext so decryption with a wrong key (or a
/// tampered column) is detected instead of returning garbage.
#[derive(Debug, Clone)]
pub struct FieldCipher {
    key: [u8; 32],
}

impl FieldCipher {
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("FIELD_ENCRYPTION_KEY").map_err(|_| {
            AppError::ConfigError("FIELD_ENCRYPTION_KEY must be set in environment".to_string())
        })?;
        Ok(Self::new(&secret))
    }

    pub fn new(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        hasher.update(b"verification_field_salt_v1"); // Version-specific salt
        let key_hash = hasher.finalize();

        let mut key = [0u8; 32];
        key.copy_from_slice(&key_hash);
        Self { key }
    }

    pub fn encrypt(&self, plaintext: &str) -> String {
        let plain_bytes = plaintext.as_bytes();
        let mut encrypted_bytes = Vec::with_capacity(plain_bytes.len() + 4);

        for (i, &byte) in plain_bytes.iter().enumerate() {
            encrypted_bytes.push(byte ^ self.key[i % 32]);
        }

        // Checksum of the plaintext to verify decryption
        let mut checksum_hasher = Sha256::new();
        checksum_hasher.update(plain_bytes);
        let checksum = checksum_hasher.finalize();
        encrypted_bytes.extend_from_slice(&checksum[..4]);

        general_purpose::STANDARD.encode(encrypted_bytes)
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String> {
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AppError::EncryptionError(format!("Invalid ciphertext encoding: {}", e)))?;

        if bytes.len() < 4 {
            return Err(AppError::EncryptionError("Ciphertext too short".to_string()));
        }
        let (payload, stored_checksum) = bytes.split_at(bytes.len() - 4);

        let mut plain_bytes = Vec::with_capacity(payload.len());
        for (i, &byte) in payload.iter().enumerate() {
            plain_bytes.push(byte ^ self.key[i % 32]);
        }

        let mut checksum_hasher = Sha256::new();
        checksum_hasher.update(&plain_bytes);
        let checksum = checksum_hasher.finalize();
        if &checksum[..4] != stored_checksum {
            return Err(AppError::EncryptionError("Ciphertext checksum mismatch".to_string()));
        }

        String::from_utf8(plain_bytes)
            .map_err(|e| AppError::EncryptionError(format!("Decrypted data is not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let cipher = FieldCipher::new("unit-test-key");
        let encrypted = cipher.encrypt("123456789012");
        assert_ne!(encrypted, "123456789012");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "123456789012");
    }

    #[test]
    fn empty_string_round_trips() {
        let cipher = FieldCipher::new("unit-test-key");
        assert_eq!(cipher.decrypt(&cipher.encrypt("")).unwrap(), "");
    }

    #[test]
    fn wrong_key_is_detected() {
        let encrypted = FieldCipher::new("key-a").encrypt("Asha Verma");
        let err = FieldCipher::new("key-b").decrypt(&encrypted);
        assert!(err.is_err());
    }

    #[test]
    fn tampered_ciphertext_is_detected() {
        let cipher = FieldCipher::new("unit-test-key");
        let mut bytes = base64::engine::general_purpose::STANDARD
            .decode(cipher.encrypt("Asha Verma"))
            .unwrap();
        bytes[0] ^= 0xff;
        let tampered = base64::engine::general_purpose::STANDARD.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn garbage_input_is_an_error_not_a_panic() {
        let cipher = FieldCipher::new("unit-test-key");
        assert!(cipher.decrypt("not base64 at all!!!").is_err());
        assert!(cipher.decrypt("AAA=").is_err());
    }
}
