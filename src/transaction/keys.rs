//! RSA key material for signing transactions.
//!
//! Public keys travel as SubjectPublicKeyInfo PEM so a transaction's
//! `sender` field can carry the key that signed it.

use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use crate::error::{NodeError, Result};

pub const DEFAULT_KEY_BITS: usize = 2048;

/// A signer's private key together with its public half.
#[derive(Clone)]
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn public_key_pem(&self) -> Result<String> {
        public_key_to_pem(&self.public)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

/// Generate an RSA-2048 key pair (public exponent 65537).
pub fn generate_keypair() -> Result<KeyPair> {
    generate_keypair_with_bits(DEFAULT_KEY_BITS)
}

pub fn generate_keypair_with_bits(bits: usize) -> Result<KeyPair> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, bits)?;
    let public = RsaPublicKey::from(&private);
    Ok(KeyPair { private, public })
}

pub fn public_key_to_pem(key: &RsaPublicKey) -> Result<String> {
    key.to_public_key_pem(LineEnding::LF)
        .map_err(|e| NodeError::Crypto(format!("encode public key: {e}")))
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|e| NodeError::Crypto(format!("decode public key: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pem_roundtrip() {
        let kp = generate_keypair_with_bits(1024).unwrap();
        let pem = kp.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let decoded = public_key_from_pem(&pem).unwrap();
        assert_eq!(&decoded, kp.public_key());
    }

    #[test]
    fn test_bad_pem_is_crypto_error() {
        let err = public_key_from_pem("not a key").unwrap_err();
        assert!(matches!(err, NodeError::Crypto(_)));
    }
}
