//! Signed value-transfer records.
//!
//! A transaction's content hash is SHA-256 over a length-prefixed encoding of
//! sender, recipient, amount and timestamp (`<len>:<field>` per field), hex
//! encoded. The prefixes keep distinct field splits from colliding
//! ("1"+"23" vs "12"+"3"). The signature is never part of the hash, so the
//! hash is the same before and after signing.
//!
//! Signatures are RSA-PSS with MGF1-SHA256 and the largest salt the key
//! allows, computed over the hex hash string, and stored base64 encoded.

pub mod keys;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rsa::traits::PublicKeyParts;
use rsa::{Pss, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::p2p::messages::TransactionPayload;

pub use keys::{generate_keypair, KeyPair};

const SHA256_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: f64,
    pub timestamp: i64,
    pub signature: Option<String>,
}

impl Transaction {
    /// Unsigned transaction stamped with the current Unix time.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: f64) -> Self {
        Self::with_timestamp(sender, recipient, amount, chrono::Utc::now().timestamp())
    }

    pub fn with_timestamp(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
            timestamp,
            signature: None,
        }
    }

    pub fn calculate_hash(&self) -> String {
        let amount = self.amount.to_string();
        let timestamp = self.timestamp.to_string();

        let mut hasher = Sha256::new();
        for field in [&self.sender, &self.recipient, &amount, &timestamp] {
            hasher.update(field.len().to_string().as_bytes());
            hasher.update(b":");
            hasher.update(field.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Sign the content hash and store the encoded signature.
    pub fn sign(&mut self, private_key: &RsaPrivateKey) -> Result<()> {
        let digest = Sha256::digest(self.calculate_hash().as_bytes());
        let padding = Pss::new_with_salt::<Sha256>(max_salt_len(private_key));
        let sig = private_key.sign_with_rng(&mut rand::thread_rng(), padding, &digest)?;
        self.signature = Some(BASE64.encode(sig));
        Ok(())
    }

    /// Check the stored signature against the current field values.
    ///
    /// Never errors: a missing, undecodable or wrong signature is just `false`.
    pub fn verify(&self, public_key: &RsaPublicKey) -> bool {
        let Some(encoded) = self.signature.as_deref() else {
            return false;
        };
        let Ok(sig) = BASE64.decode(encoded) else {
            return false;
        };

        let digest = Sha256::digest(self.calculate_hash().as_bytes());
        let padding = Pss::new_with_salt::<Sha256>(max_salt_len(public_key));
        public_key.verify(padding, &digest, &sig).is_ok()
    }

    /// Verify against the key carried in `sender`, read as a PEM public key.
    pub fn verify_with_sender_key(&self) -> bool {
        match keys::public_key_from_pem(&self.sender) {
            Ok(key) => self.verify(&key),
            Err(_) => false,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Wire form, keyed by the content hash.
    pub fn to_payload(&self) -> TransactionPayload {
        TransactionPayload {
            id: self.calculate_hash(),
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            amount: self.amount,
            timestamp: self.timestamp,
            signature: self.signature.clone(),
        }
    }

    pub fn from_payload(payload: &TransactionPayload) -> Self {
        Self {
            sender: payload.sender.clone(),
            recipient: payload.recipient.clone(),
            amount: payload.amount,
            timestamp: payload.timestamp,
            signature: payload.signature.clone(),
        }
    }
}

/// emLen - hLen - 2, the PSS maximum for this modulus.
fn max_salt_len<K: PublicKeyParts>(key: &K) -> usize {
    let em_bits = key.n().bits().saturating_sub(1);
    let em_len = (em_bits + 7) / 8;
    em_len.saturating_sub(SHA256_LEN + 2)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::OnceLock;

    pub(crate) fn test_keys() -> &'static KeyPair {
        static KEYS: OnceLock<KeyPair> = OnceLock::new();
        KEYS.get_or_init(|| keys::generate_keypair_with_bits(1024).unwrap())
    }

    fn signed_tx() -> Transaction {
        let mut tx = Transaction::with_timestamp("alice", "bob", 12.5, 1_700_000_000);
        tx.sign(test_keys().private_key()).unwrap();
        tx
    }

    #[test]
    fn test_sign_then_verify() {
        let tx = signed_tx();
        assert!(tx.is_signed());
        assert!(tx.verify(test_keys().public_key()));
    }

    #[test]
    fn test_hash_stable_across_signing() {
        let mut tx = Transaction::with_timestamp("alice", "bob", 1.0, 42);
        let before = tx.calculate_hash();
        tx.sign(test_keys().private_key()).unwrap();
        assert_eq!(before, tx.calculate_hash());
    }

    #[test]
    fn test_unsigned_does_not_verify() {
        let tx = Transaction::with_timestamp("alice", "bob", 1.0, 42);
        assert!(!tx.verify(test_keys().public_key()));
    }

    #[test]
    fn test_mutation_after_signing_fails() {
        let key = test_keys().public_key();

        let mut tx = signed_tx();
        tx.sender = "mallory".into();
        assert!(!tx.verify(key));

        let mut tx = signed_tx();
        tx.recipient = "mallory".into();
        assert!(!tx.verify(key));

        let mut tx = signed_tx();
        tx.amount = 1250.0;
        assert!(!tx.verify(key));

        let mut tx = signed_tx();
        tx.timestamp += 1;
        assert!(!tx.verify(key));
    }

    #[test]
    fn test_corrupt_signature_is_false() {
        let mut tx = signed_tx();
        tx.signature = Some("%%% not base64 %%%".into());
        assert!(!tx.verify(test_keys().public_key()));

        let mut tx = signed_tx();
        tx.signature = Some(BASE64.encode(b"short"));
        assert!(!tx.verify(test_keys().public_key()));
    }

    #[test]
    fn test_wrong_key_is_false() {
        let other = keys::generate_keypair_with_bits(1024).unwrap();
        assert!(!signed_tx().verify(other.public_key()));
    }

    #[test]
    fn test_verify_with_sender_key() {
        let kp = test_keys();
        let mut tx = Transaction::new(kp.public_key_pem().unwrap(), "bob", 3.0);
        tx.sign(kp.private_key()).unwrap();
        assert!(tx.verify_with_sender_key());

        let mut plain = signed_tx();
        plain.sender = "not-a-pem".into();
        assert!(!plain.verify_with_sender_key());
    }

    #[test]
    fn test_field_split_does_not_collide() {
        let a = Transaction::with_timestamp("1", "23", 5.0, 0);
        let b = Transaction::with_timestamp("12", "3", 5.0, 0);
        assert_ne!(a.calculate_hash(), b.calculate_hash());
    }

    #[test]
    fn test_payload_carries_hash_as_id() {
        let tx = signed_tx();
        let payload = tx.to_payload();
        assert_eq!(payload.id, tx.calculate_hash());
        assert_eq!(Transaction::from_payload(&payload), tx);
    }

    proptest! {
        #[test]
        fn prop_hash_is_pure(sender in ".{0,16}", recipient in ".{0,16}", amount in -1e9f64..1e9, ts in any::<i64>()) {
            let a = Transaction::with_timestamp(sender.clone(), recipient.clone(), amount, ts);
            let b = Transaction::with_timestamp(sender, recipient, amount, ts);
            prop_assert_eq!(a.calculate_hash(), b.calculate_hash());
            prop_assert_eq!(a.calculate_hash().len(), 64);
        }

        #[test]
        fn prop_any_field_change_changes_hash(sender in "[a-z]{1,8}", recipient in "[a-z]{1,8}", amount in 0.0f64..1e6, ts in 0i64..i64::MAX) {
            let base = Transaction::with_timestamp(sender.clone(), recipient.clone(), amount, ts);
            let h = base.calculate_hash();

            let mut t = base.clone();
            t.sender.push('x');
            prop_assert_ne!(&h, &t.calculate_hash());

            let mut t = base.clone();
            t.recipient.push('x');
            prop_assert_ne!(&h, &t.calculate_hash());

            let mut t = base.clone();
            t.amount += 1.0;
            prop_assert_ne!(&h, &t.calculate_hash());

            let mut t = base;
            t.timestamp = t.timestamp.wrapping_add(1);
            prop_assert_ne!(&h, &t.calculate_hash());
        }
    }
}
