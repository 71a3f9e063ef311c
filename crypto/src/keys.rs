//! Ed25519 key generation.

use ed25519_dalek::SigningKey;
use meridian_types::{KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;

/// Generate a new Ed25519 key pair from a secure random source.
pub fn generate_keypair() -> KeyPair {
    let signing_key = SigningKey::generate(&mut OsRng);
    let verifying_key = signing_key.verifying_key();
    KeyPair {
        public: PublicKey(verifying_key.to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

/// Derive the public key from a private key.
pub fn public_from_private(private: &PrivateKey) -> PublicKey {
    let signing_key = SigningKey::from_bytes(&private.0);
    PublicKey(signing_key.verifying_key().to_bytes())
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let public = public_from_private(&private);
    KeyPair { public, private }
}

/// Derive a key pair from a 32-byte seed (deterministic).
///
/// Used for witness signing keys derived from a node secret, and by tests
/// for reproducible identities.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    let signing_key = SigningKey::from_bytes(seed);
    KeyPair {
        public: PublicKey(signing_key.verifying_key().to_bytes()),
        private: PrivateKey(signing_key.to_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_derivation_deterministic() {
        let a = keypair_from_seed(&[7u8; 32]);
        let b = keypair_from_seed(&[7u8; 32]);
        assert_eq!(a.public, b.public);
    }

    #[test]
    fn different_seeds_different_keys() {
        let a = keypair_from_seed(&[1u8; 32]);
        let b = keypair_from_seed(&[2u8; 32]);
        assert_ne!(a.public, b.public);
    }

    #[test]
    fn public_matches_keypair() {
        let kp = keypair_from_seed(&[9u8; 32]);
        assert_eq!(public_from_private(&kp.private), kp.public);
    }
}
