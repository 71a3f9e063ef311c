//! Black-box cryptographic primitives for the Meridian chain.
//!
//! Hashing is Blake2b-256; signatures are Ed25519. Nothing here is
//! consensus logic — higher layers only call sign/verify/hash.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi, digest_of, merkle_root};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
