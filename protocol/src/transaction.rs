//! Signed transactions and their identity.
//!
//! A transaction binds an ordered operation list to a recent block (TaPoS)
//! and an expiration time. Its id is the digest of the payload without
//! signatures; signing digests are domain-separated by the chain id so a
//! transaction signed for one network is invalid on every other.

use crate::error::ProtocolError;
use crate::operation::Operation;
use meridian_crypto::{blake2b_256_multi, digest_of, sign_message, verify_signature};
use meridian_types::{Digest, PrivateKey, PublicKey, Signature, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The unsigned transaction payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Low 16 bits of the referenced block's height.
    pub ref_block_num: u16,
    /// Id prefix of the referenced block.
    pub ref_block_prefix: u32,
    pub expiration: Timestamp,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Transaction identity — digest of the payload without signatures.
    pub fn id(&self) -> TransactionId {
        let bytes = bincode::serialize(self).expect("transaction serialization cannot fail");
        TransactionId::from(digest_of(&bytes))
    }

    /// The digest a signature must cover, bound to `chain_id`.
    pub fn signing_digest(&self, chain_id: &Digest) -> Digest {
        let bytes = bincode::serialize(self).expect("transaction serialization cannot fail");
        Digest::new(blake2b_256_multi(&[chain_id.as_bytes(), &bytes]))
    }
}

/// One signature plus the public key that produced it.
///
/// Ed25519 offers no key recovery, so the signer's key travels with the
/// signature and is checked against the covered digest before the key is
/// allowed to count toward any authority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub key: PublicKey,
    pub signature: Signature,
}

/// A transaction with its signatures.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub trx: Transaction,
    pub signatures: Vec<TransactionSignature>,
}

impl SignedTransaction {
    pub fn id(&self) -> TransactionId {
        self.trx.id()
    }

    /// Digest including signatures, used for merkle leaves.
    pub fn merkle_digest(&self) -> Digest {
        let bytes = bincode::serialize(self).expect("transaction serialization cannot fail");
        digest_of(&bytes)
    }

    /// Append a signature over the chain-bound digest.
    pub fn sign(&mut self, chain_id: &Digest, key: &PrivateKey) {
        let digest = self.trx.signing_digest(chain_id);
        let public = meridian_crypto::public_from_private(key);
        self.signatures.push(TransactionSignature {
            key: public,
            signature: sign_message(digest.as_bytes(), key),
        });
    }

    /// The set of keys whose signatures actually verify against the digest.
    pub fn signed_keys(&self, chain_id: &Digest) -> BTreeSet<PublicKey> {
        let digest = self.trx.signing_digest(chain_id);
        self.signatures
            .iter()
            .filter(|s| verify_signature(digest.as_bytes(), &s.signature, &s.key))
            .map(|s| s.key)
            .collect()
    }

    /// Serialized size in bytes, used against the block byte budget.
    pub fn serialized_size(&self) -> u64 {
        bincode::serialized_size(self).expect("transaction serialization cannot fail")
    }

    /// Stateless structural self-validation.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.trx.operations.is_empty() {
            return Err(ProtocolError::EmptyTransaction);
        }
        for op in &self.trx.operations {
            op.validate()?;
        }
        let mut seen = BTreeSet::new();
        for sig in &self.signatures {
            if !seen.insert(sig.key) {
                return Err(ProtocolError::DuplicateSignature);
            }
        }
        Ok(())
    }
}
