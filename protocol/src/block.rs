//! Block headers and signed blocks.
//!
//! A block's identity is the digest of its signed header with the height
//! spliced into the first four bytes, so ids sort and link by number. The
//! header carries the secret hash chain: each block reveals the secret
//! committed by the producer's previous block and commits to the next one.

use crate::transaction::SignedTransaction;
use meridian_crypto::{blake2b_256_multi, digest_of, merkle_root, sign_message, verify_signature};
use meridian_types::{AccountName, BlockId, Digest, PrivateKey, PublicKey, Signature, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous: BlockId,
    pub timestamp: Timestamp,
    pub witness: AccountName,
    pub transaction_merkle_root: Digest,
    /// Reveal of the secret this witness committed to in its last block.
    pub previous_secret: Digest,
    /// Commitment to the secret revealed by this witness's next block.
    pub next_secret_hash: Digest,
}

impl BlockHeader {
    /// Height of the block carrying this header.
    pub fn num(&self) -> u32 {
        self.previous.num() + 1
    }

    /// The digest the witness signature must cover, bound to `chain_id`.
    pub fn signing_digest(&self, chain_id: &Digest) -> Digest {
        let bytes = bincode::serialize(self).expect("header serialization cannot fail");
        Digest::new(blake2b_256_multi(&[chain_id.as_bytes(), &bytes]))
    }
}

/// A complete block: signed header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedBlock {
    pub header: BlockHeader,
    pub witness_signature: Signature,
    pub transactions: Vec<SignedTransaction>,
}

impl SignedBlock {
    pub fn num(&self) -> u32 {
        self.header.num()
    }

    /// Block identity: digest over header + signature, height in the first
    /// four bytes.
    pub fn id(&self) -> BlockId {
        let header_bytes =
            bincode::serialize(&self.header).expect("header serialization cannot fail");
        let digest = Digest::new(blake2b_256_multi(&[
            &header_bytes,
            self.witness_signature.as_bytes(),
        ]));
        BlockId::from_digest(digest, self.num())
    }

    /// Merkle root over the contained transactions.
    pub fn compute_merkle_root(&self) -> Digest {
        let leaves: Vec<Digest> = self.transactions.iter().map(|t| t.merkle_digest()).collect();
        merkle_root(&leaves)
    }

    /// Sign the header in place.
    pub fn sign(&mut self, chain_id: &Digest, key: &PrivateKey) {
        let digest = self.header.signing_digest(chain_id);
        self.witness_signature = sign_message(digest.as_bytes(), key);
    }

    /// Check the witness signature against `signing_key`.
    pub fn verify_signer(&self, chain_id: &Digest, signing_key: &PublicKey) -> bool {
        let digest = self.header.signing_digest(chain_id);
        verify_signature(digest.as_bytes(), &self.witness_signature, signing_key)
    }

    /// Serialized size in bytes, checked against the block byte budget.
    pub fn serialized_size(&self) -> u64 {
        bincode::serialized_size(self).expect("block serialization cannot fail")
    }
}

/// Commit digest for a production secret.
pub fn secret_hash(secret: &Digest) -> Digest {
    digest_of(secret.as_bytes())
}

/// Deterministic production secret for the block following
/// `last_block_num`, derived from the witness's signing key.
///
/// A witness that has produced nothing yet reveals the zero secret, which
/// every fresh witness registration commits to.
pub fn derive_production_secret(key: &PrivateKey, last_block_num: u32) -> Digest {
    if last_block_num == 0 {
        return Digest::ZERO;
    }
    Digest::new(blake2b_256_multi(&[
        &key.0,
        b"production-secret",
        &last_block_num.to_le_bytes(),
    ]))
}
