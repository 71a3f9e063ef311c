//! Digest and identifier types.
//!
//! Block ids embed the block number in their first four bytes so that height
//! can be recovered from the id alone, and expose the 32-bit prefix used by
//! transaction TaPoS references.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseDigestError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("expected 32 bytes, got {0}")]
    Length(usize),
}

/// A 256-bit Blake2b digest.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Digest([u8; 32]);

impl Digest {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Digest {
    type Err = ParseDigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| ParseDigestError::Length(bytes.len()))?;
        Ok(Self(arr))
    }
}

/// A block identity: big-endian block number in bytes `0..4`, truncated
/// header digest in bytes `4..32`.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId([u8; 32]);

impl BlockId {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a block id from a header digest and the block's height.
    pub fn from_digest(digest: Digest, num: u32) -> Self {
        let mut bytes = *digest.as_bytes();
        bytes[0..4].copy_from_slice(&num.to_be_bytes());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Recover the block height embedded in this id.
    pub fn num(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// The 32-bit prefix referenced by transaction TaPoS fields.
    pub fn tapos_prefix(&self) -> u32 {
        u32::from_le_bytes([self.0[4], self.0[5], self.0[6], self.0[7]])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId(num={}, ", self.num())?;
        for b in &self.0[4..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A transaction identity — digest of the transaction without signatures.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    pub const ZERO: Self = Self([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<Digest> for TransactionId {
    fn from(d: Digest) -> Self {
        Self(*d.as_bytes())
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "\u{2026})")
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_id_embeds_number() {
        let digest = Digest::new([0xAB; 32]);
        let id = BlockId::from_digest(digest, 0x0102_0304);
        assert_eq!(id.num(), 0x0102_0304);
        assert_eq!(id.as_bytes()[4..], digest.as_bytes()[4..]);
    }

    #[test]
    fn tapos_prefix_reads_bytes_four_to_eight() {
        let mut bytes = [0u8; 32];
        bytes[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let id = BlockId::new(bytes);
        assert_eq!(id.tapos_prefix(), 0xDEAD_BEEF);
    }

    #[test]
    fn digest_hex_round_trip() {
        let d = Digest::new([0x5A; 32]);
        let parsed: Digest = d.to_string().parse().unwrap();
        assert_eq!(d, parsed);
    }

    #[test]
    fn digest_rejects_bad_length() {
        assert!("abcd".parse::<Digest>().is_err());
    }
}
