//! Blake2b hashing for blocks, transactions and merkle roots.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest as _};
use meridian_types::Digest;

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash serialized bytes into a [`Digest`].
pub fn digest_of(bytes: &[u8]) -> Digest {
    Digest::new(blake2b_256(bytes))
}

/// Binary merkle root over a list of leaf digests.
///
/// Odd levels carry the last node up unpaired. An empty list hashes to the
/// zero digest.
pub fn merkle_root(leaves: &[Digest]) -> Digest {
    if leaves.is_empty() {
        return Digest::ZERO;
    }
    let mut level: Vec<Digest> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(Digest::new(blake2b_256_multi(&[
                    pair[0].as_bytes(),
                    pair[1].as_bytes(),
                ])));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let h1 = blake2b_256(b"hello meridian");
        let h2 = blake2b_256(b"hello meridian");
        assert_eq!(h1, h2);
    }

    #[test]
    fn blake2b_different_inputs() {
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn blake2b_multi_equivalent() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn merkle_of_empty_is_zero() {
        assert_eq!(merkle_root(&[]), Digest::ZERO);
    }

    #[test]
    fn merkle_of_one_is_the_leaf() {
        let leaf = digest_of(b"only");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn merkle_sensitive_to_order() {
        let a = digest_of(b"a");
        let b = digest_of(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn merkle_odd_count() {
        let leaves: Vec<Digest> = [b"a", b"b", b"c"].iter().map(|l| digest_of(*l)).collect();
        let ab = Digest::new(blake2b_256_multi(&[
            leaves[0].as_bytes(),
            leaves[1].as_bytes(),
        ]));
        let expected = Digest::new(blake2b_256_multi(&[ab.as_bytes(), leaves[2].as_bytes()]));
        assert_eq!(merkle_root(&leaves), expected);
    }
}
