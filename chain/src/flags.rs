//! Skip flags: a bitmask toggling named checks.
//!
//! Used for fast replay and initial sync, for self-generated blocks (a
//! producer need not re-verify its own work), and for trial validation.

use std::ops::{BitOr, BitOrAssign};

/// Bitmask over individually skippable validation checks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SkipFlags(u32);

impl SkipFlags {
    /// Skip nothing.
    pub const NONE: SkipFlags = SkipFlags(0);
    /// Skip block header signature verification.
    pub const SIGNATURE: SkipFlags = SkipFlags(1 << 0);
    /// Skip the transaction merkle-root check.
    pub const MERKLE: SkipFlags = SkipFlags(1 << 1);
    /// Skip the TaPoS reference check.
    pub const TAPOS: SkipFlags = SkipFlags(1 << 2);
    /// Skip transaction authority and signature verification.
    pub const AUTHORITY: SkipFlags = SkipFlags(1 << 3);
    /// Skip the duplicate-transaction check.
    pub const DUPLICATE: SkipFlags = SkipFlags(1 << 4);
    /// Skip the block byte-budget check.
    pub const BLOCK_SIZE: SkipFlags = SkipFlags(1 << 5);
    /// Skip the scheduled-witness identity check.
    pub const WITNESS_SCHEDULE: SkipFlags = SkipFlags(1 << 6);
    /// Skip secret-hash-chain continuity.
    pub const SECRET_CHAIN: SkipFlags = SkipFlags(1 << 7);
    /// Open undo sessions beyond the configured capacity.
    pub const UNDO_CAPACITY: SkipFlags = SkipFlags(1 << 8);

    /// Everything skippable — the preset for replaying known-good blocks.
    pub fn replay() -> SkipFlags {
        Self::SIGNATURE
            | Self::MERKLE
            | Self::TAPOS
            | Self::AUTHORITY
            | Self::DUPLICATE
            | Self::BLOCK_SIZE
            | Self::WITNESS_SCHEDULE
            | Self::SECRET_CHAIN
            | Self::UNDO_CAPACITY
    }

    pub fn contains(&self, other: SkipFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SkipFlags {
    type Output = SkipFlags;

    fn bitor(self, rhs: SkipFlags) -> SkipFlags {
        SkipFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SkipFlags {
    fn bitor_assign(&mut self, rhs: SkipFlags) {
        self.0 |= rhs.0;
    }
}
