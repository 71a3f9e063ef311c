//! Weighted authority structures.
//!
//! An authority is satisfied when the weights of the provided keys (plus
//! recursively satisfied account authorities) reach its threshold. The
//! recursive walk is bounded by the chain's max authority depth and lives
//! in `meridian-chain`; this module is pure data and structural checks.

use crate::error::ProtocolError;
use meridian_types::{AccountName, PublicKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A threshold multi-signature authority over keys and other accounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authority {
    pub weight_threshold: u32,
    /// Accounts whose *active* authority contributes the mapped weight.
    pub account_auths: BTreeMap<AccountName, u16>,
    /// Keys contributing the mapped weight when they signed.
    pub key_auths: BTreeMap<PublicKey, u16>,
}

impl Authority {
    /// An authority satisfied by a single key.
    pub fn single_key(key: PublicKey) -> Self {
        let mut key_auths = BTreeMap::new();
        key_auths.insert(key, 1);
        Self {
            weight_threshold: 1,
            account_auths: BTreeMap::new(),
            key_auths,
        }
    }

    /// The open authority: threshold zero, satisfied by anyone.
    ///
    /// Only the reserved temporary account carries this.
    pub fn open() -> Self {
        Self {
            weight_threshold: 0,
            account_auths: BTreeMap::new(),
            key_auths: BTreeMap::new(),
        }
    }

    /// Trivially satisfied without any signature.
    pub fn is_trivial(&self) -> bool {
        self.weight_threshold == 0
    }

    /// Whether no combination of entries can reach the threshold.
    pub fn is_impossible(&self) -> bool {
        let total: u64 = self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .map(|w| u64::from(*w))
            .sum();
        total < u64::from(self.weight_threshold)
    }

    /// Structural validation for authorities supplied by operations.
    ///
    /// User-supplied authorities must be satisfiable and must not be open;
    /// zero-weight entries are dead weight and rejected.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.is_trivial() {
            return Err(ProtocolError::InvalidAuthority {
                reason: "threshold must be non-zero".into(),
            });
        }
        if self.is_impossible() {
            return Err(ProtocolError::InvalidAuthority {
                reason: "threshold unreachable by listed weights".into(),
            });
        }
        if self
            .account_auths
            .values()
            .chain(self.key_auths.values())
            .any(|w| *w == 0)
        {
            return Err(ProtocolError::InvalidAuthority {
                reason: "zero-weight entry".into(),
            });
        }
        Ok(())
    }
}
