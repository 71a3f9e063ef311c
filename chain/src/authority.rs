//! Transaction authority verification.
//!
//! Resolves the accounts each operation requires, then checks that the
//! transaction's verified signing keys satisfy the corresponding weighted
//! authorities. Account-to-account authority edges are followed
//! recursively up to the configured depth, guarding against cyclic or
//! oversized authority graphs. Every provided signature must contribute
//! somewhere, or the transaction is rejected as over-signed.

use crate::error::{AuthorityError, ChainError};
use meridian_protocol::{Authority, SignedTransaction};
use meridian_store::ObjectStore;
use meridian_types::{AccountName, Digest, PublicKey};
use std::collections::BTreeSet;

/// Verify every authority the transaction's operations require.
pub fn verify_authority(
    store: &ObjectStore,
    trx: &SignedTransaction,
    chain_id: &Digest,
    max_depth: u32,
) -> Result<(), ChainError> {
    let mut required_active: Vec<AccountName> = Vec::new();
    let mut required_owner: Vec<AccountName> = Vec::new();
    for op in &trx.trx.operations {
        op.required_authorities(&mut required_active, &mut required_owner);
    }

    let signed = trx.signed_keys(chain_id);
    let mut used: BTreeSet<PublicKey> = BTreeSet::new();

    for account in &required_owner {
        let owner = authority_of(store, account, Tier::Owner)?;
        if !satisfies(store, &owner, &signed, max_depth, &mut used)? {
            return Err(AuthorityError::Insufficient {
                account: account.clone(),
            }
            .into());
        }
    }

    for account in &required_active {
        let active = authority_of(store, account, Tier::Active)?;
        if satisfies(store, &active, &signed, max_depth, &mut used)? {
            continue;
        }
        // The owner authority may stand in for active.
        let owner = authority_of(store, account, Tier::Owner)?;
        if satisfies(store, &owner, &signed, max_depth, &mut used)? {
            continue;
        }
        return Err(AuthorityError::Insufficient {
            account: account.clone(),
        }
        .into());
    }

    for key in &signed {
        if !used.contains(key) {
            return Err(AuthorityError::IrrelevantSignature { key: *key }.into());
        }
    }
    Ok(())
}

enum Tier {
    Owner,
    Active,
}

fn authority_of(
    store: &ObjectStore,
    account: &AccountName,
    tier: Tier,
) -> Result<Authority, ChainError> {
    let (_, acct) = store
        .find_account(account)
        .ok_or_else(|| AuthorityError::Insufficient {
            account: account.clone(),
        })?;
    Ok(match tier {
        Tier::Owner => acct.owner.clone(),
        Tier::Active => acct.active.clone(),
    })
}

/// Whether `signed` keys reach the authority's threshold, recursing into
/// account authorities with `depth` levels remaining.
fn satisfies(
    store: &ObjectStore,
    auth: &Authority,
    signed: &BTreeSet<PublicKey>,
    depth: u32,
    used: &mut BTreeSet<PublicKey>,
) -> Result<bool, ChainError> {
    if auth.is_trivial() {
        return Ok(true);
    }
    let threshold = u64::from(auth.weight_threshold);
    let mut weight = 0u64;

    for (key, w) in &auth.key_auths {
        if signed.contains(key) {
            weight += u64::from(*w);
            used.insert(*key);
            if weight >= threshold {
                return Ok(true);
            }
        }
    }

    for (name, w) in &auth.account_auths {
        if depth == 0 {
            return Err(AuthorityError::DepthExceeded.into());
        }
        let Some((_, delegate)) = store.find_account(name) else {
            // A dangling account entry contributes nothing.
            continue;
        };
        let delegate_active = delegate.active.clone();
        if satisfies(store, &delegate_active, signed, depth - 1, used)? {
            weight += u64::from(*w);
            if weight >= threshold {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
