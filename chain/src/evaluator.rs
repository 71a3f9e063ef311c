//! The fixed operation-evaluator table.
//!
//! One pure evaluator per operation variant, dispatched over the closed
//! enum. Evaluators see state only through the object store, so a failed
//! evaluation is fully reverted by the enclosing undo session. New
//! operation kinds require extending both the enum and this table.

use crate::error::ChainError;
use crate::processed::OperationResult;
use meridian_protocol::{
    block::secret_hash, AccountCreateOperation, AccountUpdateOperation, ConvertOperation,
    CustomOperation, FeedPublishOperation, Operation, TransferOperation, WitnessUpdateOperation,
};
use meridian_store::{AccountObject, ConvertRequestObject, ObjectStore, WitnessObject};
use meridian_types::{AccountName, Amount, ChainParams, Digest, Timestamp};

/// Per-transaction evaluation context, threaded explicitly instead of
/// ambient globals.
pub struct OpContext {
    /// Head block time at evaluation.
    pub now: Timestamp,
    pub params: ChainParams,
}

/// Apply one operation. The entry point of the evaluator table.
pub fn apply_operation(
    store: &mut ObjectStore,
    ctx: &OpContext,
    op: &Operation,
) -> Result<OperationResult, ChainError> {
    match op {
        Operation::Transfer(inner) => eval_transfer(store, inner),
        Operation::AccountCreate(inner) => eval_account_create(store, ctx, inner),
        Operation::AccountUpdate(inner) => eval_account_update(store, inner),
        Operation::WitnessUpdate(inner) => eval_witness_update(store, inner),
        Operation::FeedPublish(inner) => eval_feed_publish(store, ctx, inner),
        Operation::Convert(inner) => eval_convert(store, ctx, inner),
        Operation::Custom(inner) => eval_custom(store, inner),
        Operation::ProducerReward(_) | Operation::FillConvert(_) => Err(ChainError::Evaluator {
            op: op.name(),
            reason: "virtual operations are generated by the chain, not evaluated".into(),
        }),
    }
}

fn err(op: &'static str, reason: impl Into<String>) -> ChainError {
    ChainError::Evaluator {
        op,
        reason: reason.into(),
    }
}

/// Move `amount` into an account's balance.
pub fn credit(
    store: &mut ObjectStore,
    op: &'static str,
    name: &AccountName,
    amount: Amount,
) -> Result<(), ChainError> {
    let (id, acct) = store
        .find_account(name)
        .ok_or_else(|| err(op, format!("unknown account `{name}`")))?;
    let balance = acct
        .balance(amount.asset)
        .checked_add(amount)
        .ok_or_else(|| err(op, format!("balance overflow for `{name}`")))?;
    store.modify_account(id, |a| a.set_balance(balance))?;
    Ok(())
}

/// Take `amount` out of an account's balance.
pub fn debit(
    store: &mut ObjectStore,
    op: &'static str,
    name: &AccountName,
    amount: Amount,
) -> Result<(), ChainError> {
    let (id, acct) = store
        .find_account(name)
        .ok_or_else(|| err(op, format!("unknown account `{name}`")))?;
    let balance = acct.balance(amount.asset).checked_sub(amount).ok_or_else(|| {
        err(
            op,
            format!(
                "insufficient funds: `{name}` has {}, needs {amount}",
                acct.balance(amount.asset)
            ),
        )
    })?;
    store.modify_account(id, |a| a.set_balance(balance))?;
    Ok(())
}

fn eval_transfer(
    store: &mut ObjectStore,
    op: &TransferOperation,
) -> Result<OperationResult, ChainError> {
    debit(store, "transfer", &op.from, op.amount)?;
    credit(store, "transfer", &op.to, op.amount)?;
    Ok(OperationResult::Void)
}

fn eval_account_create(
    store: &mut ObjectStore,
    ctx: &OpContext,
    op: &AccountCreateOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "account_create";
    if op.fee.amount < ctx.params.account_creation_fee {
        return Err(err(
            NAME,
            format!(
                "fee {} below required {}",
                op.fee.amount, ctx.params.account_creation_fee
            ),
        ));
    }
    if store.find_account(&op.new_account_name).is_some() {
        return Err(err(
            NAME,
            format!("account name `{}` already taken", op.new_account_name),
        ));
    }
    for name in op
        .owner
        .account_auths
        .keys()
        .chain(op.active.account_auths.keys())
    {
        if store.find_account(name).is_none() {
            return Err(err(
                NAME,
                format!("authority references unknown account `{name}`"),
            ));
        }
    }
    // The fee is burned, not redistributed.
    debit(store, NAME, &op.creator, op.fee)?;
    let id = store.create(AccountObject {
        name: op.new_account_name.clone(),
        owner: op.owner.clone(),
        active: op.active.clone(),
        memo_key: op.memo_key,
        core_balance: 0,
        stable_balance: 0,
    })?;
    Ok(OperationResult::Object(id))
}

fn eval_account_update(
    store: &mut ObjectStore,
    op: &AccountUpdateOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "account_update";
    let (id, _) = store
        .find_account(&op.account)
        .ok_or_else(|| err(NAME, format!("unknown account `{}`", op.account)))?;
    for name in op
        .owner
        .iter()
        .chain(op.active.iter())
        .flat_map(|auth| auth.account_auths.keys())
    {
        if store.find_account(name).is_none() {
            return Err(err(
                NAME,
                format!("authority references unknown account `{name}`"),
            ));
        }
    }
    let update = op.clone();
    store.modify_account(id, move |acct| {
        if let Some(owner) = update.owner {
            acct.owner = owner;
        }
        if let Some(active) = update.active {
            acct.active = active;
        }
        if let Some(memo_key) = update.memo_key {
            acct.memo_key = memo_key;
        }
    })?;
    Ok(OperationResult::Void)
}

fn eval_witness_update(
    store: &mut ObjectStore,
    op: &WitnessUpdateOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "witness_update";
    if store.find_account(&op.owner).is_none() {
        return Err(err(NAME, format!("unknown account `{}`", op.owner)));
    }
    if let Some(id) = store.find_witness(&op.owner).map(|(id, _)| id) {
        let update = op.clone();
        store.modify_witness(id, move |w| {
            w.url = update.url;
            w.signing_key = update.block_signing_key;
        })?;
        return Ok(OperationResult::Void);
    }
    let id = store.create(WitnessObject {
        owner: op.owner.clone(),
        url: op.url.clone(),
        signing_key: op.block_signing_key,
        // A fresh witness commits to the zero secret; its first block
        // reveals it and establishes the real chain.
        next_secret_hash: secret_hash(&Digest::ZERO),
        last_produced_block: 0,
        total_produced: 0,
        total_missed: 0,
        last_feed: None,
        last_feed_time: Timestamp::EPOCH,
    })?;
    Ok(OperationResult::Object(id))
}

fn eval_feed_publish(
    store: &mut ObjectStore,
    ctx: &OpContext,
    op: &FeedPublishOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "feed_publish";
    let (id, _) = store
        .find_witness(&op.publisher)
        .ok_or_else(|| err(NAME, format!("`{}` is not a witness", op.publisher)))?;
    let rate = op.exchange_rate;
    let now = ctx.now;
    store.modify_witness(id, move |w| {
        w.last_feed = Some(rate);
        w.last_feed_time = now;
    })?;
    Ok(OperationResult::Void)
}

fn eval_convert(
    store: &mut ObjectStore,
    ctx: &OpContext,
    op: &ConvertOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "convert";
    debit(store, NAME, &op.owner, op.amount)?;
    let id = store.create(ConvertRequestObject {
        owner: op.owner.clone(),
        amount: op.amount,
        due: ctx.now.saturating_add_secs(ctx.params.convert_delay_secs),
    })?;
    Ok(OperationResult::Object(id))
}

fn eval_custom(
    store: &mut ObjectStore,
    op: &CustomOperation,
) -> Result<OperationResult, ChainError> {
    const NAME: &str = "custom";
    for name in &op.required_auths {
        if store.find_account(name).is_none() {
            return Err(err(NAME, format!("unknown account `{name}`")));
        }
    }
    // Custom operations carry opaque payloads for external consumers; the
    // chain only binds them to their authorities.
    Ok(OperationResult::Void)
}
