//! The closed operation set and its structural validation.
//!
//! Operation kinds:
//! - **Transfer**: move an amount between accounts
//! - **AccountCreate**: register a new account, burning a creation fee
//! - **AccountUpdate**: replace an account's authorities or memo key
//! - **WitnessUpdate**: register or update a block producer
//! - **FeedPublish**: witness publishes a core/stable exchange-rate feed
//! - **Convert**: request conversion at the median feed after a delay
//! - **Custom**: opaque payload bound to named account authorities
//!
//! Virtual operations (`ProducerReward`, `FillConvert`) are generated by the
//! chain as side effects and are structurally rejected when user-submitted.
//! Adding a new kind means extending this enum and the evaluator table in
//! `meridian-chain`.

use crate::authority::Authority;
use crate::error::ProtocolError;
use meridian_types::{AccountName, Amount, Asset, Price, PublicKey};
use serde::{Deserialize, Serialize};

const MAX_MEMO_LEN: usize = 2_048;
const MAX_CUSTOM_DATA_LEN: usize = 8_192;
const MAX_URL_LEN: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub from: AccountName,
    pub to: AccountName,
    pub amount: Amount,
    pub memo: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCreateOperation {
    pub creator: AccountName,
    pub new_account_name: AccountName,
    /// Burned from the creator's core balance.
    pub fee: Amount,
    pub owner: Authority,
    pub active: Authority,
    pub memo_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateOperation {
    pub account: AccountName,
    pub owner: Option<Authority>,
    pub active: Option<Authority>,
    pub memo_key: Option<PublicKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WitnessUpdateOperation {
    pub owner: AccountName,
    pub url: String,
    pub block_signing_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPublishOperation {
    pub publisher: AccountName,
    pub exchange_rate: Price,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertOperation {
    pub owner: AccountName,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOperation {
    pub required_auths: Vec<AccountName>,
    pub id: u16,
    pub data: Vec<u8>,
}

/// Synthetic: block producer credited at end of block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRewardOperation {
    pub producer: AccountName,
    pub reward: Amount,
}

/// Synthetic: a convert request settled at maintenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillConvertOperation {
    pub owner: AccountName,
    pub amount_in: Amount,
    pub amount_out: Amount,
}

/// The unified operation enum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transfer(TransferOperation),
    AccountCreate(AccountCreateOperation),
    AccountUpdate(AccountUpdateOperation),
    WitnessUpdate(WitnessUpdateOperation),
    FeedPublish(FeedPublishOperation),
    Convert(ConvertOperation),
    Custom(CustomOperation),
    ProducerReward(ProducerRewardOperation),
    FillConvert(FillConvertOperation),
}

impl Operation {
    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Transfer(_) => "transfer",
            Self::AccountCreate(_) => "account_create",
            Self::AccountUpdate(_) => "account_update",
            Self::WitnessUpdate(_) => "witness_update",
            Self::FeedPublish(_) => "feed_publish",
            Self::Convert(_) => "convert",
            Self::Custom(_) => "custom",
            Self::ProducerReward(_) => "producer_reward",
            Self::FillConvert(_) => "fill_convert",
        }
    }

    /// Whether this operation is generated by the chain rather than users.
    pub fn is_virtual(&self) -> bool {
        matches!(self, Self::ProducerReward(_) | Self::FillConvert(_))
    }

    /// Collect the accounts whose active authority must sign, and those
    /// whose owner authority must sign.
    pub fn required_authorities(&self, active: &mut Vec<AccountName>, owner: &mut Vec<AccountName>) {
        match self {
            Self::Transfer(op) => active.push(op.from.clone()),
            Self::AccountCreate(op) => active.push(op.creator.clone()),
            Self::AccountUpdate(op) => {
                // Replacing the owner authority requires the owner key.
                if op.owner.is_some() {
                    owner.push(op.account.clone());
                } else {
                    active.push(op.account.clone());
                }
            }
            Self::WitnessUpdate(op) => active.push(op.owner.clone()),
            Self::FeedPublish(op) => active.push(op.publisher.clone()),
            Self::Convert(op) => active.push(op.owner.clone()),
            Self::Custom(op) => active.extend(op.required_auths.iter().cloned()),
            Self::ProducerReward(_) | Self::FillConvert(_) => {}
        }
    }

    /// Stateless structural validation.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Transfer(op) => validate_transfer(op),
            Self::AccountCreate(op) => validate_account_create(op),
            Self::AccountUpdate(op) => validate_account_update(op),
            Self::WitnessUpdate(op) => validate_witness_update(op),
            Self::FeedPublish(op) => validate_feed_publish(op),
            Self::Convert(op) => validate_convert(op),
            Self::Custom(op) => validate_custom(op),
            Self::ProducerReward(_) | Self::FillConvert(_) => {
                Err(ProtocolError::VirtualOperation(self.name()))
            }
        }
    }
}

fn invalid(reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidOperation {
        reason: reason.into(),
    }
}

fn validate_transfer(op: &TransferOperation) -> Result<(), ProtocolError> {
    if op.amount.is_zero() {
        return Err(invalid("transfer amount must be non-zero"));
    }
    if op.from == op.to {
        return Err(invalid("transfer sender and receiver must differ"));
    }
    if op.memo.len() > MAX_MEMO_LEN {
        return Err(invalid("transfer memo too long"));
    }
    Ok(())
}

fn validate_account_create(op: &AccountCreateOperation) -> Result<(), ProtocolError> {
    if !op.new_account_name.is_valid() {
        return Err(invalid(format!(
            "malformed account name `{}`",
            op.new_account_name
        )));
    }
    if op.fee.asset != Asset::Core {
        return Err(invalid("account creation fee must be core asset"));
    }
    op.owner.validate()?;
    op.active.validate()?;
    Ok(())
}

fn validate_account_update(op: &AccountUpdateOperation) -> Result<(), ProtocolError> {
    if op.owner.is_none() && op.active.is_none() && op.memo_key.is_none() {
        return Err(invalid("account update changes nothing"));
    }
    if let Some(owner) = &op.owner {
        owner.validate()?;
    }
    if let Some(active) = &op.active {
        active.validate()?;
    }
    Ok(())
}

fn validate_witness_update(op: &WitnessUpdateOperation) -> Result<(), ProtocolError> {
    if op.url.len() > MAX_URL_LEN {
        return Err(invalid("witness url too long"));
    }
    Ok(())
}

fn validate_feed_publish(op: &FeedPublishOperation) -> Result<(), ProtocolError> {
    if !op.exchange_rate.is_valid() {
        return Err(invalid("exchange rate must quote both assets with non-zero amounts"));
    }
    Ok(())
}

fn validate_convert(op: &ConvertOperation) -> Result<(), ProtocolError> {
    if op.amount.is_zero() {
        return Err(invalid("convert amount must be non-zero"));
    }
    Ok(())
}

fn validate_custom(op: &CustomOperation) -> Result<(), ProtocolError> {
    if op.required_auths.is_empty() {
        return Err(invalid("custom operation requires at least one authority"));
    }
    if op.data.len() > MAX_CUSTOM_DATA_LEN {
        return Err(invalid("custom payload too large"));
    }
    Ok(())
}
