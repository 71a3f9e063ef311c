use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("transaction contains no operations")]
    EmptyTransaction,

    #[error("virtual operation {0} cannot be submitted")]
    VirtualOperation(&'static str),

    #[error("invalid operation: {reason}")]
    InvalidOperation { reason: String },

    #[error("invalid authority: {reason}")]
    InvalidAuthority { reason: String },

    #[error("duplicate signature key in transaction")]
    DuplicateSignature,
}
