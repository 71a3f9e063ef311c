//! Account name type.
//!
//! Accounts are identified by short lowercase names rather than raw keys;
//! a name is bound to its authority material by the account object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved account that must hold a zero balance in every asset at the end
/// of any transaction. It has no authority — anyone may move funds out.
pub const TEMP_ACCOUNT_NAME: &str = "temp";

/// The bootstrap producer created at genesis.
pub const GENESIS_ACCOUNT_NAME: &str = "genesis";

const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 16;

/// An account name — lowercase letters, digits, `-` and `.`, 3 to 16 chars.
///
/// `new` does not validate; use [`AccountName::is_valid`] where user input
/// crosses into the state machine (account creation).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountName(String);

impl AccountName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved temporary account.
    pub fn is_temp(&self) -> bool {
        self.0 == TEMP_ACCOUNT_NAME
    }

    /// Check name well-formedness for newly created accounts.
    ///
    /// The reserved names are considered valid — they are created by the
    /// genesis routine, not by user operations.
    pub fn is_valid(&self) -> bool {
        let s = self.0.as_str();
        if s.len() < MIN_NAME_LEN || s.len() > MAX_NAME_LEN {
            return false;
        }
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c.is_ascii_lowercase() => {}
            _ => return false,
        }
        s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
            && !s.ends_with('-')
            && !s.ends_with('.')
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountName({})", self.0)
    }
}

impl From<&str> for AccountName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
