use std::fmt;

use fvm_ipld_encoding::tuple::{Deserialize_tuple, Serialize_tuple};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// Amount of token in its smallest indivisible unit
pub type TokenAmount = U256;

/// Allowance value meaning "do not track or decrement"
///
/// Spending against an allowance holding this value never reduces it. Only an explicit approval
/// can replace it.
pub const UNLIMITED_ALLOWANCE: TokenAmount = U256::MAX;

/// Conventional display precision, aka "18 decimals"
pub const DEFAULT_DECIMALS: u8 = 18;

/// Opaque identifier of a ledger participant
///
/// The ledger only relies on identifiers being unique and ordered. `AccountId::NULL` is reserved:
/// it never holds a balance and is rejected wherever a real account is required. As the source of
/// a transfer event it denotes a mint, as the destination a burn.
#[derive(
    Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug,
)]
#[serde(transparent)]
pub struct AccountId(u64);

impl AccountId {
    pub const NULL: AccountId = AccountId(0);

    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for AccountId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct{}", self.0)
    }
}

/// Descriptive token data, stored and returned verbatim
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    /// Display precision only, never used in arithmetic
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self { name: name.into(), symbol: symbol.into(), decimals: DEFAULT_DECIMALS }
    }
}

/// Construction-time configuration of a ledger
///
/// Supplied once when the ledger is created and not mutable afterwards.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct LedgerParams {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Account credited with the entire initial supply
    pub initial_holder: AccountId,
    pub initial_supply: TokenAmount,
}

impl LedgerParams {
    pub fn metadata(&self) -> TokenMetadata {
        TokenMetadata {
            name: self.name.clone(),
            symbol: self.symbol.clone(),
            decimals: self.decimals,
        }
    }
}

/// Returns `whole` tokens expressed in the smallest unit at the given precision
///
/// Returns `None` if the result does not fit in 256 bits.
pub fn whole_tokens(whole: u64, decimals: u8) -> Option<TokenAmount> {
    let ten = TokenAmount::from(10);
    let scale = (0..decimals).try_fold(TokenAmount::one(), |acc, _| acc.checked_mul(ten))?;
    TokenAmount::from(whole).checked_mul(scale)
}
