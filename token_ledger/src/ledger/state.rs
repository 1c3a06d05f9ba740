use anyhow::bail;
use cid::multihash::Code;
use cid::Cid;
use fvm_ipld_blockstore::Block;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::CborStore;
use fvm_ipld_encoding::DAG_CBOR;
use fvm_ipld_hamt::Hamt;
use fvm_ipld_hamt::{BytesKey, Error as HamtError};
use integer_encoding::VarInt;
use log::trace;
use thiserror::Error;

use super::types::{AccountId, TokenAmount};

/// Bit width used for the balance and allowance Hamts unless the caller picks another
pub const DEFAULT_HAMT_BIT_WIDTH: u32 = 3;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("ipld hamt error: {0}")]
    IpldHamt(#[from] HamtError),
    #[error("missing state at cid: {0}")]
    MissingState(Cid),
    #[error("underlying serialization error: {0}")]
    Serialization(String),
    #[error("{account:?} has a balance of {available:?} but {required:?} is required")]
    InsufficientBalance { account: AccountId, available: TokenAmount, required: TokenAmount },
    #[error("{spender:?} attempted to utilise {required:?} of allowance {available:?} set by {owner:?}")]
    InsufficientAllowance {
        owner: AccountId,
        spender: AccountId,
        available: TokenAmount,
        required: TokenAmount,
    },
    #[error("cannot decrease allowance of {allowance:?} set by {owner:?} for {spender:?} by {decrease:?}")]
    AllowanceUnderflow {
        owner: AccountId,
        spender: AccountId,
        allowance: TokenAmount,
        decrease: TokenAmount,
    },
    #[error("{name} of {value:?} overflows when increased by {delta:?}")]
    Overflow { name: &'static str, value: TokenAmount, delta: TokenAmount },
    #[error("total_supply cannot be negative, cannot apply delta of {delta:?} to {supply:?}")]
    NegativeTotalSupply { supply: TokenAmount, delta: TokenAmount },
}

#[derive(Error, Debug)]
pub enum StateInvariantError {
    #[error("the total supply {supply:?} does not match the sum of all balances {balance_sum:?}")]
    BalanceSupplyMismatch { supply: TokenAmount, balance_sum: TokenAmount },
    #[error("the sum of all balances exceeds the representable range")]
    BalanceSumOverflow,
    #[error("the null account holds a balance of {0:?}")]
    NullAccountBalance(TokenAmount),
    #[error("stored an allowance involving the null account between {owner:?} and {spender:?}")]
    NullAccountAllowance { owner: AccountId, spender: AccountId },
    #[error("invalid serialized account key {0:?}")]
    InvalidAccountKey(BytesKey),
    #[error("underlying state error {0}")]
    State(#[from] StateError),
}

type Result<T> = std::result::Result<T, StateError>;

type Map<'bs, BS, K, V> = Hamt<&'bs BS, V, K>;
type BalanceMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;
type AllowanceMap<'bs, BS> = Map<'bs, BS, BytesKey, Cid>;
type OwnerAllowanceMap<'bs, BS> = Map<'bs, BS, BytesKey, TokenAmount>;

/// Ledger state IPLD structure
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct LedgerState {
    /// Total supply of token
    pub supply: TokenAmount,
    /// Map<AccountId, TokenAmount> of balances as a Hamt
    pub balances: Cid,
    /// Map<AccountId, Map<AccountId, TokenAmount>> as a Hamt. Allowances are stored allowances[owner][spender]
    pub allowances: Cid,
    /// Bit-width to use when loading Hamts
    hamt_bit_width: u32,
}

/// Get and modify ledger balances and allowances without dealing with Hamts directly.
///
/// Protocol rules such as rejecting the null account or consuming allowances during delegated
/// transfers are left to the caller. Arithmetic invariants are enforced here: balances, allowances
/// and supply never go below zero or past the 256-bit range. Values written as zero are stored as
/// zero rather than removed.
impl LedgerState {
    /// Create a new state-tree, without committing it (the root cid) to a blockstore
    pub fn new<BS: Blockstore>(store: &BS) -> Result<Self> {
        Self::new_with_bit_width(store, DEFAULT_HAMT_BIT_WIDTH)
    }

    /// Create a new state-tree with an explicit bit width for the underlying Hamts
    ///
    /// Caller must ensure 1 <= hamt_bit_width <= 8.
    pub fn new_with_bit_width<BS: Blockstore>(store: &BS, hamt_bit_width: u32) -> Result<Self> {
        // the blockstore is needed to produce valid Cids for the empty Hamts
        let empty_balance_map = BalanceMap::new_with_bit_width(store, hamt_bit_width).flush()?;
        let empty_allowances_map =
            AllowanceMap::new_with_bit_width(store, hamt_bit_width).flush()?;

        Ok(Self {
            supply: TokenAmount::zero(),
            balances: empty_balance_map,
            allowances: empty_allowances_map,
            hamt_bit_width,
        })
    }

    /// Loads a fresh copy of the state from a blockstore from a given cid
    pub fn load<BS: Blockstore>(bs: &BS, cid: &Cid) -> Result<Self> {
        match bs.get_cbor::<Self>(cid) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => Err(StateError::MissingState(*cid)),
            Err(err) => Err(StateError::Serialization(err.to_string())),
        }
    }

    /// Saves the current state to the blockstore, returning the cid
    pub fn save<BS: Blockstore>(&self, bs: &BS) -> Result<Cid> {
        let serialized = match fvm_ipld_encoding::to_vec(self) {
            Ok(s) => s,
            Err(err) => return Err(StateError::Serialization(err.to_string())),
        };
        let block = Block { codec: DAG_CBOR, data: serialized };
        match bs.put(Code::Blake2b256, &block) {
            Ok(cid) => Ok(cid),
            Err(err) => Err(StateError::Serialization(err.to_string())),
        }
    }

    pub fn hamt_bit_width(&self) -> u32 {
        self.hamt_bit_width
    }

    /// Get the balance of an account, which is implicitly zero if never written
    pub fn get_balance<BS: Blockstore>(&self, bs: &BS, owner: AccountId) -> Result<TokenAmount> {
        let balances = self.get_balance_map(bs)?;
        let balance = balances.get(&account_key(owner))?.copied().unwrap_or_default();
        Ok(balance)
    }

    /// Credits an account, returning its new balance
    pub fn increase_balance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: AccountId,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let mut balance_map = self.get_balance_map(bs)?;
        let owner_key = account_key(owner);
        let balance = balance_map.get(&owner_key)?.copied().unwrap_or_default();

        let new_balance = balance.checked_add(*amount).ok_or(StateError::Overflow {
            name: "balance",
            value: balance,
            delta: *amount,
        })?;

        balance_map.set(owner_key, new_balance)?;
        self.balances = balance_map.flush()?;
        trace!("balance of {owner} increased to {new_balance}");

        Ok(new_balance)
    }

    /// Debits an account, returning its new balance
    ///
    /// Fails without touching state if the account holds less than `amount`.
    pub fn decrease_balance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: AccountId,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let mut balance_map = self.get_balance_map(bs)?;
        let owner_key = account_key(owner);
        let balance = balance_map.get(&owner_key)?.copied().unwrap_or_default();

        let new_balance = balance.checked_sub(*amount).ok_or(StateError::InsufficientBalance {
            account: owner,
            available: balance,
            required: *amount,
        })?;

        balance_map.set(owner_key, new_balance)?;
        self.balances = balance_map.flush()?;
        trace!("balance of {owner} decreased to {new_balance}");

        Ok(new_balance)
    }

    /// Retrieve the balance map as a HAMT
    pub fn get_balance_map<'bs, BS: Blockstore>(&self, bs: &'bs BS) -> Result<BalanceMap<'bs, BS>> {
        Ok(BalanceMap::load_with_bit_width(&self.balances, bs, self.hamt_bit_width)?)
    }

    /// Retrieve the number of accounts that hold a non-zero balance
    ///
    /// This involves iterating through the entire HAMT
    pub fn count_balances<BS: Blockstore>(&self, bs: &BS) -> Result<usize> {
        let balance_map = self.get_balance_map(bs)?;
        let mut count = 0;
        balance_map.for_each(|_, balance| {
            if !balance.is_zero() {
                count += 1;
            }
            Ok(())
        })?;
        Ok(count)
    }

    /// Increase the total supply by the specified value, returning the new total supply
    pub fn increase_supply(&mut self, amount: &TokenAmount) -> Result<&TokenAmount> {
        self.supply = self.supply.checked_add(*amount).ok_or(StateError::Overflow {
            name: "total_supply",
            value: self.supply,
            delta: *amount,
        })?;
        Ok(&self.supply)
    }

    /// Decrease the total supply by the specified value, returning the new total supply
    pub fn decrease_supply(&mut self, amount: &TokenAmount) -> Result<&TokenAmount> {
        self.supply = self.supply.checked_sub(*amount).ok_or(StateError::NegativeTotalSupply {
            supply: self.supply,
            delta: *amount,
        })?;
        Ok(&self.supply)
    }

    /// Get the allowance that an owner has approved for a spender
    ///
    /// If an existing allowance cannot be found, it is implicitly assumed to be zero
    pub fn get_allowance_between<BS: Blockstore>(
        &self,
        bs: &BS,
        owner: AccountId,
        spender: AccountId,
    ) -> Result<TokenAmount> {
        match self.get_owner_allowance_map(bs, owner)? {
            Some(map) => Ok(map.get(&account_key(spender))?.copied().unwrap_or_default()),
            None => Ok(TokenAmount::zero()),
        }
    }

    /// Set the allowance between owner and spender to a specific amount, returning the old allowance
    pub fn set_allowance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: AccountId,
        spender: AccountId,
        amount: &TokenAmount,
    ) -> Result<TokenAmount> {
        let mut root_allowances_map = self.get_allowances_map(bs)?;

        // get or create the owner's allowance map
        let owner_key = account_key(owner);
        let mut allowance_map = match root_allowances_map.get(&owner_key)? {
            Some(cid) => OwnerAllowanceMap::load_with_bit_width(cid, bs, self.hamt_bit_width)?,
            None => OwnerAllowanceMap::new_with_bit_width(bs, self.hamt_bit_width),
        };

        let spender_key = account_key(spender);
        let old_allowance = allowance_map.get(&spender_key)?.copied().unwrap_or_default();

        allowance_map.set(spender_key, *amount)?;
        root_allowances_map.set(owner_key, allowance_map.flush()?)?;
        self.allowances = root_allowances_map.flush()?;
        trace!("allowance of {spender} over {owner} set to {amount}");

        Ok(old_allowance)
    }

    /// Raise an allowance by `delta`, returning the new allowance
    pub fn increase_allowance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: AccountId,
        spender: AccountId,
        delta: &TokenAmount,
    ) -> Result<TokenAmount> {
        let current = self.get_allowance_between(bs, owner, spender)?;
        let new_allowance = current.checked_add(*delta).ok_or(StateError::Overflow {
            name: "allowance",
            value: current,
            delta: *delta,
        })?;
        self.set_allowance(bs, owner, spender, &new_allowance)?;
        Ok(new_allowance)
    }

    /// Lower an allowance by `delta`, returning the new allowance
    ///
    /// A decrease larger than the current allowance is an error, it is never clamped to zero.
    pub fn decrease_allowance<BS: Blockstore>(
        &mut self,
        bs: &BS,
        owner: AccountId,
        spender: AccountId,
        delta: &TokenAmount,
    ) -> Result<TokenAmount> {
        let current = self.get_allowance_between(bs, owner, spender)?;
        let new_allowance = current.checked_sub(*delta).ok_or(StateError::AllowanceUnderflow {
            owner,
            spender,
            allowance: current,
            decrease: *delta,
        })?;
        self.set_allowance(bs, owner, spender, &new_allowance)?;
        Ok(new_allowance)
    }

    /// Get the allowances map of a specific account, resolving the CID link to a Hamt
    ///
    /// Ok(None) if the owner has never approved anyone
    pub fn get_owner_allowance_map<'bs, BS: Blockstore>(
        &self,
        bs: &'bs BS,
        owner: AccountId,
    ) -> Result<Option<OwnerAllowanceMap<'bs, BS>>> {
        let allowances_map = self.get_allowances_map(bs)?;
        let owner_allowances = match allowances_map.get(&account_key(owner))? {
            Some(cid) => {
                Some(OwnerAllowanceMap::load_with_bit_width(cid, bs, self.hamt_bit_width)?)
            }
            None => None,
        };
        Ok(owner_allowances)
    }

    /// Get the global allowances map
    ///
    /// Gets a HAMT with CIDs linking to other HAMTs
    pub fn get_allowances_map<'bs, BS: Blockstore>(
        &self,
        bs: &'bs BS,
    ) -> Result<AllowanceMap<'bs, BS>> {
        Ok(AllowanceMap::load_with_bit_width(&self.allowances, bs, self.hamt_bit_width)?)
    }

    /// Checks that the current state obeys all ledger invariants
    ///
    /// Checks that the sum of all balances matches the total supply, that the null account holds
    /// no balance and is absent from allowances, and that every stored key decodes to an account.
    ///
    /// Returns a summary that callers can use to check application specific invariants.
    pub fn check_invariants<BS: Blockstore>(
        &self,
        bs: &BS,
    ) -> std::result::Result<StateSummary, StateInvariantError> {
        let mut balance_sum = TokenAmount::zero();
        let mut holders = 0;
        let mut maybe_err: Option<StateInvariantError> = None;
        let balances = self.get_balance_map(bs)?;
        let res = balances.for_each(|owner_key, balance| {
            let owner = match decode_account_key(owner_key) {
                None => {
                    maybe_err = Some(StateInvariantError::InvalidAccountKey(owner_key.clone()));
                    bail!("invariant failed");
                }
                Some(a) => a,
            };
            if owner.is_null() && !balance.is_zero() {
                maybe_err = Some(StateInvariantError::NullAccountBalance(*balance));
                bail!("invariant failed");
            }
            balance_sum = match balance_sum.checked_add(*balance) {
                Some(sum) => sum,
                None => {
                    maybe_err = Some(StateInvariantError::BalanceSumOverflow);
                    bail!("invariant failed");
                }
            };
            if !balance.is_zero() {
                holders += 1;
            }
            Ok(())
        });
        if let Err(e) = res {
            return Err(maybe_err.unwrap_or_else(|| StateError::from(e).into()));
        }

        if balance_sum != self.supply {
            return Err(StateInvariantError::BalanceSupplyMismatch {
                supply: self.supply,
                balance_sum,
            });
        }

        let mut approvers = 0;
        let mut maybe_err: Option<StateInvariantError> = None;
        let allowances_map = self.get_allowances_map(bs)?;
        let res = allowances_map.for_each(|owner_key, cid| {
            let owner = match decode_account_key(owner_key) {
                None => {
                    maybe_err = Some(StateInvariantError::InvalidAccountKey(owner_key.clone()));
                    bail!("invariant failed");
                }
                Some(a) => a,
            };
            let allowance_map =
                OwnerAllowanceMap::load_with_bit_width(cid, bs, self.hamt_bit_width)?;
            allowance_map.for_each(|spender_key, _| {
                let spender = match decode_account_key(spender_key) {
                    None => {
                        maybe_err =
                            Some(StateInvariantError::InvalidAccountKey(spender_key.clone()));
                        bail!("invariant failed");
                    }
                    Some(a) => a,
                };
                if owner.is_null() || spender.is_null() {
                    maybe_err = Some(StateInvariantError::NullAccountAllowance { owner, spender });
                    bail!("invariant failed");
                }
                Ok(())
            })?;
            approvers += 1;
            Ok(())
        });
        if let Err(e) = res {
            return Err(maybe_err.unwrap_or_else(|| StateError::from(e).into()));
        }

        Ok(StateSummary { total_supply: self.supply, holders, approvers })
    }
}

pub fn account_key(a: AccountId) -> BytesKey {
    a.id().encode_var_vec().into()
}

pub fn decode_account_key(key: &BytesKey) -> Option<AccountId> {
    u64::decode_var(key.0.as_slice()).map(|a| AccountId::new(a.0))
}

/// A summary of the current state, returned once all invariants hold
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateSummary {
    pub total_supply: TokenAmount,
    /// Number of accounts holding a non-zero balance
    pub holders: usize,
    /// Number of accounts that have approved at least one spender
    pub approvers: usize,
}

#[cfg(test)]
mod test {
    use fvm_ipld_blockstore::MemoryBlockstore;

    use super::LedgerState;
    use crate::ledger::state::{account_key, StateError, StateInvariantError};
    use crate::ledger::types::{AccountId, TokenAmount};

    const OWNER: AccountId = AccountId::new(1);
    const SPENDER: AccountId = AccountId::new(2);

    #[test]
    fn it_instantiates() {
        let bs = &MemoryBlockstore::new();
        let state = LedgerState::new(bs).unwrap();
        let cid = state.save(bs).unwrap();
        let saved_state = LedgerState::load(bs, &cid).unwrap();
        assert_eq!(state, saved_state);
    }

    #[test]
    fn it_increases_balance_from_zero() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        // Initially any account has an implicit balance of 0
        assert_eq!(state.get_balance(bs, OWNER).unwrap(), TokenAmount::zero());

        let amount = TokenAmount::from(100);
        let new_balance = state.increase_balance(bs, OWNER, &amount).unwrap();
        assert_eq!(new_balance, amount);
        assert_eq!(state.get_balance(bs, OWNER).unwrap(), amount);
    }

    #[test]
    fn it_fails_to_decrease_balance_below_zero() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        // can't decrease from zero
        let err = state.decrease_balance(bs, OWNER, &TokenAmount::from(1)).unwrap_err();
        assert!(matches!(err, StateError::InsufficientBalance { .. }));
        assert_eq!(state.get_balance(bs, OWNER).unwrap(), TokenAmount::zero());

        // can't go below zero from a positive balance
        state.increase_balance(bs, OWNER, &TokenAmount::from(50)).unwrap();
        let before = state.clone();
        let err = state.decrease_balance(bs, OWNER, &TokenAmount::from(100)).unwrap_err();
        if let StateError::InsufficientBalance { account, available, required } = err {
            assert_eq!(account, OWNER);
            assert_eq!(available, TokenAmount::from(50));
            assert_eq!(required, TokenAmount::from(100));
        } else {
            panic!("unexpected error {err:?}");
        }
        assert_eq!(state, before);

        // draining to exactly zero is fine and leaves an explicit zero
        let new_balance = state.decrease_balance(bs, OWNER, &TokenAmount::from(50)).unwrap();
        assert_eq!(new_balance, TokenAmount::zero());
        let balance_map = state.get_balance_map(bs).unwrap();
        assert!(balance_map.contains_key(&account_key(OWNER)).unwrap());
    }

    #[test]
    fn it_rejects_overflowing_balances_and_supply() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        state.increase_balance(bs, OWNER, &TokenAmount::MAX).unwrap();
        let err = state.increase_balance(bs, OWNER, &TokenAmount::from(1)).unwrap_err();
        assert!(matches!(err, StateError::Overflow { name: "balance", .. }));
        assert_eq!(state.get_balance(bs, OWNER).unwrap(), TokenAmount::MAX);

        state.increase_supply(&TokenAmount::MAX).unwrap();
        let err = state.increase_supply(&TokenAmount::from(1)).unwrap_err();
        assert!(matches!(err, StateError::Overflow { name: "total_supply", .. }));
        assert_eq!(state.supply, TokenAmount::MAX);
    }

    #[test]
    fn it_refuses_negative_supply() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        state.increase_supply(&TokenAmount::from(10)).unwrap();
        assert_eq!(*state.decrease_supply(&TokenAmount::from(4)).unwrap(), TokenAmount::from(6));
        state.decrease_supply(&TokenAmount::from(7)).unwrap_err();
        assert_eq!(state.supply, TokenAmount::from(6));
    }

    #[test]
    fn it_sets_allowances_between_accounts() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        // initial allowance is zero
        let initial_allowance = state.get_allowance_between(bs, OWNER, SPENDER).unwrap();
        assert_eq!(initial_allowance, TokenAmount::zero());

        // can set a positive allowance
        let allowance = TokenAmount::from(100);
        let old_allowance = state.set_allowance(bs, OWNER, SPENDER, &allowance).unwrap();
        assert_eq!(old_allowance, TokenAmount::zero());
        assert_eq!(state.get_allowance_between(bs, OWNER, SPENDER).unwrap(), allowance);

        // vice-versa allowance was unaffected
        assert_eq!(state.get_allowance_between(bs, SPENDER, OWNER).unwrap(), TokenAmount::zero());

        // can overwrite with a different non-zero allowance in one step
        let allowance = TokenAmount::from(120);
        let old_allowance = state.set_allowance(bs, OWNER, SPENDER, &allowance).unwrap();
        assert_eq!(old_allowance, TokenAmount::from(100));
        assert_eq!(state.get_allowance_between(bs, OWNER, SPENDER).unwrap(), allowance);

        // a zero allowance is kept as an explicit zero
        let old_allowance = state.set_allowance(bs, OWNER, SPENDER, &TokenAmount::zero()).unwrap();
        assert_eq!(old_allowance, TokenAmount::from(120));
        assert_eq!(state.get_allowance_between(bs, OWNER, SPENDER).unwrap(), TokenAmount::zero());
        let root_map = state.get_allowances_map(bs).unwrap();
        assert!(root_map.contains_key(&account_key(OWNER)).unwrap());
    }

    #[test]
    fn it_changes_allowances_without_clamping() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        let ret = state.increase_allowance(bs, OWNER, SPENDER, &TokenAmount::from(100)).unwrap();
        assert_eq!(ret, TokenAmount::from(100));
        let ret = state.decrease_allowance(bs, OWNER, SPENDER, &TokenAmount::from(40)).unwrap();
        assert_eq!(ret, TokenAmount::from(60));

        // decreasing past zero fails and leaves the allowance alone
        let err = state.decrease_allowance(bs, OWNER, SPENDER, &TokenAmount::from(61)).unwrap_err();
        if let StateError::AllowanceUnderflow { owner, spender, allowance, decrease } = err {
            assert_eq!(owner, OWNER);
            assert_eq!(spender, SPENDER);
            assert_eq!(allowance, TokenAmount::from(60));
            assert_eq!(decrease, TokenAmount::from(61));
        } else {
            panic!("unexpected error {err:?}");
        }
        assert_eq!(state.get_allowance_between(bs, OWNER, SPENDER).unwrap(), TokenAmount::from(60));

        // increasing past the 256-bit range fails too
        let err = state.increase_allowance(bs, OWNER, SPENDER, &TokenAmount::MAX).unwrap_err();
        assert!(matches!(err, StateError::Overflow { name: "allowance", .. }));
        assert_eq!(state.get_allowance_between(bs, OWNER, SPENDER).unwrap(), TokenAmount::from(60));
    }

    #[test]
    fn it_counts_holders_and_checks_invariants() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        for id in 1..=3 {
            let amount = TokenAmount::from(10 * id);
            state.increase_balance(bs, AccountId::new(id), &amount).unwrap();
            state.increase_supply(&amount).unwrap();
        }
        state.decrease_balance(bs, AccountId::new(3), &TokenAmount::from(30)).unwrap();
        state.decrease_supply(&TokenAmount::from(30)).unwrap();
        state.set_allowance(bs, OWNER, SPENDER, &TokenAmount::from(5)).unwrap();

        assert_eq!(state.count_balances(bs).unwrap(), 2);
        let summary = state.check_invariants(bs).unwrap();
        assert_eq!(summary.total_supply, TokenAmount::from(30));
        assert_eq!(summary.holders, 2);
        assert_eq!(summary.approvers, 1);

        // supply drifting away from the balances is caught
        state.supply = TokenAmount::from(31);
        let err = state.check_invariants(bs).unwrap_err();
        assert!(matches!(err, StateInvariantError::BalanceSupplyMismatch { .. }));
    }

    #[test]
    fn it_flags_a_null_account_balance() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new(bs).unwrap();

        // the state layer does not police the null account, the invariant check does
        state.increase_balance(bs, AccountId::NULL, &TokenAmount::from(1)).unwrap();
        state.increase_supply(&TokenAmount::from(1)).unwrap();
        let err = state.check_invariants(bs).unwrap_err();
        assert!(matches!(err, StateInvariantError::NullAccountBalance(_)));
    }

    #[test]
    fn it_allows_variable_bit_width() {
        let bs = &MemoryBlockstore::new();
        let mut state = LedgerState::new_with_bit_width(bs, 8).unwrap();
        let amount = TokenAmount::from(5);
        for owner in 1_u64..10_u64 {
            state.increase_balance(bs, AccountId::new(owner), &amount).unwrap();
        }
        let cid = state.save(bs).unwrap();

        let loaded_state = LedgerState::load(bs, &cid).unwrap();
        assert_eq!(loaded_state.hamt_bit_width(), 8);
        for owner in 1_u64..10_u64 {
            // loading the hamts with the wrong bitwidth would result in corrupted data
            let balance = loaded_state.get_balance(bs, AccountId::new(owner)).unwrap();
            assert_eq!(balance, amount);
        }
    }
}
