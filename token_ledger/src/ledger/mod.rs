use cid::multihash::Code;
use cid::Cid;
pub use error::LedgerError;
use fvm_ipld_blockstore::{Block, Blockstore};
use fvm_ipld_encoding::tuple::*;
use fvm_ipld_encoding::{CborStore, DAG_CBOR};
use log::debug;

use self::state::{LedgerState, StateError as LedgerStateError, StateSummary};
use self::types::{AccountId, LedgerParams, TokenAmount, TokenMetadata};
use crate::events::{EventSink, LedgerEvent};

mod error;
pub mod state;
pub mod types;

type Result<T> = std::result::Result<T, LedgerError>;

/// Persisted form of a ledger: its descriptive metadata next to the state roots
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
struct LedgerRoot {
    metadata: TokenMetadata,
    state: LedgerState,
}

/// A fungible token ledger with owner-authorised delegated spending
///
/// Holds the blockstore backing the balance and allowance Hamts, and the sink that observes
/// transfer and approval events. Every mutating operation is atomic: it either commits in full
/// and then emits its events, or fails leaving state and sink untouched.
///
/// Blocks are never deleted from the store. Each mutation writes fresh Hamt nodes, failed ones
/// included, so the store keeps every historical root and grows for the life of the ledger.
pub struct TokenLedger<BS, E>
where
    BS: Blockstore,
    E: EventSink,
{
    /// Backing store for the state Hamts
    store: BS,
    /// Observer of emitted events
    events: E,
    metadata: TokenMetadata,
    state: LedgerState,
}

impl<BS, E> TokenLedger<BS, E>
where
    BS: Blockstore,
    E: EventSink,
{
    /// Creates a new ledger, minting the initial supply to the initial holder
    ///
    /// The mint is observable as a transfer event from the null account.
    pub fn new(store: BS, events: E, params: LedgerParams) -> Result<Self> {
        let state = LedgerState::new(&store)?;
        Self::create(store, events, params, state)
    }

    /// Creates a new ledger, specifying the underlying Hamt bit width
    pub fn new_with_bit_width(
        store: BS,
        events: E,
        params: LedgerParams,
        hamt_bit_width: u32,
    ) -> Result<Self> {
        let state = LedgerState::new_with_bit_width(&store, hamt_bit_width)?;
        Self::create(store, events, params, state)
    }

    fn create(store: BS, events: E, params: LedgerParams, state: LedgerState) -> Result<Self> {
        let mut ledger = Self::wrap(store, events, params.metadata(), state);
        ledger.mint(params.initial_holder, &params.initial_supply)?;
        debug!(
            "created ledger {} ({}) with supply {} held by {}",
            ledger.metadata.name,
            ledger.metadata.symbol,
            params.initial_supply,
            params.initial_holder
        );
        Ok(ledger)
    }

    fn wrap(store: BS, events: E, metadata: TokenMetadata, state: LedgerState) -> Self {
        Self { store, events, metadata, state }
    }

    /// Loads a ledger previously persisted with `flush`
    ///
    /// The loaded state must satisfy the ledger invariants, otherwise loading fails with
    /// `LedgerError::StateInvariant`.
    pub fn load(store: BS, events: E, cid: &Cid) -> Result<Self> {
        let root = match store.get_cbor::<LedgerRoot>(cid) {
            Ok(Some(root)) => root,
            Ok(None) => return Err(LedgerStateError::MissingState(*cid).into()),
            Err(err) => return Err(LedgerStateError::Serialization(err.to_string()).into()),
        };
        root.state.check_invariants(&store)?;
        Ok(Self::wrap(store, events, root.metadata, root.state))
    }

    /// Flush metadata and state, returning the root Cid
    pub fn flush(&mut self) -> Result<Cid> {
        let root = LedgerRoot { metadata: self.metadata.clone(), state: self.state.clone() };
        let block = Block { codec: DAG_CBOR, data: fvm_ipld_encoding::to_vec(&root)? };
        let cid = self
            .store
            .put(Code::Blake2b256, &block)
            .map_err(|err| LedgerStateError::Serialization(err.to_string()))?;
        debug!("flushed ledger {} to {}", self.metadata.symbol, cid);
        Ok(cid)
    }

    /// Get a reference to the wrapped state tree
    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    /// Get a reference to the underlying blockstore
    pub fn store(&self) -> &BS {
        &self.store
    }

    /// Get a reference to the event sink
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Get a mutable reference to the event sink, e.g. to drain recorded events
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Consumes the ledger, returning its store and sink
    pub fn into_parts(self) -> (BS, E) {
        (self.store, self.events)
    }

    /// Opens an atomic transaction on LedgerState which allows a closure to make multiple
    /// modifications to the state tree and queue events.
    ///
    /// If the closure returns an error, the transaction is dropped atomically: no change is
    /// observed on ledger state and none of the queued events reach the sink.
    fn transaction<F, Res>(&mut self, f: F) -> Result<Res>
    where
        F: FnOnce(&mut LedgerState, &BS, &mut Vec<LedgerEvent>) -> Result<Res>,
    {
        let mut mutable_state = self.state.clone();
        let mut pending = Vec::new();
        let res = f(&mut mutable_state, &self.store, &mut pending)?;
        // if closure didn't error, save state and publish
        self.state = mutable_state;
        for event in &pending {
            self.events.emit(event);
        }
        Ok(res)
    }
}

impl<BS, E> TokenLedger<BS, E>
where
    BS: Blockstore,
    E: EventSink,
{
    pub fn metadata(&self) -> &TokenMetadata {
        &self.metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    /// Gets the total number of tokens in existence
    ///
    /// This always equals the sum of `balance_of` over all accounts.
    pub fn total_supply(&self) -> TokenAmount {
        self.state.supply
    }

    /// Returns the balance of an account
    ///
    /// Accounts that have never received tokens implicitly have a zero balance
    pub fn balance_of(&self, account: AccountId) -> Result<TokenAmount> {
        Ok(self.state.get_balance(&self.store, account)?)
    }

    /// Gets the allowance `owner` has granted to `spender`
    ///
    /// An allowance is the amount that the spender can move out of the owner's account via
    /// `transfer_from`. Pairs that were never approved have an implicit zero allowance.
    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<TokenAmount> {
        Ok(self.state.get_allowance_between(&self.store, owner, spender)?)
    }

    /// Mints new tokens into an account, increasing total supply by the same amount
    ///
    /// Fails with `InvalidAccount` for the null account, or an overflow error if either the supply
    /// or the balance would exceed the 256-bit range. Emits a transfer from the null account.
    pub fn mint(&mut self, account: AccountId, amount: &TokenAmount) -> Result<()> {
        if account.is_null() {
            return Err(LedgerError::InvalidAccount);
        }

        self.transaction(|state, bs, pending| {
            state.increase_supply(amount)?;
            state.increase_balance(bs, account, amount)?;
            pending.push(LedgerEvent::transfer(AccountId::NULL, account, *amount));
            Ok(())
        })?;
        debug!("minted {amount} to {account}");
        Ok(())
    }

    /// Destroys tokens held by an account, decreasing total supply by the same amount
    ///
    /// Not part of the public call set. Emits a transfer to the null account.
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn burn(&mut self, account: AccountId, amount: &TokenAmount) -> Result<()> {
        if account.is_null() {
            return Err(LedgerError::InvalidAccount);
        }

        self.transaction(|state, bs, pending| {
            state.decrease_balance(bs, account, amount)?;
            state.decrease_supply(amount)?;
            pending.push(LedgerEvent::transfer(account, AccountId::NULL, *amount));
            Ok(())
        })?;
        debug!("burned {amount} from {account}");
        Ok(())
    }

    /// Moves `amount` from the caller's account to `to`
    ///
    /// Fails if either account is null or the caller's balance is short. Always returns `true`
    /// when it does not fail.
    pub fn transfer(
        &mut self,
        caller: AccountId,
        to: AccountId,
        amount: &TokenAmount,
    ) -> Result<bool> {
        check_transfer_parties(caller, to)?;

        self.transaction(|state, bs, pending| {
            move_balance(state, bs, pending, caller, to, amount)
        })?;
        debug!("{caller} transferred {amount} to {to}");
        Ok(true)
    }

    /// Sets the allowance the caller grants to `spender`, replacing any previous value
    ///
    /// The new value is absolute, so a non-zero allowance can be changed to another non-zero
    /// value in one step. Always returns `true` when it does not fail.
    pub fn approve(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        amount: &TokenAmount,
    ) -> Result<bool> {
        check_approval_parties(caller, spender)?;

        self.transaction(|state, bs, pending| {
            set_approval(state, bs, pending, caller, spender, amount)
        })?;
        debug!("{caller} approved {spender} for {amount}");
        Ok(true)
    }

    /// Moves `amount` from `from` to `to` on behalf of the caller, consuming the allowance `from`
    /// granted to the caller
    ///
    /// The allowance is checked and debited before any balance moves, so an insufficient
    /// allowance leaves balances alone. An unlimited allowance is never decremented. Always
    /// returns `true` when it does not fail.
    pub fn transfer_from(
        &mut self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: &TokenAmount,
    ) -> Result<bool> {
        self.transaction(|state, bs, pending| {
            spend_allowance(state, bs, pending, from, caller, amount)?;
            check_transfer_parties(from, to)?;
            move_balance(state, bs, pending, from, to, amount)
        })?;
        debug!("{caller} transferred {amount} from {from} to {to}");
        Ok(true)
    }

    /// Raises the allowance the caller grants to `spender` by `added_value`
    ///
    /// Fails with an overflow error rather than wrapping past the 256-bit range.
    pub fn increase_allowance(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        added_value: &TokenAmount,
    ) -> Result<bool> {
        check_approval_parties(caller, spender)?;

        let new_allowance = self.transaction(|state, bs, pending| {
            let new_allowance = state.increase_allowance(bs, caller, spender, added_value)?;
            pending.push(LedgerEvent::approval(caller, spender, new_allowance));
            Ok(new_allowance)
        })?;
        debug!("{caller} raised allowance of {spender} to {new_allowance}");
        Ok(true)
    }

    /// Lowers the allowance the caller grants to `spender` by `subtracted_value`
    ///
    /// Fails with `AllowanceUnderflow` if `subtracted_value` exceeds the current allowance; the
    /// allowance is never clamped to zero.
    pub fn decrease_allowance(
        &mut self,
        caller: AccountId,
        spender: AccountId,
        subtracted_value: &TokenAmount,
    ) -> Result<bool> {
        check_approval_parties(caller, spender)?;

        let new_allowance = self.transaction(|state, bs, pending| {
            let new_allowance = state.decrease_allowance(bs, caller, spender, subtracted_value)?;
            pending.push(LedgerEvent::approval(caller, spender, new_allowance));
            Ok(new_allowance)
        })?;
        debug!("{caller} lowered allowance of {spender} to {new_allowance}");
        Ok(true)
    }

    /// Checks the state invariants, returning a summary of the state if they hold
    pub fn check_invariants(&self) -> Result<StateSummary> {
        Ok(self.state.check_invariants(&self.store)?)
    }
}

fn check_transfer_parties(from: AccountId, to: AccountId) -> Result<()> {
    if from.is_null() {
        return Err(LedgerError::InvalidSender);
    }
    if to.is_null() {
        return Err(LedgerError::InvalidReceiver);
    }
    Ok(())
}

fn check_approval_parties(owner: AccountId, spender: AccountId) -> Result<()> {
    if owner.is_null() {
        return Err(LedgerError::InvalidOwner);
    }
    if spender.is_null() {
        return Err(LedgerError::InvalidSpender);
    }
    Ok(())
}

/// Debits `from` and credits `to`, queueing the transfer event
///
/// `from == to` still requires a sufficient balance, nets to no change and emits an event.
fn move_balance<BS: Blockstore>(
    state: &mut LedgerState,
    bs: &BS,
    pending: &mut Vec<LedgerEvent>,
    from: AccountId,
    to: AccountId,
    amount: &TokenAmount,
) -> Result<()> {
    state.decrease_balance(bs, from, amount)?;
    state.increase_balance(bs, to, amount)?;
    pending.push(LedgerEvent::transfer(from, to, *amount));
    Ok(())
}

fn set_approval<BS: Blockstore>(
    state: &mut LedgerState,
    bs: &BS,
    pending: &mut Vec<LedgerEvent>,
    owner: AccountId,
    spender: AccountId,
    amount: &TokenAmount,
) -> Result<()> {
    check_approval_parties(owner, spender)?;
    state.set_allowance(bs, owner, spender, amount)?;
    pending.push(LedgerEvent::approval(owner, spender, *amount));
    Ok(())
}

/// Consumes `amount` of the allowance `owner` granted to `spender`
///
/// An unlimited allowance is left as is and emits nothing. Otherwise the reduced allowance is
/// written through the approval path and re-announced.
fn spend_allowance<BS: Blockstore>(
    state: &mut LedgerState,
    bs: &BS,
    pending: &mut Vec<LedgerEvent>,
    owner: AccountId,
    spender: AccountId,
    amount: &TokenAmount,
) -> Result<()> {
    let current = state.get_allowance_between(bs, owner, spender)?;
    if current == types::UNLIMITED_ALLOWANCE {
        return Ok(());
    }
    if current < *amount {
        return Err(LedgerStateError::InsufficientAllowance {
            owner,
            spender,
            available: current,
            required: *amount,
        }
        .into());
    }
    set_approval(state, bs, pending, owner, spender, &(current - *amount))
}
