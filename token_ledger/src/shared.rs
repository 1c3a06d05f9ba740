use std::sync::{Mutex, MutexGuard, PoisonError};

use fvm_ipld_blockstore::Blockstore;

use crate::events::EventSink;
use crate::ledger::types::{AccountId, TokenAmount};
use crate::ledger::{LedgerError, TokenLedger};

type Result<T> = std::result::Result<T, LedgerError>;

/// A ledger that can be shared between threads
///
/// Every call, reads included, goes through one lock, so operations are applied in a single total
/// order and a read never sees a half-applied operation. A lock poisoned by a panicking caller is
/// recovered: the ledger only swaps in new state when an operation commits, so whatever sits
/// behind a poisoned lock is the last committed state.
pub struct SharedLedger<BS, E>
where
    BS: Blockstore,
    E: EventSink,
{
    inner: Mutex<TokenLedger<BS, E>>,
}

impl<BS, E> SharedLedger<BS, E>
where
    BS: Blockstore,
    E: EventSink,
{
    pub fn new(ledger: TokenLedger<BS, E>) -> Self {
        Self { inner: Mutex::new(ledger) }
    }

    fn lock(&self) -> MutexGuard<'_, TokenLedger<BS, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` with exclusive access to the ledger
    ///
    /// Use this to observe or apply several operations with nothing interleaved between them.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut TokenLedger<BS, E>) -> R,
    {
        f(&mut self.lock())
    }

    pub fn into_inner(self) -> TokenLedger<BS, E> {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn total_supply(&self) -> TokenAmount {
        self.lock().total_supply()
    }

    pub fn balance_of(&self, account: AccountId) -> Result<TokenAmount> {
        self.lock().balance_of(account)
    }

    pub fn allowance(&self, owner: AccountId, spender: AccountId) -> Result<TokenAmount> {
        self.lock().allowance(owner, spender)
    }

    pub fn mint(&self, account: AccountId, amount: &TokenAmount) -> Result<()> {
        self.lock().mint(account, amount)
    }

    pub fn transfer(&self, caller: AccountId, to: AccountId, amount: &TokenAmount) -> Result<bool> {
        self.lock().transfer(caller, to, amount)
    }

    pub fn approve(
        &self,
        caller: AccountId,
        spender: AccountId,
        amount: &TokenAmount,
    ) -> Result<bool> {
        self.lock().approve(caller, spender, amount)
    }

    pub fn transfer_from(
        &self,
        caller: AccountId,
        from: AccountId,
        to: AccountId,
        amount: &TokenAmount,
    ) -> Result<bool> {
        self.lock().transfer_from(caller, from, to, amount)
    }

    pub fn increase_allowance(
        &self,
        caller: AccountId,
        spender: AccountId,
        added_value: &TokenAmount,
    ) -> Result<bool> {
        self.lock().increase_allowance(caller, spender, added_value)
    }

    pub fn decrease_allowance(
        &self,
        caller: AccountId,
        spender: AccountId,
        subtracted_value: &TokenAmount,
    ) -> Result<bool> {
        self.lock().decrease_allowance(caller, spender, subtracted_value)
    }
}
