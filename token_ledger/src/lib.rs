//! A fungible token ledger: one global supply of divisible units spread across accounts, with
//! owner-authorised delegated spending through allowances.
//!
//! Balances and allowances live in Hamts over an injected blockstore, so a ledger can be flushed
//! to a root Cid and reloaded later. Transfer and approval events are handed to an injected
//! [`EventSink`](events::EventSink) once the operation producing them has committed.

pub mod events;
pub mod ledger;
pub mod shared;

pub use events::{ApprovalEvent, EventSink, LedgerEvent, LogSink, TransferEvent};
pub use ledger::types::{
    whole_tokens, AccountId, LedgerParams, TokenAmount, TokenMetadata, DEFAULT_DECIMALS,
    UNLIMITED_ALLOWANCE,
};
pub use ledger::{LedgerError, TokenLedger};
pub use shared::SharedLedger;
