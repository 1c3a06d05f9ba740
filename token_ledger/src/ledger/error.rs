use fvm_ipld_encoding::Error as SerializationError;
use thiserror::Error;

use crate::ledger::state::StateError as LedgerStateError;
use crate::ledger::state::StateInvariantError;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("the null account cannot hold or receive tokens")]
    InvalidAccount,
    #[error("transfer sender cannot be the null account")]
    InvalidSender,
    #[error("transfer receiver cannot be the null account")]
    InvalidReceiver,
    #[error("approval owner cannot be the null account")]
    InvalidOwner,
    #[error("approval spender cannot be the null account")]
    InvalidSpender,
    #[error("error in underlying state {0}")]
    LedgerState(#[from] LedgerStateError),
    #[error("error during serialization {0}")]
    Serialization(#[from] SerializationError),
    #[error("error in state invariants {0}")]
    StateInvariant(#[from] StateInvariantError),
}

impl LedgerError {
    /// Whether the failure came from the storage layer rather than from the caller's inputs
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            LedgerError::Serialization(_)
                | LedgerError::LedgerState(
                    LedgerStateError::IpldHamt(_)
                        | LedgerStateError::MissingState(_)
                        | LedgerStateError::Serialization(_)
                )
        )
    }
}
