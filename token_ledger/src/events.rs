use fvm_ipld_encoding::tuple::{Deserialize_tuple, Serialize_tuple};
use log::info;
use serde::{Deserialize, Serialize};

use crate::ledger::types::{AccountId, TokenAmount};

/// Movement of tokens between two accounts
///
/// `from == AccountId::NULL` records a mint and `to == AccountId::NULL` a burn.
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct TransferEvent {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: TokenAmount,
}

/// New absolute allowance granted by `owner` to `spender`
#[derive(Serialize_tuple, Deserialize_tuple, PartialEq, Eq, Clone, Debug)]
pub struct ApprovalEvent {
    pub owner: AccountId,
    pub spender: AccountId,
    pub amount: TokenAmount,
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
pub enum LedgerEvent {
    Transfer(TransferEvent),
    Approval(ApprovalEvent),
}

impl LedgerEvent {
    pub fn transfer(from: AccountId, to: AccountId, amount: TokenAmount) -> Self {
        LedgerEvent::Transfer(TransferEvent { from, to, amount })
    }

    pub fn approval(owner: AccountId, spender: AccountId, amount: TokenAmount) -> Self {
        LedgerEvent::Approval(ApprovalEvent { owner, spender, amount })
    }
}

/// Receiver of the events produced by ledger operations
///
/// The ledger invokes the sink synchronously, in emission order, once an operation has committed.
/// Operations that fail emit nothing.
pub trait EventSink {
    fn emit(&mut self, event: &LedgerEvent);
}

/// Records every event, oldest first
impl EventSink for Vec<LedgerEvent> {
    fn emit(&mut self, event: &LedgerEvent) {
        self.push(event.clone());
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &LedgerEvent) {
        (**self).emit(event)
    }
}

/// Writes events through the `log` facade under the `token_ledger::events` target
#[derive(Clone, Copy, Default, Debug)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&mut self, event: &LedgerEvent) {
        match event {
            LedgerEvent::Transfer(TransferEvent { from, to, amount }) => {
                info!(target: "token_ledger::events", "Transfer from={from} to={to} amount={amount}")
            }
            LedgerEvent::Approval(ApprovalEvent { owner, spender, amount }) => {
                info!(target: "token_ledger::events", "Approval owner={owner} spender={spender} amount={amount}")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use env_logger::{Builder, Target};
    use log::LevelFilter;

    use super::{EventSink, LedgerEvent, LogSink};
    use crate::ledger::types::{AccountId, TokenAmount};

    const ALICE: AccountId = AccountId::new(3);
    const BOB: AccountId = AccountId::new(4);

    #[test]
    fn records_events_in_order() {
        let mut sink: Vec<LedgerEvent> = Vec::new();
        sink.emit(&LedgerEvent::transfer(AccountId::NULL, ALICE, TokenAmount::from(10)));
        sink.emit(&LedgerEvent::approval(ALICE, BOB, TokenAmount::from(5)));

        assert_eq!(
            sink,
            vec![
                LedgerEvent::transfer(AccountId::NULL, ALICE, TokenAmount::from(10)),
                LedgerEvent::approval(ALICE, BOB, TokenAmount::from(5)),
            ]
        );
    }

    #[test]
    fn boxed_sinks_forward() {
        let mut sink: Box<Vec<LedgerEvent>> = Box::default();
        sink.emit(&LedgerEvent::transfer(ALICE, BOB, TokenAmount::from(1)));
        assert_eq!(sink.len(), 1);

        let mut dyn_sink: Box<dyn EventSink> = Box::new(Vec::<LedgerEvent>::new());
        dyn_sink.emit(&LedgerEvent::approval(ALICE, BOB, TokenAmount::MAX));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn log_sink_writes_each_event() {
        let captured = Captured::default();
        Builder::new()
            .filter_level(LevelFilter::Off)
            .filter_module("token_ledger::events", LevelFilter::Info)
            .format(|buf, record| writeln!(buf, "{} {}", record.target(), record.args()))
            .target(Target::Pipe(Box::new(captured.clone())))
            .try_init()
            .unwrap();

        let mut sink = LogSink;
        sink.emit(&LedgerEvent::transfer(AccountId::NULL, ALICE, TokenAmount::from(10)));
        sink.emit(&LedgerEvent::approval(ALICE, BOB, TokenAmount::from(5)));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            output,
            "token_ledger::events Transfer from=acct0 to=acct3 amount=10\n\
             token_ledger::events Approval owner=acct3 spender=acct4 amount=5\n"
        );
    }
}
