use cid::Cid;
use fvm_ipld_blockstore::MemoryBlockstore;
use token_ledger::{
    whole_tokens, AccountId, LedgerEvent, LedgerParams, TokenAmount, TokenLedger,
    DEFAULT_DECIMALS,
};

pub type TestLedger = TokenLedger<MemoryBlockstore, Vec<LedgerEvent>>;

pub const HOLDER: AccountId = AccountId::new(100);
pub const ALICE: AccountId = AccountId::new(101);
pub const BOB: AccountId = AccountId::new(102);

/// Amount of whole tokens at the standard 18 decimals
pub fn tokens(whole: u64) -> TokenAmount {
    whole_tokens(whole, DEFAULT_DECIMALS).unwrap()
}

/// Construct a ledger minting `initial_supply` whole tokens to HOLDER
pub fn construct_ledger(initial_supply: u64) -> TestLedger {
    let params = LedgerParams {
        name: "Scenario Token".into(),
        symbol: "SCN".into(),
        decimals: DEFAULT_DECIMALS,
        initial_holder: HOLDER,
        initial_supply: tokens(initial_supply),
    };
    TokenLedger::new(MemoryBlockstore::new(), Vec::new(), params).unwrap()
}

/// Flush the ledger and load it back from its root, keeping the recorded events
#[allow(dead_code)]
pub fn reload(ledger: TestLedger) -> (Cid, TestLedger) {
    let mut ledger = ledger;
    let cid = ledger.flush().unwrap();
    let (store, events) = ledger.into_parts();
    (cid, TokenLedger::load(store, events, &cid).unwrap())
}

/// Balances of the given accounts, in order
pub fn balances(ledger: &TestLedger, accounts: &[AccountId]) -> Vec<TokenAmount> {
    accounts.iter().map(|a| ledger.balance_of(*a).unwrap()).collect()
}
