//! Scripted chain double shared by the service tests.

use async_trait::async_trait;
use ethers::{
    abi::{self, Token},
    contract::EthEvent,
    types::{Address, Log, TransactionReceipt, H256, U256, U64},
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::time::{sleep, Duration};

use super::onchain::{
    ChainFailure, EnchantResultFilter, GameCall, GameChain, MiningResultFilter, TransferFilter,
};

pub struct MockChain {
    token: Address,
    simulate_failure: Mutex<Option<ChainFailure>>,
    send_failure: Mutex<Option<ChainFailure>>,
    next_logs: Mutex<Vec<Log>>,
    sent: Mutex<Vec<GameCall>>,
    receipts: Mutex<HashMap<H256, TransactionReceipt>>,
    withhold_receipts: AtomicBool,
    revert_on_chain: AtomicBool,
    send_delay: Duration,
    counter: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            token: Address::repeat_byte(0x70),
            simulate_failure: Mutex::new(None),
            send_failure: Mutex::new(None),
            next_logs: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            receipts: Mutex::new(HashMap::new()),
            withhold_receipts: AtomicBool::new(false),
            revert_on_chain: AtomicBool::new(false),
            send_delay: Duration::ZERO,
            counter: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn token(&self) -> Address {
        self.token
    }

    pub fn fail_simulation(&self, failure: ChainFailure) {
        *self.simulate_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_send(&self, failure: ChainFailure) {
        *self.send_failure.lock().unwrap() = Some(failure);
    }

    pub fn clear_failures(&self) {
        *self.simulate_failure.lock().unwrap() = None;
        *self.send_failure.lock().unwrap() = None;
    }

    /// Logs attached to the receipt of the next sent transaction.
    pub fn push_logs(&self, logs: Vec<Log>) {
        *self.next_logs.lock().unwrap() = logs;
    }

    pub fn withhold_receipts(&self, withhold: bool) {
        self.withhold_receipts.store(withhold, Ordering::SeqCst);
    }

    pub fn revert_on_chain(&self, revert: bool) {
        self.revert_on_chain.store(revert, Ordering::SeqCst);
    }

    /// Makes a receipt visible for a hash sent while receipts were withheld.
    pub fn release_receipt(&self, tx_hash: H256, success: bool) {
        self.receipts
            .lock()
            .unwrap()
            .insert(tx_hash, receipt(tx_hash, success, Vec::new()));
    }

    pub fn sent_calls(&self) -> Vec<GameCall> {
        self.sent.lock().unwrap().clone()
    }

    pub fn max_concurrent_sends(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn receipt(tx_hash: H256, success: bool, logs: Vec<Log>) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash,
        status: Some(U64::from(u64::from(success))),
        block_number: Some(U64::from(1_000)),
        gas_used: Some(U256::from(90_000)),
        logs,
        ..Default::default()
    }
}

#[async_trait]
impl GameChain for MockChain {
    async fn simulate(&self, _call: &GameCall) -> Result<(), ChainFailure> {
        match self.simulate_failure.lock().unwrap().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    async fn send(&self, call: &GameCall, _gas_limit: u64) -> Result<H256, ChainFailure> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.send_delay.is_zero() {
            sleep(self.send_delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(failure) = self.send_failure.lock().unwrap().clone() {
            return Err(failure);
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let tx_hash = H256::from_low_u64_be(n);
        self.sent.lock().unwrap().push(call.clone());

        if !self.withhold_receipts.load(Ordering::SeqCst) {
            let logs = std::mem::take(&mut *self.next_logs.lock().unwrap());
            let success = !self.revert_on_chain.load(Ordering::SeqCst);
            self.receipts
                .lock()
                .unwrap()
                .insert(tx_hash, receipt(tx_hash, success, logs));
        }
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>, ChainFailure> {
        Ok(self.receipts.lock().unwrap().get(&tx_hash).cloned())
    }

    async fn hash_token(&self) -> Result<Address, ChainFailure> {
        Ok(self.token)
    }
}

pub fn mining_log(user: Address, token_id: u64, is_equipment: bool) -> Log {
    Log {
        topics: vec![MiningResultFilter::signature(), H256::from(user)],
        data: abi::encode(&[
            Token::Uint(U256::from(token_id)),
            Token::Uint(U256::from(777)),
            Token::Bool(is_equipment),
        ])
        .into(),
        ..Default::default()
    }
}

pub fn enchant_log(user: Address, item_id: u64, new_level: u64, success: bool) -> Log {
    Log {
        topics: vec![EnchantResultFilter::signature(), H256::from(user)],
        data: abi::encode(&[
            Token::Uint(U256::from(item_id)),
            Token::Uint(U256::from(new_level)),
            Token::Bool(success),
        ])
        .into(),
        ..Default::default()
    }
}

pub fn transfer_log(token: Address, from: Address, to: Address, value: u128) -> Log {
    Log {
        address: token,
        topics: vec![TransferFilter::signature(), H256::from(from), H256::from(to)],
        data: abi::encode(&[Token::Uint(U256::from(value))]).into(),
        ..Default::default()
    }
}
