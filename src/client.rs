//! The chain client boundary. The engine only calls these methods; transports, retries
//! and RPC framing live behind the trait.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::Error;
use crate::types::{Address, EventFilter, Instruction, RawEvent};

#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// Raw account data, or `None` when no account exists at `address`.
    async fn fetch_account(&self, address: &Address) -> Result<Option<Vec<u8>>, Error>;

    /// Events matching `filter`. Implementations may over-return; the reader re-filters.
    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, Error>;

    /// Send a single instruction and return its transaction id.
    async fn submit_instruction(&self, instruction: &Instruction) -> Result<String, Error>;

    fn derive_address(&self, program: &Address, seeds: &[&[u8]]) -> Option<Address> {
        Address::try_find_program_address(seeds, program).map(|(address, _bump)| address)
    }
}

/// A [`ChainClient`] backed by in-memory maps, for tests and offline replay.
#[derive(Debug, Default)]
pub struct InMemoryChainClient {
    accounts: DashMap<Address, Vec<u8>>,
    events: Vec<RawEvent>,
    submitted: Mutex<Vec<Instruction>>,
    account_fetches: DashMap<Address, usize>,
    total_fetches: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, address: Address, data: Vec<u8>) -> Self {
        self.accounts.insert(address, data);
        self
    }

    pub fn with_events(mut self, events: Vec<RawEvent>) -> Self {
        self.events.extend(events);
        self
    }

    /// Every fetch sleeps this long first, so callers can race cancellation against it.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_account(&self, address: Address, data: Vec<u8>) {
        self.accounts.insert(address, data);
    }

    pub fn fetch_count(&self, address: &Address) -> usize {
        self.account_fetches.get(address).map_or(0, |count| *count)
    }

    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::Relaxed)
    }

    pub async fn submitted(&self) -> Vec<Instruction> {
        self.submitted.lock().await.clone()
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    async fn wait(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl ChainClient for InMemoryChainClient {
    async fn fetch_account(&self, address: &Address) -> Result<Option<Vec<u8>>, Error> {
        self.wait().await;
        *self.account_fetches.entry(*address).or_insert(0) += 1;
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.accounts.get(address).map(|data| data.value().clone()))
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<RawEvent>, Error> {
        self.wait().await;
        Ok(self
            .events
            .iter()
            .filter(|e| e.program_id == filter.program_id)
            .cloned()
            .collect())
    }

    async fn submit_instruction(&self, instruction: &Instruction) -> Result<String, Error> {
        let mut submitted = self.submitted.lock().await;
        submitted.push(instruction.clone());
        Ok(format!("tx-{}", submitted.len()))
    }
}
