//! Per-call state: memoized lookups, account snapshots, resolved tables, cancellation and
//! the resolution lifecycle. A scope is created when a read or write starts and dropped
//! when it returns.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::client::ChainClient;
use crate::error::Error;
use crate::lookup::Fingerprint;
use crate::types::{AccountMeta, Address};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::FromRepr,
)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum ResolutionState {
    Unstarted,
    Resolving,
    Succeeded,
    Failed,
}

/// Caller controls for one read or write.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub cancel: CancellationToken,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout: Some(timeout),
        }
    }

    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            timeout: None,
        }
    }
}

pub type AccountSnapshot = Option<Arc<Vec<u8>>>;

/// Entries of every lookup table a derived table name resolved to, in resolution order.
pub type TableContents = Vec<(Address, Vec<Address>)>;

#[derive(Debug)]
pub struct CallScope {
    namespace: String,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    state: AtomicU8,
    lookups: DashMap<Fingerprint, Arc<OnceCell<Vec<AccountMeta>>>>,
    accounts: DashMap<Address, Arc<OnceCell<AccountSnapshot>>>,
    tables: DashMap<String, TableContents>,
    fetches: AtomicUsize,
}

impl CallScope {
    /// `namespace` selects the schema used to decode internal-field indirections.
    pub fn new(namespace: &str, options: &CallOptions) -> Self {
        Self {
            namespace: namespace.to_string(),
            cancel: options.cancel.child_token(),
            deadline: options.timeout.map(|t| Instant::now() + t),
            state: AtomicU8::new(ResolutionState::Unstarted as u8),
            lookups: DashMap::new(),
            accounts: DashMap::new(),
            tables: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn state(&self) -> ResolutionState {
        ResolutionState::from_repr(self.state.load(Ordering::Acquire))
            .unwrap_or(ResolutionState::Failed)
    }

    /// `Unstarted → Resolving`. Later calls are no-ops.
    pub(crate) fn begin(&self) {
        let _ = self.state.compare_exchange(
            ResolutionState::Unstarted as u8,
            ResolutionState::Resolving as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Record the outcome and cancel anything still in flight on failure. Only a
    /// `Resolving` scope moves; terminal states stick.
    pub(crate) fn finish<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        let next = if result.is_ok() {
            ResolutionState::Succeeded
        } else {
            self.cancel.cancel();
            ResolutionState::Failed
        };
        let _ = self.state.compare_exchange(
            ResolutionState::Resolving as u8,
            next as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        trace!(namespace = %self.namespace, state = %self.state(), "scope finished");
        result
    }

    /// Run `fut` unless the caller cancels or the deadline passes first.
    pub(crate) async fn guarded<T, F>(&self, what: &str, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        let raced = async {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => Err(Error::Cancelled {
                    reason: format!("{what}: cancelled by caller"),
                }),
                result = fut => result,
            }
        };
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, raced)
                .await
                .map_err(|_| Error::Cancelled {
                    reason: format!("{what}: deadline exceeded"),
                })?,
            None => raced.await,
        }
    }

    /// Fetch an account at most once per scope.
    pub(crate) async fn account(
        &self,
        client: &dyn ChainClient,
        address: Address,
    ) -> Result<AccountSnapshot, Error> {
        let cell = Arc::clone(self.accounts.entry(address).or_default().value());
        cell.get_or_try_init(|| async {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            trace!(%address, "fetching account");
            let data = self
                .guarded("fetch_account", client.fetch_account(&address))
                .await?;
            Ok::<_, Error>(data.map(Arc::new))
        })
        .await
        .cloned()
    }

    pub(crate) fn lookup_cell(&self, fingerprint: Fingerprint) -> Arc<OnceCell<Vec<AccountMeta>>> {
        Arc::clone(self.lookups.entry(fingerprint).or_default().value())
    }

    pub(crate) fn put_table(&self, name: &str, contents: TableContents) {
        self.tables.insert(name.to_string(), contents);
    }

    pub fn table(&self, name: &str) -> Option<TableContents> {
        self.tables.get(name).map(|entry| entry.value().clone())
    }

    /// Every table resolved in this scope, keyed by table address.
    pub fn tables(&self) -> BTreeMap<Address, Vec<Address>> {
        self.tables
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of account fetches this scope issued.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}
