//! Ledger hosts: execute invocations in isolation, then validate and commit
//! their read/write sets against world state.
use super::context::{Invocation, InvocationHeader, RwSet, WorldMap, WorldState, version_of};
use super::contract::CustodyContract;
use super::error::{CustodyError, LedgerError};
use super::transfer::CredentialVerifier;
use sled::transaction::{ConflictableTransactionResult, TransactionError};
use std::path::Path;
use std::sync::Arc;

/// Committed world state a [`LedgerService`] runs against.
pub trait LedgerBackend: WorldState {
    /// Checks every read version in `rw_set` against committed state and
    /// applies the writes. A stale read applies nothing.
    fn apply(&mut self, rw_set: &RwSet) -> Result<(), LedgerError>;

    /// All committed keys and values in key order.
    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, LedgerError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    state: WorldMap,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorldState for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CustodyError> {
        self.state.read(key)
    }
}

impl LedgerBackend for MemoryBackend {
    fn apply(&mut self, rw_set: &RwSet) -> Result<(), LedgerError> {
        for (key, expected) in &rw_set.reads {
            if version_of(self.state.get(key).map(Vec::as_slice)) != *expected {
                return Err(LedgerError::Conflict { key: key.clone() });
            }
        }
        for (key, value) in &rw_set.writes {
            self.state.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        Ok(self
            .state
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// World state in the default tree of a sled database.
#[derive(Clone)]
pub struct SledBackend {
    db: Arc<sled::Db>,
}

impl SledBackend {
    pub fn new(db: Arc<sled::Db>) -> Self {
        Self { db }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    pub fn db(&self) -> &Arc<sled::Db> {
        &self.db
    }
}

impl WorldState for SledBackend {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CustodyError> {
        self.db
            .get(key.as_bytes())
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(|err| CustodyError::State(err.to_string()))
    }
}

impl LedgerBackend for SledBackend {
    fn apply(&mut self, rw_set: &RwSet) -> Result<(), LedgerError> {
        // validation and writes share one sled transaction
        let result = self
            .db
            .transaction(|tx| -> ConflictableTransactionResult<(), String> {
                for (key, expected) in &rw_set.reads {
                    let current = tx.get(key.as_bytes())?;
                    if version_of(current.as_deref()) != *expected {
                        return sled::transaction::abort(key.clone());
                    }
                }
                for (key, value) in &rw_set.writes {
                    tx.insert(key.as_bytes(), value.as_slice())?;
                }
                Ok(())
            });

        match result {
            Ok(()) => {
                self.db.flush()?;
                Ok(())
            }
            Err(TransactionError::Abort(key)) => Err(LedgerError::Conflict { key }),
            Err(TransactionError::Storage(err)) => Err(LedgerError::Storage(err)),
        }
    }

    fn entries(&self) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        let mut entries = vec![];
        for entry in self.db.iter() {
            let (key, value) = entry?;
            entries.push((String::from_utf8_lossy(&key).into_owned(), value.to_vec()));
        }
        Ok(entries)
    }
}

/// The outcome of a simulated invocation, ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endorsement {
    pub header: InvocationHeader,
    pub payload: Vec<u8>,
    pub rw_set: RwSet,
}

pub struct LedgerService<B, V> {
    backend: B,
    contract: CustodyContract<V>,
}

impl<B: LedgerBackend, V: CredentialVerifier> LedgerService<B, V> {
    pub fn new(backend: B, verifier: V) -> Self {
        Self {
            backend,
            contract: CustodyContract::new(verifier),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn contract(&self) -> &CustodyContract<V> {
        &self.contract
    }

    /// Executes an invocation against committed state without applying it.
    pub fn simulate(
        &self,
        header: InvocationHeader,
        operation: &str,
        args: &[String],
    ) -> Result<Endorsement, LedgerError> {
        let mut ctx = Invocation::new(header.clone(), &self.backend);

        let payload = self
            .contract
            .invoke(&mut ctx, operation, args)
            .inspect_err(|err| {
                tracing::warn!(
                    operation = %operation,
                    invocation_id = %header.invocation_id,
                    caller = %header.caller,
                    error = %err,
                    "invocation rejected"
                );
            })?;

        Ok(Endorsement {
            header,
            payload,
            rw_set: ctx.into_rw_set(),
        })
    }

    /// Validates and applies a simulated invocation. Queries have nothing to
    /// apply and always succeed.
    pub fn commit(&mut self, endorsement: &Endorsement) -> Result<(), LedgerError> {
        if endorsement.rw_set.is_read_only() {
            return Ok(());
        }

        self.backend.apply(&endorsement.rw_set).inspect_err(|err| {
            tracing::warn!(
                invocation_id = %endorsement.header.invocation_id,
                error = %err,
                "commit failed"
            );
        })?;

        tracing::info!(
            invocation_id = %endorsement.header.invocation_id,
            writes = endorsement.rw_set.writes.len(),
            "committed invocation"
        );
        Ok(())
    }

    /// Simulates and commits in one step, returning the payload.
    pub fn submit(
        &mut self,
        header: InvocationHeader,
        operation: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerError> {
        let endorsement = self.simulate(header, operation, args)?;
        self.commit(&endorsement)?;
        Ok(endorsement.payload)
    }
}
