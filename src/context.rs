//! The per-invocation state context every component reads and writes through
use super::error::CustodyError;
use super::types::LogicalTimestamp;
use super::utils;
use chrono::Utc;
use std::collections::BTreeMap;

/// What the hosting platform hands to an invocation. Components must not
/// touch state any other way, so the captured read/write set stays complete.
pub trait StateContext {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, CustodyError>;
    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), CustodyError>;
    fn caller_identity(&self) -> &str;
    fn invocation_id(&self) -> &str;
    fn logical_timestamp(&self) -> LogicalTimestamp;
}

/// Plain in-memory world state, used by the memory host and in tests.
pub type WorldMap = BTreeMap<String, Vec<u8>>;

/// Committed key/value state as seen by a host.
pub trait WorldState {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CustodyError>;
}

impl WorldState for WorldMap {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, CustodyError> {
        Ok(self.get(key).cloned())
    }
}

/// Identity, id and logical time assigned by the host before execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationHeader {
    pub caller: String,
    pub invocation_id: String,
    pub timestamp: LogicalTimestamp,
}

impl InvocationHeader {
    pub fn new(
        caller: impl Into<String>,
        invocation_id: impl Into<String>,
        timestamp: LogicalTimestamp,
    ) -> Self {
        Self {
            caller: caller.into(),
            invocation_id: invocation_id.into(),
            timestamp,
        }
    }
    /// Issues a fresh header the way an ordering service would: a uuid7 based
    /// invocation id and the submission time as logical timestamp.
    pub fn issue(caller: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            caller: caller.into(),
            invocation_id: utils::new_uuid_to_bech32("inv_")?,
            timestamp: LogicalTimestamp::from(Utc::now()),
        })
    }
}

/// Keys observed and written by one invocation. Reads map to the digest of
/// the committed value at read time, `None` when the key was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RwSet {
    pub reads: BTreeMap<String, Option<String>>,
    pub writes: BTreeMap<String, Vec<u8>>,
}

impl RwSet {
    pub fn is_read_only(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Digest used as the version of a committed value.
pub fn version_of(value: Option<&[u8]>) -> Option<String> {
    value.map(sha256::digest)
}

/// An isolated execution context over a world state snapshot. Writes are
/// buffered and only reach the world when the host commits the [`RwSet`].
pub struct Invocation<'w, W: WorldState + ?Sized> {
    header: InvocationHeader,
    world: &'w W,
    rw_set: RwSet,
}

impl<'w, W: WorldState + ?Sized> Invocation<'w, W> {
    pub fn new(header: InvocationHeader, world: &'w W) -> Self {
        Self {
            header,
            world,
            rw_set: RwSet::default(),
        }
    }
    pub fn into_rw_set(self) -> RwSet {
        self.rw_set
    }
}

impl<W: WorldState + ?Sized> StateContext for Invocation<'_, W> {
    fn get_state(&mut self, key: &str) -> Result<Option<Vec<u8>>, CustodyError> {
        if let Some(pending) = self.rw_set.writes.get(key) {
            return Ok(Some(pending.clone()));
        }
        let value = self.world.read(key)?;
        self.rw_set
            .reads
            .entry(key.to_string())
            .or_insert_with(|| version_of(value.as_deref()));

        Ok(value)
    }

    fn put_state(&mut self, key: &str, value: Vec<u8>) -> Result<(), CustodyError> {
        self.rw_set.writes.insert(key.to_string(), value);
        Ok(())
    }

    fn caller_identity(&self) -> &str {
        &self.header.caller
    }

    fn invocation_id(&self) -> &str {
        &self.header.invocation_id
    }

    fn logical_timestamp(&self) -> LogicalTimestamp {
        self.header.timestamp
    }
}

/// Loads and decodes a record, `None` if the key is absent.
pub fn get_record<T, C>(ctx: &mut C, key: &str) -> Result<Option<T>, CustodyError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
    C: StateContext + ?Sized,
{
    match ctx.get_state(key)? {
        Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
        None => Ok(None),
    }
}

/// Encodes and writes a record under its key.
pub fn put_record<T, C>(ctx: &mut C, key: &str, record: &T) -> Result<(), CustodyError>
where
    T: minicbor::Encode<()>,
    C: StateContext + ?Sized,
{
    let bytes = minicbor::to_vec(record)?;
    ctx.put_state(key, bytes)
}
