//! In-memory remote for deterministic tests
//!
//! [`MemoryClient`] behaves like a remote system: it assigns version tokens,
//! rejects stale writes, and reports absence as `NotFound`. Tests can queue
//! faults, count calls, and change records out of band.
//!
//! ```
//! use declarative::memory::{Call, MemoryClient};
//! use declarative::RemoteClient;
//!
//! let client = MemoryClient::new();
//! assert!(client.fetch("pipeline", "p1").unwrap_err().is_not_found());
//! assert_eq!(client.call_count(Call::Fetch), 1);
//! ```

use crate::client::RemoteClient;
use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use crate::types::{AttrValue, RemoteRecord, ResourceKey};
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A facade operation, for call accounting and fault targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Fetch,
    Create,
    Update,
    Delete,
    List,
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

/// A queued misbehavior for the next matching call
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail without touching the store
    Fail(Error),
    /// Apply the mutation, then report a timeout
    TimeoutAfterApply,
}

#[derive(Debug, Default)]
struct Store {
    records: IndexMap<ResourceKey, RemoteRecord>,
    next_version: u64,
    faults: VecDeque<(Call, Fault)>,
    calls: Vec<(Call, String)>,
}

impl Store {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }

    fn take_fault(&mut self, call: Call) -> Option<Fault> {
        let pos = self.faults.iter().position(|(c, _)| *c == call)?;
        self.faults.remove(pos).map(|(_, f)| f)
    }
}

/// Thread-safe in-memory remote
#[derive(Debug, Default)]
pub struct MemoryClient {
    store: Mutex<Store>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed a record as if it already existed remotely; returns it with a
    /// fresh version token.
    pub fn seed(&self, mut record: RemoteRecord) -> RemoteRecord {
        let mut store = self.lock();
        record.version = store.bump();
        store.records.insert(record.key(), record.clone());
        record
    }

    /// Current record, without counting a call
    pub fn get(&self, kind: &str, id: &str) -> Option<RemoteRecord> {
        self.lock()
            .records
            .get(&ResourceKey::new(kind, id))
            .cloned()
    }

    /// Delete out of band, as another writer would
    pub fn remove(&self, kind: &str, id: &str) -> Option<RemoteRecord> {
        self.lock()
            .records
            .shift_remove(&ResourceKey::new(kind, id))
    }

    /// Change one attribute out of band, bumping the version
    pub fn tamper(&self, kind: &str, id: &str, field: &str, value: AttrValue) -> bool {
        let mut store = self.lock();
        let version = store.bump();
        match store.records.get_mut(&ResourceKey::new(kind, id)) {
            Some(record) => {
                record.attributes.insert(field.to_string(), value);
                record.version = version;
                true
            }
            None => false,
        }
    }

    /// Queue a fault for the next call of the given operation
    pub fn inject(&self, call: Call, fault: Fault) {
        self.lock().faults.push_back((call, fault));
    }

    /// Every call made so far, with the id it targeted
    pub fn calls(&self) -> Vec<(Call, String)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, call: Call) -> usize {
        self.lock().calls.iter().filter(|(c, _)| *c == call).count()
    }

    pub fn total_calls(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(c, _)| c.is_mutation())
            .count()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}

impl RemoteClient for MemoryClient {
    fn fetch(&self, kind: &str, id: &str) -> Result<RemoteRecord> {
        let mut store = self.lock();
        store.calls.push((Call::Fetch, id.to_string()));
        if let Some(Fault::Fail(e)) = store.take_fault(Call::Fetch) {
            return Err(e);
        }
        store
            .records
            .get(&ResourceKey::new(kind, id))
            .cloned()
            .ok_or_else(|| Error::not_found(kind, id))
    }

    fn create(&self, spec: &ResourceSpec) -> Result<RemoteRecord> {
        let mut store = self.lock();
        store.calls.push((Call::Create, spec.name().to_string()));
        let fault = store.take_fault(Call::Create);
        if let Some(Fault::Fail(e)) = fault {
            return Err(e);
        }
        if store.records.contains_key(spec.key()) {
            return Err(Error::Conflict {
                kind: spec.kind().to_string(),
                id: spec.name().to_string(),
                message: "resource already exists".to_string(),
            });
        }

        let record = RemoteRecord {
            kind: spec.kind().to_string(),
            id: spec.name().to_string(),
            attributes: spec.attributes().clone(),
            version: store.bump(),
        };
        store.records.insert(spec.key().clone(), record.clone());

        match fault {
            Some(Fault::TimeoutAfterApply) => Err(Error::timeout(spec.kind(), spec.name(), "create")),
            _ => Ok(record),
        }
    }

    fn update(&self, id: &str, spec: &ResourceSpec, version: &str) -> Result<RemoteRecord> {
        let mut store = self.lock();
        store.calls.push((Call::Update, id.to_string()));
        let fault = store.take_fault(Call::Update);
        if let Some(Fault::Fail(e)) = fault {
            return Err(e);
        }

        let key = ResourceKey::new(spec.kind(), id);
        let current = store
            .records
            .get(&key)
            .ok_or_else(|| Error::not_found(spec.kind(), id))?;
        if current.version != version {
            return Err(Error::VersionMismatch {
                kind: spec.kind().to_string(),
                id: id.to_string(),
                version: version.to_string(),
            });
        }

        let record = RemoteRecord {
            kind: spec.kind().to_string(),
            id: id.to_string(),
            attributes: spec.attributes().clone(),
            version: store.bump(),
        };
        store.records.insert(key, record.clone());

        match fault {
            Some(Fault::TimeoutAfterApply) => Err(Error::timeout(spec.kind(), id, "update")),
            _ => Ok(record),
        }
    }

    fn delete(&self, kind: &str, id: &str, version: &str) -> Result<()> {
        let mut store = self.lock();
        store.calls.push((Call::Delete, id.to_string()));
        let fault = store.take_fault(Call::Delete);
        if let Some(Fault::Fail(e)) = fault {
            return Err(e);
        }

        let key = ResourceKey::new(kind, id);
        let current = store
            .records
            .get(&key)
            .ok_or_else(|| Error::not_found(kind, id))?;
        if current.version != version {
            return Err(Error::VersionMismatch {
                kind: kind.to_string(),
                id: id.to_string(),
                version: version.to_string(),
            });
        }
        store.records.shift_remove(&key);

        match fault {
            Some(Fault::TimeoutAfterApply) => Err(Error::timeout(kind, id, "delete")),
            _ => Ok(()),
        }
    }

    fn list(&self, kind: &str) -> Result<Vec<RemoteRecord>> {
        let mut store = self.lock();
        store.calls.push((Call::List, kind.to_string()));
        if let Some(Fault::Fail(e)) = store.take_fault(Call::List) {
            return Err(e);
        }
        Ok(store
            .records
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }
}
