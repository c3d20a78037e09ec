//! Remote Client Facade
//!
//! The narrow interface the reconciler uses to talk to the remote system.
//! Implementations own the transport; the core only sees typed records and
//! typed errors. All calls block the caller until the network answers.

use crate::error::{Error, Result};
use crate::resource::ResourceSpec;
use crate::types::RemoteRecord;

/// Create/read/update/delete/list against a remote system.
///
/// Implementations must be safe to share across threads: the host may run
/// independent reconciliation passes concurrently against one client.
///
/// `VersionMismatch` from `update` or `delete` means the caller's record is
/// stale. Callers re-fetch and re-plan instead of resending the same
/// version.
pub trait RemoteClient: Send + Sync {
    /// Fetch one resource. Absence is `Error::NotFound`.
    fn fetch(&self, kind: &str, id: &str) -> Result<RemoteRecord>;

    /// Create a resource from a spec.
    ///
    /// Fails with `Conflict` if it already exists or `Validation` if the
    /// remote rejects the spec.
    fn create(&self, spec: &ResourceSpec) -> Result<RemoteRecord>;

    /// Replace a resource's attributes, guarded by its version token.
    fn update(&self, id: &str, spec: &ResourceSpec, version: &str) -> Result<RemoteRecord>;

    /// Delete a resource, guarded by its version token.
    fn delete(&self, kind: &str, id: &str, version: &str) -> Result<()>;

    /// List every resource of a kind
    fn list(&self, kind: &str) -> Result<Vec<RemoteRecord>>;

    /// Fetch, mapping `NotFound` to `None`
    fn fetch_optional(&self, kind: &str, id: &str) -> Result<Option<RemoteRecord>> {
        match self.fetch(kind, id) {
            Ok(record) => Ok(Some(record)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
