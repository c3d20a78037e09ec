//! Import Resolver
//!
//! Adopts a resource that already exists remotely by reading it and mapping
//! its attributes back into a spec.

use crate::client::RemoteClient;
use crate::error::Result;
use crate::resource::ResourceSpec;
use crate::schema::{Catalog, KindSchema};
use crate::types::RemoteRecord;

/// A remote resource mapped back into desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedResource {
    pub spec: ResourceSpec,
    pub record: RemoteRecord,
}

/// Fetch `kind`/`id` and build the spec that describes it.
///
/// Only fields the kind declares are kept, and dependencies come from the
/// kind's reference extractor alone. A missing resource surfaces as
/// `Error::NotFound`.
pub fn resolve(
    client: &dyn RemoteClient,
    catalog: &Catalog,
    kind: &str,
    id: &str,
) -> Result<ImportedResource> {
    let schema = catalog.require(kind, id)?;
    let record = client.fetch(kind, id)?;
    adopt(schema, record)
}

/// Import every resource of `kind` the remote lists, in listing order
pub fn resolve_all(
    client: &dyn RemoteClient,
    catalog: &Catalog,
    kind: &str,
) -> Result<Vec<ImportedResource>> {
    let schema = catalog.require(kind, "*")?;
    client
        .list(kind)?
        .into_iter()
        .map(|record| adopt(schema, record))
        .collect()
}

fn adopt(schema: &KindSchema, record: RemoteRecord) -> Result<ImportedResource> {
    let attributes = schema.project(&record.attributes);
    let spec = ResourceSpec::new(schema, record.id.clone(), attributes, [])?;
    log::debug!("imported {} at version {}", spec.key(), record.version);
    Ok(ImportedResource { spec, record })
}
