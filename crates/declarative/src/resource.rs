//! Declared desired configuration for one resource instance
//!
//! A [`ResourceSpec`] can only be built through [`ResourceSpec::new`], which
//! checks it against its kind's field table, so every spec that reaches the
//! differ is known to be well formed.

use crate::error::{Error, Result};
use crate::schema::{Catalog, KindSchema};
use crate::types::{Attributes, ResourceKey};
use std::collections::BTreeSet;

/// Desired configuration for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    key: ResourceKey,
    attributes: Attributes,
    dependencies: BTreeSet<ResourceKey>,
}

impl ResourceSpec {
    /// Build a spec, validating it against `schema`.
    ///
    /// Dependencies are the explicitly declared keys plus whatever the kind's
    /// reference extractor finds in the attributes.
    pub fn new(
        schema: &KindSchema,
        name: impl Into<String>,
        attributes: Attributes,
        depends_on: impl IntoIterator<Item = ResourceKey>,
    ) -> Result<Self> {
        let name = name.into();
        schema.validate(&name, &attributes)?;

        let key = ResourceKey::new(schema.kind, &name);
        let mut dependencies: BTreeSet<ResourceKey> = depends_on.into_iter().collect();
        dependencies.extend((schema.references)(&attributes));

        if dependencies.contains(&key) {
            return Err(Error::validation(
                schema.kind,
                &name,
                "resource cannot depend on itself",
            ));
        }

        Ok(Self {
            key,
            attributes,
            dependencies,
        })
    }

    /// Build a spec, looking its kind up in a catalog
    pub fn from_catalog(
        catalog: &Catalog,
        kind: &str,
        name: impl Into<String>,
        attributes: Attributes,
        depends_on: impl IntoIterator<Item = ResourceKey>,
    ) -> Result<Self> {
        let name = name.into();
        let schema = catalog.require(kind, &name)?;
        Self::new(schema, name, attributes, depends_on)
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn kind(&self) -> &str {
        &self.key.kind
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn dependencies(&self) -> &BTreeSet<ResourceKey> {
        &self.dependencies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::{WIDGET, catalog};
    use crate::types::AttrValue;

    fn attrs(parent: Option<&str>) -> Attributes {
        let mut a = Attributes::new();
        a.insert("color".into(), "red".into());
        if let Some(p) = parent {
            a.insert("parent".into(), p.into());
        }
        a
    }

    #[test]
    fn test_new_derives_dependencies() {
        let spec = ResourceSpec::new(
            &WIDGET,
            "child",
            attrs(Some("base")),
            [ResourceKey::new("widget", "extra")],
        )
        .unwrap();

        let deps: Vec<_> = spec.dependencies().iter().map(ToString::to_string).collect();
        assert_eq!(deps, vec!["widget.base", "widget.extra"]);
        assert_eq!(spec.key().to_string(), "widget.child");
    }

    #[test]
    fn test_new_rejects_self_dependency() {
        let err = ResourceSpec::new(&WIDGET, "loop", attrs(Some("loop")), []).unwrap_err();
        assert!(err.to_string().contains("cannot depend on itself"));
    }

    #[test]
    fn test_new_validates() {
        let mut a = attrs(None);
        a.insert("color".into(), AttrValue::Bool(true));
        assert!(ResourceSpec::new(&WIDGET, "w", a, []).is_err());
    }

    #[test]
    fn test_from_catalog() {
        let spec = ResourceSpec::from_catalog(&catalog(), "widget", "w", attrs(None), []).unwrap();
        assert_eq!(spec.kind(), "widget");
        assert_eq!(spec.name(), "w");
        assert!(ResourceSpec::from_catalog(&catalog(), "nope", "w", attrs(None), []).is_err());
    }
}
