//! Statically declared per-kind field tables
//!
//! Each resource kind a remote system serves is described by a
//! [`KindSchema`]: the fields it accepts, their types, whether they are
//! required, whether they may change after creation, and their defaults.
//! Specs are checked against the table when they are built.

use crate::error::{Error, Result};
use crate::types::{AttrValue, Attributes, ResourceKey};

/// Type of a declared field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    String,
    List,
    Map,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::String => "string",
            Self::List => "list",
            Self::Map => "map",
        }
    }

    /// Whether a value is acceptable for this field type (null always is)
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (_, AttrValue::Null)
                | (Self::Bool, AttrValue::Bool(_))
                | (Self::Int, AttrValue::Int(_))
                | (Self::String, AttrValue::String(_))
                | (Self::List, AttrValue::List(_))
                | (Self::Map, AttrValue::Map(_))
        )
    }
}

/// Whether a field may change after the resource is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// Default value of an omitted field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldDefault {
    None,
    Bool(bool),
    Int(i64),
    Str(&'static str),
    EmptyList,
    EmptyMap,
}

impl FieldDefault {
    pub fn to_value(self) -> AttrValue {
        match self {
            Self::None => AttrValue::Null,
            Self::Bool(b) => AttrValue::Bool(b),
            Self::Int(i) => AttrValue::Int(i),
            Self::Str(s) => AttrValue::String(s.to_string()),
            Self::EmptyList => AttrValue::List(Vec::new()),
            Self::EmptyMap => AttrValue::Map(Attributes::new()),
        }
    }
}

/// Rewrites a value into the form used for comparison, e.g. dropping
/// nested keys the remote fills in on its own
pub type Normalizer = fn(AttrValue) -> AttrValue;

/// One declared field of a kind
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub mutability: Mutability,
    pub default: FieldDefault,
    pub normalize: Option<Normalizer>,
}

impl FieldDef {
    pub const fn mutable(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            mutability: Mutability::Mutable,
            default: FieldDefault::None,
            normalize: None,
        }
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub const fn immutable(self) -> Self {
        Self {
            mutability: Mutability::Immutable,
            ..self
        }
    }

    pub const fn with_default(self, default: FieldDefault) -> Self {
        Self { default, ..self }
    }

    pub const fn normalized_by(self, normalize: Normalizer) -> Self {
        Self {
            normalize: Some(normalize),
            ..self
        }
    }

    pub fn is_immutable(&self) -> bool {
        self.mutability == Mutability::Immutable
    }

    /// Effective value of this field in an attribute map.
    ///
    /// Missing and null both resolve to the declared default.
    pub fn effective(&self, attributes: &Attributes) -> AttrValue {
        match attributes.get(self.name) {
            Some(value) if !value.is_null() => value.clone(),
            _ => self.default.to_value(),
        }
    }

    /// Effective value as the differ compares it
    pub fn comparable(&self, attributes: &Attributes) -> AttrValue {
        let value = self.effective(attributes);
        match self.normalize {
            Some(normalize) => normalize(value),
            None => value,
        }
    }
}

/// Extracts the resources a spec references through its attributes
pub type ReferenceExtractor = fn(&Attributes) -> Vec<ResourceKey>;

/// Cross-field rule over a whole attribute map; returns the violation
pub type AttributeRule = fn(&Attributes) -> Option<String>;

/// Static description of one resource kind
#[derive(Debug)]
pub struct KindSchema {
    pub kind: &'static str,
    pub fields: &'static [FieldDef],
    pub references: ReferenceExtractor,
    pub rule: AttributeRule,
}

impl KindSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check an attribute map against this table.
    pub fn validate(&self, name: &str, attributes: &Attributes) -> Result<()> {
        validate_name(self.kind, name)?;

        for (field_name, value) in attributes {
            let field = self.field(field_name).ok_or_else(|| {
                Error::validation(self.kind, name, format!("unknown attribute '{field_name}'"))
            })?;
            if !field.ty.accepts(value) {
                return Err(Error::validation(
                    self.kind,
                    name,
                    format!(
                        "attribute '{}' must be a {}, got {}",
                        field.name,
                        field.ty.name(),
                        value.type_name()
                    ),
                ));
            }
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if attributes.get(field.name).is_none_or(AttrValue::is_null) {
                return Err(Error::validation(
                    self.kind,
                    name,
                    format!("missing required attribute '{}'", field.name),
                ));
            }
        }

        match (self.rule)(attributes) {
            Some(violation) => Err(Error::validation(self.kind, name, violation)),
            None => Ok(()),
        }
    }

    /// Keep only declared fields from a remote attribute map
    pub fn project(&self, attributes: &Attributes) -> Attributes {
        self.fields
            .iter()
            .filter_map(|f| {
                attributes
                    .get(f.name)
                    .filter(|v| !v.is_null())
                    .map(|v| (f.name.to_string(), v.clone()))
            })
            .collect()
    }
}

/// No references
pub fn no_references(_attributes: &Attributes) -> Vec<ResourceKey> {
    Vec::new()
}

pub fn no_rule(_attributes: &Attributes) -> Option<String> {
    None
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation(kind, name, "name must not be empty"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(Error::validation(
            kind,
            name,
            format!("name contains invalid character '{bad}'"),
        ));
    }
    Ok(())
}

/// The set of kinds a remote system serves
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    kinds: Vec<&'static KindSchema>,
}

impl Catalog {
    pub fn new(kinds: Vec<&'static KindSchema>) -> Self {
        Self { kinds }
    }

    pub fn get(&self, kind: &str) -> Option<&'static KindSchema> {
        self.kinds.iter().copied().find(|k| k.kind == kind)
    }

    /// Look up a kind, failing with a validation error naming the resource
    pub fn require(&self, kind: &str, name: &str) -> Result<&'static KindSchema> {
        self.get(kind).ok_or_else(|| {
            let known: Vec<_> = self.kinds.iter().map(|k| k.kind).collect();
            Error::validation(
                kind,
                name,
                format!("unknown kind (known: {})", known.join(", ")),
            )
        })
    }

    pub fn kinds(&self) -> impl Iterator<Item = &'static KindSchema> + '_ {
        self.kinds.iter().copied()
    }
}
