//! Field tables for the GoCD kinds

use declarative::schema::{
    Catalog, FieldDef, FieldDefault, FieldType, KindSchema, no_references, no_rule,
};
use declarative::{AttrValue, Attributes, ResourceKey};

use crate::defaults;

pub const PIPELINE_KIND: &str = "pipeline";
pub const PIPELINE_TEMPLATE_KIND: &str = "pipeline_template";

static PIPELINE_FIELDS: &[FieldDef] = &[
    FieldDef::mutable("group", FieldType::String).required(),
    FieldDef::mutable("label_template", FieldType::String)
        .with_default(FieldDefault::Str("${COUNT}")),
    FieldDef::mutable("lock_behavior", FieldType::String).with_default(FieldDefault::Str("none")),
    FieldDef::mutable("template", FieldType::String),
    // GoCD has no atomic way to flip this on every material of a live pipeline
    FieldDef::mutable("auto_update", FieldType::Bool)
        .immutable()
        .with_default(FieldDefault::Bool(true)),
    FieldDef::mutable("materials", FieldType::List)
        .required()
        .normalized_by(defaults::materials),
    FieldDef::mutable("stages", FieldType::List)
        .with_default(FieldDefault::EmptyList)
        .normalized_by(defaults::stages),
    FieldDef::mutable("parameters", FieldType::Map).with_default(FieldDefault::EmptyMap),
    FieldDef::mutable("environment_variables", FieldType::List)
        .with_default(FieldDefault::EmptyList)
        .normalized_by(defaults::environment_variables),
];

/// A GoCD pipeline, addressed by its name
pub static PIPELINE: KindSchema = KindSchema {
    kind: PIPELINE_KIND,
    fields: PIPELINE_FIELDS,
    references: pipeline_references,
    rule: template_or_stages,
};

static PIPELINE_TEMPLATE_FIELDS: &[FieldDef] = &[FieldDef::mutable("stages", FieldType::List)
    .required()
    .normalized_by(defaults::stages)];

/// A reusable list of stages pipelines can be built from
pub static PIPELINE_TEMPLATE: KindSchema = KindSchema {
    kind: PIPELINE_TEMPLATE_KIND,
    fields: PIPELINE_TEMPLATE_FIELDS,
    references: no_references,
    rule: no_rule,
};

/// Every kind the GoCD client serves
pub fn catalog() -> Catalog {
    Catalog::new(vec![&PIPELINE, &PIPELINE_TEMPLATE])
}

/// A pipeline depends on its template and on the upstream pipeline of
/// every `dependency` material.
fn pipeline_references(attributes: &Attributes) -> Vec<ResourceKey> {
    let mut keys = Vec::new();
    if let Some(template) = attributes.get("template").and_then(AttrValue::as_str) {
        keys.push(ResourceKey::new(PIPELINE_TEMPLATE_KIND, template));
    }

    let materials = attributes
        .get("materials")
        .and_then(AttrValue::as_list)
        .unwrap_or_default();
    for material in materials {
        if material.get("type").and_then(AttrValue::as_str) != Some("dependency") {
            continue;
        }
        if let Some(upstream) = material
            .get("attributes")
            .and_then(|a| a.get("pipeline"))
            .and_then(AttrValue::as_str)
        {
            keys.push(ResourceKey::new(PIPELINE_KIND, upstream));
        }
    }
    keys
}

/// A pipeline takes its stages from a template or declares its own
fn template_or_stages(attributes: &Attributes) -> Option<String> {
    let has_stages = attributes
        .get("stages")
        .and_then(AttrValue::as_list)
        .is_some_and(|stages| !stages.is_empty());
    (attributes.contains_key("template") && has_stages)
        .then(|| "'template' and 'stages' cannot both be set".to_string())
}
