//! Mapping between resource attributes and GoCD JSON bodies
//!
//! The server's shapes differ from the declared ones in a few places:
//! `auto_update` lives on every SCM material instead of the pipeline,
//! parameters are a list of name/value pairs, and creates wrap the
//! pipeline together with its group.

use crate::error::protocol_error;
use crate::kinds::{PIPELINE, PIPELINE_KIND, PIPELINE_TEMPLATE_KIND};
use declarative::{AttrValue, Attributes, Error, RemoteRecord, ResourceSpec, Result};
use serde_json::{Map, Value, json};

/// Material types that poll a repository and carry `auto_update`
const SCM_TYPES: &[&str] = &["git", "svn", "hg", "p4", "tfs"];

/// Body for PUT (and the `pipeline` part of POST)
pub fn to_wire(spec: &ResourceSpec) -> Result<Value> {
    match spec.kind() {
        PIPELINE_KIND => pipeline_to_wire(spec),
        PIPELINE_TEMPLATE_KIND => Ok(json!({
            "name": spec.name(),
            "stages": attr_json(spec, "stages")?,
        })),
        other => Err(Error::validation(other, spec.name(), "kind is not served by GoCD")),
    }
}

/// Body for POST
pub fn create_body(spec: &ResourceSpec) -> Result<Value> {
    let body = to_wire(spec)?;
    if spec.kind() == PIPELINE_KIND {
        let group = body.get("group").cloned().unwrap_or(Value::Null);
        return Ok(json!({ "group": group, "pipeline": body }));
    }
    Ok(body)
}

/// Decode a GoCD response body into a record
pub fn from_wire(kind: &str, id: &str, body: Value, etag: Option<&str>) -> Result<RemoteRecord> {
    let Some(etag) = etag.filter(|e| !e.is_empty()) else {
        return Err(protocol_error(kind, id, "response has no ETag header"));
    };
    let Value::Object(mut object) = strip(body) else {
        return Err(protocol_error(kind, id, "expected a JSON object"));
    };

    let mut attributes = Attributes::new();
    match kind {
        PIPELINE_KIND => pipeline_from_wire(kind, id, &mut object, &mut attributes)?,
        PIPELINE_TEMPLATE_KIND => copy_fields(kind, id, &mut object, &["stages"], &mut attributes)?,
        other => return Err(Error::validation(other, id, "kind is not served by GoCD")),
    }

    Ok(RemoteRecord {
        kind: kind.to_string(),
        id: id.to_string(),
        attributes,
        version: etag.trim_matches('"').to_string(),
    })
}

fn pipeline_to_wire(spec: &ResourceSpec) -> Result<Value> {
    let auto_update = effective(spec, "auto_update").as_bool().unwrap_or(true);

    let mut materials = attr_json(spec, "materials")?;
    if let Value::Array(items) = &mut materials {
        for material in items.iter_mut().filter(|m| is_scm(m)) {
            if let Some(Value::Object(attrs)) = material.get_mut("attributes") {
                attrs.insert("auto_update".into(), Value::Bool(auto_update));
            } else if let Value::Object(m) = material {
                m.insert("attributes".into(), json!({ "auto_update": auto_update }));
            }
        }
    }

    let parameters: Vec<Value> = effective(spec, "parameters")
        .as_map()
        .map(|params| {
            params
                .iter()
                .map(|(name, value)| json!({ "name": name, "value": value.render() }))
                .collect()
        })
        .unwrap_or_default();

    let mut body = Map::new();
    body.insert("name".into(), Value::String(spec.name().to_string()));
    body.insert("group".into(), attr_json(spec, "group")?);
    body.insert("label_template".into(), json_of(spec, &effective(spec, "label_template"))?);
    body.insert("lock_behavior".into(), json_of(spec, &effective(spec, "lock_behavior"))?);
    body.insert("materials".into(), materials);
    match spec.attributes().get("template").and_then(AttrValue::as_str) {
        Some(template) => {
            body.insert("template".into(), Value::String(template.to_string()));
        }
        None => {
            body.insert("stages".into(), json_of(spec, &effective(spec, "stages"))?);
        }
    }
    body.insert("parameters".into(), Value::Array(parameters));
    body.insert(
        "environment_variables".into(),
        json_of(spec, &effective(spec, "environment_variables"))?,
    );
    Ok(Value::Object(body))
}

fn pipeline_from_wire(
    kind: &str,
    id: &str,
    object: &mut Map<String, Value>,
    attributes: &mut Attributes,
) -> Result<()> {
    // fold the per-material flag back onto the pipeline
    let mut auto_update = None;
    if let Some(Value::Array(materials)) = object.get_mut("materials") {
        for material in materials.iter_mut().filter(|m| is_scm(m)) {
            if let Some(Value::Object(attrs)) = material.get_mut("attributes")
                && let Some(Value::Bool(flag)) = attrs.remove("auto_update")
            {
                auto_update.get_or_insert(flag);
            }
        }
    }
    if let Some(flag) = auto_update {
        attributes.insert("auto_update".into(), AttrValue::Bool(flag));
    }

    if let Some(Value::Array(params)) = object.remove("parameters") {
        let map = params
            .into_iter()
            .filter_map(|p| {
                let name = p.get("name")?.as_str()?.to_string();
                let value = p.get("value").and_then(Value::as_str).unwrap_or_default();
                Some((name, AttrValue::from(value)))
            })
            .collect::<Attributes>();
        attributes.insert("parameters".into(), AttrValue::Map(map));
    }

    copy_fields(
        kind,
        id,
        object,
        &[
            "group",
            "label_template",
            "lock_behavior",
            "template",
            "materials",
            "stages",
            "environment_variables",
        ],
        attributes,
    )?;

    // a templated pipeline reports no stages of its own
    if attributes.contains_key("template") {
        attributes.shift_remove("stages");
    }
    Ok(())
}

fn copy_fields(
    kind: &str,
    id: &str,
    object: &mut Map<String, Value>,
    fields: &[&str],
    attributes: &mut Attributes,
) -> Result<()> {
    for field in fields {
        if let Some(value) = object.remove(*field) {
            let value: AttrValue = serde_json::from_value(value)
                .map_err(|e| protocol_error(kind, id, format!("field '{field}': {e}")))?;
            attributes.insert((*field).to_string(), value);
        }
    }
    Ok(())
}

fn is_scm(material: &Value) -> bool {
    material
        .get("type")
        .and_then(Value::as_str)
        .is_some_and(|t| SCM_TYPES.contains(&t))
}

/// Drop nulls and hypermedia links at every depth.
fn strip(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, v)| k != "_links" && !v.is_null())
                .map(|(k, v)| (k, strip(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip).collect()),
        other => other,
    }
}

fn effective(spec: &ResourceSpec, field: &str) -> AttrValue {
    PIPELINE
        .field(field)
        .map(|f| f.effective(spec.attributes()))
        .or_else(|| spec.attributes().get(field).cloned())
        .unwrap_or(AttrValue::Null)
}

fn attr_json(spec: &ResourceSpec, field: &str) -> Result<Value> {
    json_of(spec, spec.attributes().get(field).unwrap_or(&AttrValue::Null))
}

fn json_of(spec: &ResourceSpec, value: &AttrValue) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| protocol_error(spec.kind(), spec.name(), e))
}
