//! GoCD admin API client.
//!
//! This module provides [`GocdClient`], the [`RemoteClient`] implementation
//! backed by GoCD's versioned admin REST API.
//!
//! # Concurrency tokens
//!
//! GoCD returns an `ETag` with every pipeline and template. It is the
//! record's version token and is sent back as `If-Match` on updates; a
//! stale one is answered with `412 Precondition Failed`.

use crate::config::GocdConfig;
use crate::error::{ConfigError, protocol_error, status_error, transport_error};
use crate::kinds::{PIPELINE_KIND, PIPELINE_TEMPLATE_KIND};
use crate::wire;
use declarative::{Error, RemoteClient, RemoteRecord, ResourceSpec, Result};
use serde::Deserialize;
use ureq::http::Response;
use ureq::tls::TlsConfig;
use ureq::{Agent, Body, RequestBuilder};

const PIPELINE_ACCEPT: &str = "application/vnd.go.cd.v11+json";
const TEMPLATE_ACCEPT: &str = "application/vnd.go.cd.v7+json";
const GROUPS_ACCEPT: &str = "application/vnd.go.cd.v1+json";

/// Where one kind lives on the server
struct Endpoint {
    path: &'static str,
    accept: &'static str,
}

fn endpoint(kind: &str, id: &str) -> Result<Endpoint> {
    match kind {
        PIPELINE_KIND => Ok(Endpoint {
            path: "api/admin/pipelines",
            accept: PIPELINE_ACCEPT,
        }),
        PIPELINE_TEMPLATE_KIND => Ok(Endpoint {
            path: "api/admin/templates",
            accept: TEMPLATE_ACCEPT,
        }),
        other => Err(Error::validation(other, id, "kind is not served by GoCD")),
    }
}

/// GoCD client over blocking HTTP.
///
/// # Example
///
/// ```no_run
/// use declarative::RemoteClient;
/// use gocdkit::{GocdClient, GocdConfig};
///
/// let config = GocdConfig::new("http://127.0.0.1:8153/go/").with_credentials("admin", "secret");
/// let client = GocdClient::new(config).unwrap();
/// let record = client.fetch("pipeline", "pipeline0-terraform").unwrap();
/// println!("{} at {}", record.id, record.version);
/// ```
pub struct GocdClient {
    agent: Agent,
    base_url: String,
    authorization: Option<String>,
}

impl GocdClient {
    pub fn new(config: GocdConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let mut builder = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .user_agent("pipewright");
        if config.skip_ssl_check {
            log::warn!("TLS certificate verification is disabled for {}", config.server);
            builder = builder.tls_config(TlsConfig::builder().disable_verification(true).build());
        }
        let agent: Agent = builder.build().into();

        log::debug!("GoCD client for {}", config.base_url());
        Ok(Self {
            agent,
            base_url: config.base_url(),
            authorization: config.authorization(),
        })
    }

    fn url(&self, endpoint: &Endpoint, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("{}/{}/{}", self.base_url, endpoint.path, id),
            None => format!("{}/{}", self.base_url, endpoint.path),
        }
    }

    fn authorize<B>(&self, request: RequestBuilder<B>, accept: &str) -> RequestBuilder<B> {
        let request = request.header("Accept", accept);
        match &self.authorization {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    /// Turn a transport result into a successful response or a typed error
    fn check(
        kind: &str,
        id: &str,
        operation: &str,
        result: std::result::Result<Response<Body>, ureq::Error>,
    ) -> Result<Response<Body>> {
        let mut response = result.map_err(|e| transport_error(kind, id, operation, &e))?;
        let status = response.status().as_u16();
        log::debug!("{operation} {kind} '{id}': HTTP {status}");
        if (200..300).contains(&status) {
            return Ok(response);
        }
        let body = response.body_mut().read_to_string().unwrap_or_default();
        Err(status_error(kind, id, status, &body))
    }

    fn decode(kind: &str, id: &str, mut response: Response<Body>) -> Result<RemoteRecord> {
        let etag = response
            .headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: serde_json::Value = response
            .body_mut()
            .read_json()
            .map_err(|e| protocol_error(kind, id, e))?;
        wire::from_wire(kind, id, body, etag.as_deref())
    }

    /// Names of every resource of a kind
    fn list_names(&self, kind: &str) -> Result<Vec<String>> {
        match kind {
            PIPELINE_KIND => {
                let url = format!("{}/api/admin/pipeline_groups", self.base_url);
                let request = self.authorize(self.agent.get(&url), GROUPS_ACCEPT);
                let mut response = Self::check(kind, "*", "list", request.call())?;
                let groups: GroupsResponse = response
                    .body_mut()
                    .read_json()
                    .map_err(|e| protocol_error(kind, "*", e))?;
                Ok(groups
                    .embedded
                    .groups
                    .into_iter()
                    .flat_map(|g| g.pipelines)
                    .map(|p| p.name)
                    .collect())
            }
            PIPELINE_TEMPLATE_KIND => {
                let ep = endpoint(kind, "*")?;
                let request = self.authorize(self.agent.get(&self.url(&ep, None)), ep.accept);
                let mut response = Self::check(kind, "*", "list", request.call())?;
                let templates: TemplatesResponse = response
                    .body_mut()
                    .read_json()
                    .map_err(|e| protocol_error(kind, "*", e))?;
                Ok(templates
                    .embedded
                    .templates
                    .into_iter()
                    .map(|t| t.name)
                    .collect())
            }
            other => Err(Error::validation(other, "*", "kind is not served by GoCD")),
        }
    }
}

impl RemoteClient for GocdClient {
    fn fetch(&self, kind: &str, id: &str) -> Result<RemoteRecord> {
        let ep = endpoint(kind, id)?;
        let request = self.authorize(self.agent.get(&self.url(&ep, Some(id))), ep.accept);
        let response = Self::check(kind, id, "fetch", request.call())?;
        Self::decode(kind, id, response)
    }

    fn create(&self, spec: &ResourceSpec) -> Result<RemoteRecord> {
        let (kind, id) = (spec.kind(), spec.name());
        let ep = endpoint(kind, id)?;
        let body = wire::create_body(spec)?;
        let request = self.authorize(self.agent.post(&self.url(&ep, None)), ep.accept);
        let response = Self::check(
            kind,
            id,
            "create",
            request.header("Content-Type", "application/json").send_json(&body),
        )?;
        Self::decode(kind, id, response)
    }

    fn update(&self, id: &str, spec: &ResourceSpec, version: &str) -> Result<RemoteRecord> {
        let kind = spec.kind();
        let ep = endpoint(kind, id)?;
        let body = wire::to_wire(spec)?;
        let request = self.authorize(self.agent.put(&self.url(&ep, Some(id))), ep.accept);
        let result = request
            .header("Content-Type", "application/json")
            .header("If-Match", format!("\"{version}\""))
            .send_json(&body);
        let response = Self::check(kind, id, "update", result).map_err(|e| with_version(e, version))?;
        Self::decode(kind, id, response)
    }

    fn delete(&self, kind: &str, id: &str, version: &str) -> Result<()> {
        let ep = endpoint(kind, id)?;
        // GoCD deletes are unconditional; If-Match is sent for servers that honor it
        let request = self
            .authorize(self.agent.delete(&self.url(&ep, Some(id))), ep.accept)
            .header("If-Match", format!("\"{version}\""));
        Self::check(kind, id, "delete", request.call()).map_err(|e| with_version(e, version))?;
        Ok(())
    }

    fn list(&self, kind: &str) -> Result<Vec<RemoteRecord>> {
        self.list_names(kind)?
            .iter()
            .map(|name| self.fetch(kind, name))
            .collect()
    }
}

fn with_version(err: Error, sent: &str) -> Error {
    match err {
        Error::VersionMismatch { kind, id, .. } => Error::VersionMismatch {
            kind,
            id,
            version: sent.to_string(),
        },
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct GroupsResponse {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedGroups,
}

#[derive(Debug, Deserialize)]
struct EmbeddedGroups {
    #[serde(default)]
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    #[serde(default)]
    pipelines: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplatesResponse {
    #[serde(rename = "_embedded")]
    embedded: EmbeddedTemplates,
}

#[derive(Debug, Deserialize)]
struct EmbeddedTemplates {
    #[serde(default)]
    templates: Vec<NamedEntry>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GocdClient {
        GocdClient::new(GocdConfig::new("http://127.0.0.1:8153/go/")).unwrap()
    }

    #[test]
    fn test_urls() {
        let client = client();
        let ep = endpoint("pipeline", "p1").unwrap();
        assert_eq!(
            client.url(&ep, Some("p1")),
            "http://127.0.0.1:8153/go/api/admin/pipelines/p1"
        );
        let ep = endpoint("pipeline_template", "t1").unwrap();
        assert_eq!(client.url(&ep, None), "http://127.0.0.1:8153/go/api/admin/templates");
    }

    #[test]
    fn test_unknown_kind_is_validation_error() {
        let err = client().fetch("environment", "e1").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        assert!(GocdClient::new(GocdConfig::new("ftp://nope")).is_err());
    }

    #[test]
    fn test_version_mismatch_reports_sent_token() {
        let err = with_version(status_error("pipeline", "p1", 412, ""), "etag-1");
        assert_eq!(
            err,
            Error::VersionMismatch {
                kind: "pipeline".into(),
                id: "p1".into(),
                version: "etag-1".into(),
            }
        );
    }

    #[test]
    fn test_listing_shapes_decode() {
        let groups: GroupsResponse = serde_json::from_str(
            r#"{"_embedded":{"groups":[{"name":"testing","pipelines":[{"name":"a"},{"name":"b"}]},{"name":"empty"}]}}"#,
        )
        .unwrap();
        let names: Vec<_> = groups
            .embedded
            .groups
            .into_iter()
            .flat_map(|g| g.pipelines)
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        let templates: TemplatesResponse = serde_json::from_str(
            r#"{"_embedded":{"templates":[{"name":"template1","_embedded":{"pipelines":[]}}]}}"#,
        )
        .unwrap();
        assert_eq!(templates.embedded.templates[0].name, "template1");
    }
}
