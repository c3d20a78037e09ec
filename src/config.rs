//! Configuration files
//!
//! Two kinds of file are read here:
//!
//! - resource files, one `[[resource]]` table per declared pipeline or
//!   template, passed on the command line
//! - the optional `pipewright.toml` in the config directory, whose
//!   `[provider]` table holds connection defaults

use anyhow::{Context, Result, anyhow};
use declarative::{Attributes, Catalog, ResourceKey, ResourceSpec};
use gocdkit::GocdConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Resource Config
// ============================================================================

#[derive(Debug, Deserialize)]
struct ResourceFile {
    #[serde(default)]
    resource: Vec<ResourceBlock>,
}

/// One `[[resource]]` table; every key besides these three is an attribute
#[derive(Debug, Deserialize)]
struct ResourceBlock {
    kind: String,
    name: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(flatten)]
    attributes: Attributes,
}

/// Read and validate every resource declared in a file
pub fn load_resources(path: &Path, catalog: &Catalog) -> Result<Vec<ResourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    parse_resources(&content, catalog).with_context(|| format!("Invalid config {}", path.display()))
}

/// Parse resource declarations from TOML text
pub fn parse_resources(content: &str, catalog: &Catalog) -> Result<Vec<ResourceSpec>> {
    let file: ResourceFile = toml::from_str(content).context("Invalid TOML")?;

    file.resource
        .into_iter()
        .map(|block| {
            let depends_on = block
                .depends_on
                .iter()
                .map(|address| {
                    ResourceKey::parse(address).ok_or_else(|| {
                        anyhow!(
                            "{}.{}: depends_on entry '{}' is not of the form kind.name",
                            block.kind,
                            block.name,
                            address
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let spec = ResourceSpec::from_catalog(
                catalog,
                &block.kind,
                block.name,
                block.attributes,
                depends_on,
            )?;
            Ok(spec)
        })
        .collect()
}

#[derive(Serialize)]
struct RenderedFile<'a> {
    resource: Vec<RenderedBlock<'a>>,
}

#[derive(Serialize)]
struct RenderedBlock<'a> {
    kind: &'a str,
    name: &'a str,
    #[serde(flatten)]
    attributes: &'a Attributes,
}

/// Render a spec as the `[[resource]]` block that would declare it
pub fn render_resource(spec: &ResourceSpec) -> Result<String> {
    let file = RenderedFile {
        resource: vec![RenderedBlock {
            kind: spec.kind(),
            name: spec.name(),
            attributes: spec.attributes(),
        }],
    };
    toml::to_string_pretty(&file).with_context(|| format!("Could not render {}", spec.key()))
}

// ============================================================================
// Provider Config
// ============================================================================

pub const ENV_URL: &str = "GOCD_URL";
pub const ENV_USERNAME: &str = "GOCD_USERNAME";
pub const ENV_PASSWORD: &str = "GOCD_PASSWORD";
pub const ENV_SKIP_SSL_CHECK: &str = "GOCD_SKIP_SSL_CHECK";
pub const ENV_TIMEOUT_SECS: &str = "GOCD_TIMEOUT_SECS";

/// Connection settings from one source; unset fields fall through to the
/// next source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub skip_ssl_check: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    provider: ProviderConfig,
}

impl ProviderConfig {
    /// Read the `GOCD_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let skip_ssl_check = var(ENV_SKIP_SSL_CHECK).map(|v| matches!(v.trim(), "1" | "true"));
        let timeout_secs = var(ENV_TIMEOUT_SECS)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{ENV_TIMEOUT_SECS} must be a number of seconds, got '{v}'"))
            })
            .transpose()?;

        Ok(Self {
            server: var(ENV_URL),
            username: var(ENV_USERNAME),
            password: var(ENV_PASSWORD),
            skip_ssl_check,
            timeout_secs,
        })
    }

    /// Read the `[provider]` table of a settings file; a missing file is empty
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No provider settings at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings: SettingsFile = toml::from_str(&content)
            .with_context(|| format!("Invalid provider settings in {}", path.display()))?;
        log::debug!("Loaded provider settings from {}", path.display());
        Ok(settings.provider)
    }

    /// Fill unset fields from a lower-priority source
    pub fn or(self, fallback: Self) -> Self {
        Self {
            server: self.server.or(fallback.server),
            username: self.username.or(fallback.username),
            password: self.password.or(fallback.password),
            skip_ssl_check: self.skip_ssl_check.or(fallback.skip_ssl_check),
            timeout_secs: self.timeout_secs.or(fallback.timeout_secs),
        }
    }

    /// Convert into client settings, checking them on the way
    pub fn into_gocd(self) -> Result<GocdConfig> {
        let mut config = GocdConfig::new(self.server.unwrap_or_default());
        config.username = self.username;
        config.password = self.password;
        config.skip_ssl_check = self.skip_ssl_check.unwrap_or(false);
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        config.validate()?;
        Ok(config)
    }
}

/// Resolve connection settings: flags, then environment, then settings file
pub fn resolve_provider(flags: ProviderConfig, settings_file: &Path) -> Result<GocdConfig> {
    flags
        .or(ProviderConfig::from_env()?)
        .or(ProviderConfig::from_file(settings_file)?)
        .into_gocd()
}
