use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use crate::config::ProviderConfig;

#[derive(Parser)]
#[command(name = "pipewright")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative reconciler for GoCD pipelines and templates", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// State file (default: <state dir>/state.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub state: Option<String>,

    #[command(flatten)]
    pub provider: ProviderArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection flags; unset ones fall back to GOCD_* variables, then to
/// `pipewright.toml`
#[derive(Args, Debug, Clone, Default)]
pub struct ProviderArgs {
    /// GoCD server URL, e.g. http://127.0.0.1:8153/go
    #[arg(long, global = true, value_name = "URL")]
    pub server: Option<String>,

    /// Username for basic auth
    #[arg(long, global = true)]
    pub username: Option<String>,

    /// Password for basic auth
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Accept any TLS certificate
    #[arg(long, global = true)]
    pub skip_ssl_check: bool,

    /// Per-request timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl From<ProviderArgs> for ProviderConfig {
    fn from(args: ProviderArgs) -> Self {
        Self {
            server: args.server,
            username: args.username,
            password: args.password,
            skip_ssl_check: args.skip_ssl_check.then_some(true),
            timeout_secs: args.timeout,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Show what apply would change
    Plan(PlanArgs),

    /// Converge the server to the declared resources
    Apply(ApplyArgs),

    /// Delete every resource recorded in state
    Destroy(DestroyArgs),

    /// Adopt existing resources into state and print their config
    Import {
        /// Resource kind: pipeline or pipeline_template
        kind: String,
        /// Resource name on the server; every listed resource of the kind
        /// that state does not track yet when omitted
        id: Option<String>,
    },

    /// Check that a resource no longer exists on the server
    VerifyDestroyed {
        /// Resource kind: pipeline or pipeline_template
        kind: String,
        /// Resource name on the server
        id: String,
    },

    /// Run an acceptance scenario against the server
    Check {
        /// Scenario file
        scenario: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PlanArgs {
    /// Resource config file(s)
    #[arg(required = true)]
    pub config: Vec<PathBuf>,

    /// Plan from recorded state without re-reading the server
    #[arg(long)]
    pub no_refresh: bool,

    /// Only plan a kind or a single resource (e.g. pipeline, pipeline.build)
    #[arg(long)]
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Show what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Attempts per remote call for transient failures
    #[arg(long, default_value = "3", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub retries: u32,
}

#[derive(Args, Debug, Clone)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Only destroy a kind or a single resource
    #[arg(long)]
    pub target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_apply_flags() {
        let cli = Cli::parse_from([
            "pipewright",
            "-vv",
            "apply",
            "pipelines.toml",
            "--yes",
            "--retries",
            "5",
            "--server",
            "http://localhost:8153/go",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.provider.server.as_deref(), Some("http://localhost:8153/go"));
        match cli.command {
            Command::Apply(args) => {
                assert!(args.yes);
                assert_eq!(args.retries, 5);
                assert_eq!(args.plan.config, vec![PathBuf::from("pipelines.toml")]);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_import_id_is_optional() {
        let cli = Cli::parse_from(["pipewright", "import", "pipeline_template"]);
        assert!(matches!(
            cli.command,
            Command::Import { ref kind, id: None } if kind == "pipeline_template"
        ));
    }

    #[test]
    fn test_skip_ssl_flag_only_overrides_when_set() {
        let config = ProviderConfig::from(ProviderArgs::default());
        assert_eq!(config.skip_ssl_check, None);

        let config = ProviderConfig::from(ProviderArgs {
            skip_ssl_check: true,
            ..ProviderArgs::default()
        });
        assert_eq!(config.skip_ssl_check, Some(true));
    }
}
