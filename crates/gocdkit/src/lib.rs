//! # gocdkit
//!
//! GoCD support for declarative reconciliation: the `pipeline` and
//! `pipeline_template` field tables, and a [`declarative::RemoteClient`]
//! backed by the GoCD admin API.
//!
//! ## Example
//!
//! ```no_run
//! use declarative::{Snapshots, execute_simple, plan};
//! use gocdkit::{GocdClient, GocdConfig, kinds};
//!
//! let client = GocdClient::new(GocdConfig::new("http://127.0.0.1:8153/go/")).unwrap();
//! let catalog = kinds::catalog();
//! let plan = plan(&catalog, &[], &Snapshots::new()).unwrap();
//! let report = execute_simple(&plan, &client, &catalog, &Snapshots::new());
//! assert!(report.is_success());
//! ```

pub mod client;
pub mod config;
pub mod defaults;
pub mod error;
pub mod kinds;
pub mod wire;

pub use client::GocdClient;
pub use config::GocdConfig;
pub use error::ConfigError;
pub use kinds::{PIPELINE, PIPELINE_TEMPLATE, catalog};
