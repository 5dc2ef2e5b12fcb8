//! nodewiz - provision, bootstrap and validate blockchain validator clusters.
//!
//! The crate creates cloud instances across regions, installs and configures
//! the node client on every host in parallel, waits for the cluster to become
//! healthy and bootstrapped, enrolls the hosts as validators, and deploys a
//! subnet (plus an optional interchain relayer) onto them. Every stage is
//! idempotent, so re-running a failed command resumes where it stopped.
//!
//! # Architecture
//!
//! Hexagonal layers, dependencies pointing inward:
//!
//! - [`domain`] - Cloud- and transport-agnostic model: hosts, clusters,
//!   gates, reports, keys
//! - [`port`] - Inbound operator traits and outbound traits for clouds,
//!   remote hosts, the chain, persisted state, time and notifications
//! - [`application`] - Parallel executor, poll-until, provisioning pipeline,
//!   cluster lifecycle and the staged orchestrator
//! - [`adapter`] - The CLI, plus AWS/GCP CLIs, SSH, JSON-RPC and file storage
//! - [`infrastructure`] - Configuration, wiring and the operator facade
//!
//! # Example
//!
//! ```no_run
//! use nodewiz::infrastructure::config::settings::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.init_logging();
//!     let settings = config.orchestrator_settings("203.0.113.7/32".to_string());
//!     println!("{:?}", settings.gates);
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod port;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;
