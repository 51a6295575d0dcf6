//! # nic-audit - Network Combination Audit
//!
//! Audits compute instances across cloud accounts for forbidden
//! combinations of attached networks, for example a host with one NIC on an
//! administrative network and another on the public internet.
//!
//! ## Features
//!
//! - **Typed rules** - Every rule token is classified once at load time
//! - **Network-aware matching** - A CIDR or `public` rule consumes the whole network it hits
//! - **Configurable private space** - RFC1918 by default, any CIDR list allowed
//! - **Remediation** - Optional per-account NIC removal, deduplicated by MAC
//! - **Alerting** - One text/HTML email per run, or log-only
//! - **Bounded calls** - Every API call has a deadline and honours SIGINT/SIGTERM
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       nic-audit                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: audit, validate, version                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Config (serde_yaml)                                        │
//! │    └── compile() -> RuleSet of typed criteria               │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Rules (ipnet, uuid)                                        │
//! │    ├── criteria + classifier                                │
//! │    └── matcher -> evaluator                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Compute (ComputeApi trait)                                 │
//! │    ├── CloudApiClient (reqwest + rustls)                    │
//! │    └── CallGuard: deadline + shutdown token                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Auditor                                                    │
//! │    └── per account: evaluate, plan removals, detach         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Alerts (lettre)                                            │
//! │    └── AuditReport -> EmailSink | LogSink                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use nic_audit::audit::{AuditOptions, Auditor};
//! use nic_audit::compute::{CloudApiClient, ComputeApi};
//! use nic_audit::config::Config;
//! use nic_audit::signal::ShutdownToken;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/nic-audit/config.yaml")?;
//!     let rules = config.compile()?;
//!
//!     let options = AuditOptions {
//!         dry_run: true,
//!         ..Default::default()
//!     };
//!     let auditor = Auditor::new(&rules, options, ShutdownToken::new());
//!     let report = auditor
//!         .run(|account| {
//!             CloudApiClient::new(account, Duration::from_secs(30))
//!                 .map(|c| Box::new(c) as Box<dyn ComputeApi>)
//!         })
//!         .await;
//!
//!     print!("{}", report.render_text());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`alerts`] - Alert records, report rendering and delivery
//! - [`audit`] - Per-account and multi-account audit passes
//! - [`classifier`] - Private/public address classification
//! - [`cli`] - Command-line interface definitions
//! - [`commands`] - CLI command implementations
//! - [`compute`] - Compute API trait, HTTP client, call deadlines
//! - [`config`] - Configuration parsing, validation and compilation
//! - [`criteria`] - Typed rule criteria and groups
//! - [`error`] - Typed audit errors
//! - [`evaluator`] - Rule group evaluation per instance
//! - [`matcher`] - Criteria matching engine
//! - [`removal`] - NIC removal planning and execution
//! - [`signal`] - Graceful shutdown signal handling
//! - [`validation`] - CIDR parsing and file checks

pub mod alerts;
pub mod audit;
pub mod classifier;
pub mod cli;
pub mod commands;
pub mod compute;
pub mod config;
pub mod criteria;
pub mod error;
pub mod evaluator;
pub mod matcher;
pub mod removal;
pub mod signal;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use error::AuditError;
