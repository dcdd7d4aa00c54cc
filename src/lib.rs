//! remotemap - Repository-to-hosting-server mapping reconciler
//!
//! remotemap maintains a cache of known "repository <-> hosting server"
//! mappings for a collection of local git repositories, reacting to account
//! and repository changes and discovering self-hosted server instances by
//! probing candidate URLs.
//!
//! ## Core Features
//!
//! - **Reconciliation**: remote URLs matched against the default public
//!   server, account servers, and previously discovered servers
//! - **Discovery**: speculative metadata probing of unmatched hosts
//!   (http, https, https on an alternate port, first hit wins)
//! - **Change Notification**: listeners and a broadcast bus fed exactly
//!   once per changed mapping set
//! - **Configuration Management**: YAML-based configuration with XDG
//!   compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`server`]: Server identities and remote URL matching
//! - [`repo`]: Local repository enumeration
//! - [`accounts`]: Authenticated account sources
//! - [`probe`]: Server discovery probing
//! - [`reconciler`]: The mapping reconciliation core
//! - [`service`]: Owner task, triggers, and debounce

pub mod accounts;
pub mod config;
pub mod probe;
pub mod reconciler;
pub mod repo;
pub mod server;
pub mod service;

pub use accounts::{AccountSource, ConfigAccounts};
pub use config::Config;
pub use probe::{DiscoveryProber, HttpMetadataLoader, MetadataLoader, ProbePlan, ServerMetadata};
pub use reconciler::{MappingListener, MappingSet, Reconciler, RepositoryMapping};
pub use repo::{GitScanner, LocalRepo, RemoteCoordinate, RepoSource};
pub use server::{GitUrl, Scheme, ServerIdentity};
pub use service::{ReconcilerService, ServiceHandle, Trigger};
