//! Repository-to-server reconciliation
//!
//! The reconciler owns the cache of known (server, repository, remote)
//! mappings. Each pass enumerates local remotes, matches them against the
//! candidate server list, replaces the cache atomically, and notifies
//! listeners only when the set actually changed. Remotes matching no
//! candidate are handed back to the caller for speculative discovery.
//!
//! Candidate order is significant and fixed: the default public server
//! first, then account servers, then discovered servers. First match wins,
//! so a remote pointing at the default host always maps under the default
//! server no matter what else is known.

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::accounts::AccountSource;
use crate::repo::{flatten_remotes, RemoteCoordinate, RepoSource};
use crate::server::{GitUrl, ServerIdentity};

/// One remote URL mapped under the server that owns it. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepositoryMapping {
    pub server: ServerIdentity,
    pub repository: PathBuf,
    pub remote_name: String,
    pub remote_url: String,
}

/// The set of known repository mappings, replaced atomically per pass.
///
/// Backed by an ordered set so equality and iteration order are
/// deterministic, and duplicate (server, repository, remote) triples are
/// impossible by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    mappings: BTreeSet<RepositoryMapping>,
}

impl MappingSet {
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RepositoryMapping> {
        self.mappings.iter()
    }

    pub fn contains(&self, mapping: &RepositoryMapping) -> bool {
        self.mappings.contains(mapping)
    }

    /// Mappings under one server.
    pub fn for_server<'a>(
        &'a self,
        server: &'a ServerIdentity,
    ) -> impl Iterator<Item = &'a RepositoryMapping> {
        self.mappings.iter().filter(move |m| &m.server == server)
    }

    fn insert(&mut self, mapping: RepositoryMapping) {
        self.mappings.insert(mapping);
    }
}

impl FromIterator<RepositoryMapping> for MappingSet {
    fn from_iter<T: IntoIterator<Item = RepositoryMapping>>(iter: T) -> Self {
        Self {
            mappings: iter.into_iter().collect(),
        }
    }
}

/// Observer of mapping set replacements.
///
/// Called synchronously on the owner task after each pass that changed the
/// set. A failing listener is logged and skipped; it cannot roll back the
/// swap or stop other listeners.
pub trait MappingListener: Send + Sync {
    fn mappings_changed(&self, mappings: &MappingSet) -> Result<()>;
}

impl<F> MappingListener for F
where
    F: Fn(&MappingSet) -> Result<()> + Send + Sync,
{
    fn mappings_changed(&self, mappings: &MappingSet) -> Result<()> {
        self(mappings)
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug)]
pub struct RecomputeOutcome {
    /// Whether the mapping set differs from the previous one
    pub changed: bool,
    /// Remotes that matched no candidate, deduplicated by URL, for discovery
    pub unmatched: Vec<RemoteCoordinate>,
}

/// Owns the mapping cache and the discovered-server set.
///
/// Not internally synchronized: one owner task drives it (the service), and
/// tests call it directly for deterministic synchronous passes.
pub struct Reconciler {
    default_server: ServerIdentity,
    accounts: Arc<dyn AccountSource>,
    repos: Arc<dyn RepoSource>,
    /// Discovered servers in insertion order; never removed.
    discovered: Vec<ServerIdentity>,
    known: MappingSet,
    listeners: Vec<Box<dyn MappingListener>>,
}

impl Reconciler {
    pub fn new(
        default_server: ServerIdentity,
        accounts: Arc<dyn AccountSource>,
        repos: Arc<dyn RepoSource>,
    ) -> Self {
        Self {
            default_server,
            accounts,
            repos,
            discovered: Vec::new(),
            known: MappingSet::default(),
            listeners: Vec::new(),
        }
    }

    /// Register a listener for mapping set changes.
    pub fn add_listener(&mut self, listener: Box<dyn MappingListener>) {
        self.listeners.push(listener);
    }

    /// The current known mapping set.
    pub fn known(&self) -> &MappingSet {
        &self.known
    }

    /// Servers found via discovery so far.
    pub fn discovered(&self) -> &[ServerIdentity] {
        &self.discovered
    }

    /// Record a discovered server. Returns false when already known.
    pub fn add_discovered(&mut self, server: ServerIdentity) -> bool {
        if self.discovered.contains(&server) {
            return false;
        }
        info!("Caching discovered server: {}", server);
        self.discovered.push(server);
        true
    }

    /// Run one reconciliation pass.
    ///
    /// Repository enumeration errors propagate and leave the previous
    /// mapping set untouched. On success the set is replaced atomically and
    /// listeners fire exactly once if it changed.
    pub async fn recompute(&mut self) -> Result<RecomputeOutcome> {
        let repos = self
            .repos
            .repositories()
            .await
            .context("Failed to enumerate local repositories")?;
        let coordinates = flatten_remotes(&repos);

        let mut candidates = vec![self.default_server.clone()];
        candidates.extend(
            self.accounts
                .servers()
                .await
                .context("Failed to enumerate account servers")?,
        );
        candidates.extend(self.discovered.iter().cloned());

        debug!(
            "Reconciling {} remote(s) against {} candidate server(s)",
            coordinates.len(),
            candidates.len()
        );

        let mut next = MappingSet::default();
        let mut unmatched: Vec<RemoteCoordinate> = Vec::new();

        for coordinate in coordinates {
            let url = match GitUrl::parse(&coordinate.url) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Skipping unparseable remote {}: {:#}", coordinate.url, e);
                    continue;
                }
            };

            match candidates.iter().find(|server| server.matches(&url)) {
                Some(server) => next.insert(RepositoryMapping {
                    server: server.clone(),
                    repository: coordinate.repository,
                    remote_name: coordinate.remote_name,
                    remote_url: coordinate.url,
                }),
                None => {
                    if !unmatched.iter().any(|c| c.url == coordinate.url) {
                        unmatched.push(coordinate);
                    }
                }
            }
        }

        let changed = next != self.known;
        self.known = next;

        if changed {
            info!(
                "Known repositories changed: {} mapping(s), {} unmatched remote(s)",
                self.known.len(),
                unmatched.len()
            );
            self.notify_listeners();
        } else {
            debug!("Reconciliation produced an identical mapping set, not notifying");
        }

        Ok(RecomputeOutcome { changed, unmatched })
    }

    fn notify_listeners(&self) {
        for listener in &self.listeners {
            if let Err(e) = listener.mappings_changed(&self.known) {
                warn!("Mapping listener failed: {:#}", e);
            }
        }
    }
}
