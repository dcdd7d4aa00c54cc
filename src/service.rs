//! Reconciler service - owner task, triggers, and discovery plumbing
//!
//! All state mutation happens on one owner task: external triggers
//! (account changes, repository changes, probe completions) are funneled
//! through a channel into the service loop, coalesced by a short debounce
//! window so bursts collapse into a single reconciliation pass. Discovery
//! probes run as spawned tasks and re-enter the owner task through the same
//! channel; a completion arriving after shutdown finds the channel closed
//! and is dropped.
//!
//! `run_once` is the deterministic entry point: no debounce, no spawned
//! probes, everything awaited inline. The CLI one-shot commands and tests
//! use it.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info};

use crate::accounts::AccountSource;
use crate::config::Config;
use crate::probe::{DiscoveryProber, MetadataLoader};
use crate::reconciler::{MappingSet, Reconciler};
use crate::repo::RepoSource;
use crate::server::GitUrl;

/// External events that schedule a reconciliation pass.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// The authenticated account list changed
    AccountsChanged,
    /// The local repository set or remote configuration changed
    RepositoriesChanged,
    /// A discovery probe found a server
    Discovered(crate::server::ServerIdentity),
}

/// Cloneable handle for feeding triggers into a running service and
/// subscribing to mapping set updates.
#[derive(Clone)]
pub struct ServiceHandle {
    triggers: mpsc::UnboundedSender<Trigger>,
    shutdown: broadcast::Sender<()>,
    bus: broadcast::Sender<MappingSet>,
}

impl ServiceHandle {
    pub fn accounts_changed(&self) {
        let _ = self.triggers.send(Trigger::AccountsChanged);
    }

    pub fn repositories_changed(&self) {
        let _ = self.triggers.send(Trigger::RepositoriesChanged);
    }

    /// Subscribe to mapping set replacements.
    pub fn subscribe(&self) -> broadcast::Receiver<MappingSet> {
        self.bus.subscribe()
    }

    /// Request service shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Drives the reconciler from triggers and discovery completions.
pub struct ReconcilerService<L: MetadataLoader + 'static> {
    reconciler: Reconciler,
    prober: Arc<DiscoveryProber<L>>,
    debounce: Duration,
    triggers_tx: mpsc::UnboundedSender<Trigger>,
    triggers_rx: mpsc::UnboundedReceiver<Trigger>,
    shutdown_tx: broadcast::Sender<()>,
    bus: broadcast::Sender<MappingSet>,
}

impl<L: MetadataLoader + 'static> ReconcilerService<L> {
    pub fn new(
        config: &Config,
        accounts: Arc<dyn AccountSource>,
        repos: Arc<dyn RepoSource>,
        loader: L,
    ) -> Self {
        let (triggers_tx, triggers_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = broadcast::channel(1);
        let (bus, _) = broadcast::channel(16);

        let mut reconciler = Reconciler::new(config.default_server(), accounts, repos);

        // Fan the new set out on the bus whenever it is replaced. No
        // subscribers is not a listener failure.
        let bus_tx = bus.clone();
        reconciler.add_listener(Box::new(move |mappings: &MappingSet| -> Result<()> {
            let _ = bus_tx.send(mappings.clone());
            Ok(())
        }));

        Self {
            reconciler,
            prober: Arc::new(DiscoveryProber::new(loader, config.probe.alt_port)),
            debounce: Duration::from_millis(config.reconcile.debounce_ms),
            triggers_tx,
            triggers_rx,
            shutdown_tx,
            bus,
        }
    }

    /// Handle for triggering and subscribing from other tasks.
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle {
            triggers: self.triggers_tx.clone(),
            shutdown: self.shutdown_tx.clone(),
            bus: self.bus.clone(),
        }
    }

    /// Register an additional synchronous listener.
    pub fn add_listener(&mut self, listener: Box<dyn crate::reconciler::MappingListener>) {
        self.reconciler.add_listener(listener);
    }

    /// The current known mapping set.
    pub fn known(&self) -> &MappingSet {
        self.reconciler.known()
    }

    /// The metadata loader backing discovery.
    pub fn loader(&self) -> &L {
        self.prober.loader()
    }

    /// Run the service loop until shutdown.
    ///
    /// Each drained trigger batch results in exactly one pass. Pass
    /// failures (host git enumeration errors) are logged and the loop
    /// continues; the next trigger retries from unchanged state.
    pub async fn run(&mut self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        info!(
            "Reconciler service started (debounce {}ms)",
            self.debounce.as_millis()
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutdown requested, reconciler service stopping");
                    break;
                }

                trigger = self.triggers_rx.recv() => {
                    let Some(trigger) = trigger else { break };
                    self.absorb(trigger);
                    self.coalesce_window().await;

                    match self.run_pass().await {
                        Ok(changed) => {
                            debug!("Reconciliation pass done (changed: {})", changed);
                        }
                        Err(e) => {
                            error!("Reconciliation pass failed: {:?}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Drain triggers arriving within the debounce window so a burst of
    /// changes produces one pass. Holds at most one pending pass.
    async fn coalesce_window(&mut self) {
        if self.debounce.is_zero() {
            return;
        }
        let deadline = Instant::now() + self.debounce;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                trigger = self.triggers_rx.recv() => {
                    match trigger {
                        Some(trigger) => self.absorb(trigger),
                        None => break,
                    }
                }
            }
        }
    }

    /// Apply a trigger's immediate state effect. Discovery completions
    /// mutate the discovered set here, on the owner task.
    fn absorb(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Discovered(server) => {
                self.reconciler.add_discovered(server);
            }
            Trigger::AccountsChanged | Trigger::RepositoriesChanged => {}
        }
    }

    /// One reconciliation pass plus asynchronous discovery for whatever
    /// stayed unmatched. Returns whether the mapping set changed.
    async fn run_pass(&mut self) -> Result<bool> {
        let outcome = self.reconciler.recompute().await?;

        for coordinate in &outcome.unmatched {
            let url = match GitUrl::parse(&coordinate.url) {
                Ok(url) => url,
                Err(_) => continue,
            };

            let prober = self.prober.clone();
            let triggers = self.triggers_tx.clone();
            tokio::spawn(async move {
                if let Some(server) = prober.probe(&url).await {
                    // Send fails when the service already shut down; the
                    // discovery is then simply dropped.
                    let _ = triggers.send(Trigger::Discovered(server));
                }
            });
        }

        Ok(outcome.changed)
    }

    /// Deterministic single pass: reconcile, probe unmatched remotes
    /// inline, and reconcile again if anything was discovered.
    pub async fn run_once(&mut self) -> Result<MappingSet> {
        let outcome = self
            .reconciler
            .recompute()
            .await
            .context("Reconciliation failed")?;

        let mut discovered_any = false;
        for coordinate in &outcome.unmatched {
            let Ok(url) = GitUrl::parse(&coordinate.url) else {
                continue;
            };
            if let Some(server) = self.prober.probe(&url).await {
                discovered_any |= self.reconciler.add_discovered(server);
            }
        }

        if discovered_any {
            self.reconciler
                .recompute()
                .await
                .context("Reconciliation after discovery failed")?;
        }

        Ok(self.reconciler.known().clone())
    }
}
