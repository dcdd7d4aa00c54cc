//! Authenticated account sources
//!
//! The reconciler treats accounts purely as a source of server identities:
//! an authenticated account against a server makes that server a matching
//! candidate for remote URLs. [`ConfigAccounts`] is the default source,
//! backed by the `accounts` section of the config file and replaceable at
//! runtime when the daemon re-reads configuration.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;
use tracing::debug;

use crate::config::AccountEntry;
use crate::server::ServerIdentity;

/// Source of authenticated hosting-server identities.
#[async_trait]
pub trait AccountSource: Send + Sync {
    /// Servers with an authenticated account, in priority order.
    async fn servers(&self) -> Result<Vec<ServerIdentity>>;
}

/// Account source backed by configuration file entries.
pub struct ConfigAccounts {
    entries: RwLock<Vec<AccountEntry>>,
}

impl ConfigAccounts {
    pub fn new(entries: Vec<AccountEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Replace the account list, e.g. after a config reload.
    pub fn replace(&self, entries: Vec<AccountEntry>) {
        debug!("Replacing account list ({} entries)", entries.len());
        let mut guard = self.entries.write().expect("account lock poisoned");
        *guard = entries;
    }
}

#[async_trait]
impl AccountSource for ConfigAccounts {
    async fn servers(&self) -> Result<Vec<ServerIdentity>> {
        let guard = self.entries.read().expect("account lock poisoned");
        Ok(guard.iter().map(|entry| entry.server()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Scheme;

    fn entry(host: &str) -> AccountEntry {
        AccountEntry {
            host: host.to_string(),
            scheme: Scheme::Https,
            port: None,
            suffix: None,
            username: None,
        }
    }

    #[tokio::test]
    async fn test_config_accounts_yield_servers_in_order() {
        let accounts = ConfigAccounts::new(vec![entry("a.example"), entry("b.example")]);
        let servers = accounts.servers().await.unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].host, "a.example");
        assert_eq!(servers[1].host, "b.example");
    }

    #[tokio::test]
    async fn test_replace_swaps_entries() {
        let accounts = ConfigAccounts::new(vec![entry("old.example")]);
        accounts.replace(vec![entry("new.example")]);
        let servers = accounts.servers().await.unwrap();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].host, "new.example");
    }
}
