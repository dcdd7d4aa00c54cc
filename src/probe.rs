//! Speculative server discovery
//!
//! When a remote URL matches no known server, its host may still run a
//! self-hosted instance. Discovery extracts host and path from the URL,
//! derives the candidate identities, and attempts a metadata fetch against
//! each in a fixed order, short-circuiting on the first server that answers.
//!
//! Probe failures are the common case (most unmatched hosts simply are not
//! hosting servers) and are logged at debug, never as errors.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ProbeConfig;
use crate::server::{GitUrl, ServerIdentity};

/// Metadata returned by a hosting server's meta endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerMetadata {
    /// Server software version
    pub version: String,
    /// Optional installation display name
    #[serde(default)]
    pub name: Option<String>,
}

/// Fetches server metadata for a candidate identity.
///
/// The single collaborator contract of discovery; the HTTP implementation is
/// the production one, tests substitute scripted fakes.
#[async_trait]
pub trait MetadataLoader: Send + Sync {
    async fn load(&self, server: &ServerIdentity) -> Result<ServerMetadata>;
}

/// HTTP metadata loader using the server's meta endpoint.
pub struct HttpMetadataLoader {
    client: reqwest::Client,
    metadata_path: String,
}

impl HttpMetadataLoader {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            metadata_path: config.metadata_path.trim_matches('/').to_string(),
        })
    }

    fn metadata_url(&self, server: &ServerIdentity) -> String {
        format!("{}/{}", server.base_url(), self.metadata_path)
    }
}

#[async_trait]
impl MetadataLoader for HttpMetadataLoader {
    async fn load(&self, server: &ServerIdentity) -> Result<ServerMetadata> {
        let url = self.metadata_url(server);
        debug!("Fetching server metadata: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Metadata request failed: {}", url))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "Metadata endpoint returned {}: {}",
                response.status(),
                url
            ));
        }

        response
            .json::<ServerMetadata>()
            .await
            .with_context(|| format!("Invalid metadata payload from {}", url))
    }
}

/// Probe candidates for one unmatched remote URL, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePlan {
    pub candidates: Vec<ServerIdentity>,
}

impl ProbePlan {
    /// Build the probe plan for a remote URL.
    ///
    /// Requires at least two path segments (the owner/repo convention);
    /// anything shorter cannot be a hosted repository and yields no plan.
    /// Segments before the trailing two become the installation suffix.
    /// Candidate order is fixed: insecure default port, secure default port,
    /// secure alternate port.
    pub fn for_url(url: &GitUrl, alt_port: u16) -> Option<Self> {
        if url.segments.len() < 2 {
            return None;
        }

        let suffix = if url.segments.len() > 2 {
            Some(url.segments[..url.segments.len() - 2].join("/"))
        } else {
            None
        };

        let base = |identity: ServerIdentity| match &suffix {
            Some(s) => identity.with_suffix(s.clone()),
            None => identity,
        };

        Some(Self {
            candidates: vec![
                base(ServerIdentity::http(url.host.clone())),
                base(ServerIdentity::https(url.host.clone())),
                base(ServerIdentity::https(url.host.clone()).with_port(alt_port)),
            ],
        })
    }
}

/// Runs probe plans against a metadata loader.
pub struct DiscoveryProber<L: MetadataLoader> {
    loader: L,
    alt_port: u16,
}

impl<L: MetadataLoader> DiscoveryProber<L> {
    pub fn new(loader: L, alt_port: u16) -> Self {
        Self { loader, alt_port }
    }

    /// The metadata loader backing this prober.
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Probe the host behind an unmatched remote URL.
    ///
    /// Candidates are tried strictly in plan order and the first success
    /// wins; later candidates are never attempted after a hit. Returns
    /// `None` when the URL is unprobeable or every candidate fails.
    pub async fn probe(&self, url: &GitUrl) -> Option<ServerIdentity> {
        let plan = match ProbePlan::for_url(url, self.alt_port) {
            Some(plan) => plan,
            None => {
                debug!("Remote URL not probeable (needs owner/repo path): {}", url);
                return None;
            }
        };

        for candidate in plan.candidates {
            match self.loader.load(&candidate).await {
                Ok(metadata) => {
                    info!(
                        "Discovered server {} (version {})",
                        candidate, metadata.version
                    );
                    return Some(candidate);
                }
                Err(e) => {
                    debug!("Probe miss for {}: {:#}", candidate, e);
                }
            }
        }

        debug!("All probe candidates failed for {}", url);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Scheme;
    use std::sync::Mutex;

    #[test]
    fn test_plan_requires_two_segments() {
        let url = GitUrl::parse("https://git.example.com/onlyone").unwrap();
        assert!(ProbePlan::for_url(&url, 8080).is_none());

        let url = GitUrl::parse("https://git.example.com/").unwrap();
        assert!(ProbePlan::for_url(&url, 8080).is_none());
    }

    #[test]
    fn test_plan_candidate_order() {
        let url = GitUrl::parse("https://git.example.com/team/proj.git").unwrap();
        let plan = ProbePlan::for_url(&url, 8080).unwrap();

        assert_eq!(plan.candidates.len(), 3);
        assert_eq!(plan.candidates[0].scheme, Scheme::Http);
        assert_eq!(plan.candidates[0].port, None);
        assert_eq!(plan.candidates[1].scheme, Scheme::Https);
        assert_eq!(plan.candidates[1].port, None);
        assert_eq!(plan.candidates[2].scheme, Scheme::Https);
        assert_eq!(plan.candidates[2].port, Some(8080));
        assert!(plan.candidates.iter().all(|c| c.host == "git.example.com"));
        assert!(plan.candidates.iter().all(|c| c.suffix.is_none()));
    }

    #[test]
    fn test_plan_suffix_from_leading_segments() {
        let url = GitUrl::parse("https://company.com/tools/git/team/proj.git").unwrap();
        let plan = ProbePlan::for_url(&url, 8080).unwrap();
        assert!(plan
            .candidates
            .iter()
            .all(|c| c.suffix.as_deref() == Some("tools/git")));
    }

    /// Loader scripted to succeed for a fixed set of identities, recording
    /// every attempt.
    struct ScriptedLoader {
        succeed_on: Vec<ServerIdentity>,
        attempts: Mutex<Vec<ServerIdentity>>,
    }

    impl ScriptedLoader {
        fn new(succeed_on: Vec<ServerIdentity>) -> Self {
            Self {
                succeed_on,
                attempts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MetadataLoader for ScriptedLoader {
        async fn load(&self, server: &ServerIdentity) -> Result<ServerMetadata> {
            self.attempts.lock().unwrap().push(server.clone());
            if self.succeed_on.contains(server) {
                Ok(ServerMetadata {
                    version: "1.0".to_string(),
                    name: None,
                })
            } else {
                Err(anyhow!("connection refused"))
            }
        }
    }

    #[tokio::test]
    async fn test_probe_short_circuits_on_first_success() {
        let url = GitUrl::parse("https://git.example.com/team/proj.git").unwrap();
        let http = ServerIdentity::http("git.example.com");
        let loader = ScriptedLoader::new(vec![http.clone()]);

        let prober = DiscoveryProber::new(loader, 8080);
        let found = prober.probe(&url).await;

        assert_eq!(found, Some(http));
        let attempts = prober.loader.attempts.lock().unwrap();
        // First candidate hit: https and the alternate port were never tried
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_probe_falls_through_to_alt_port() {
        let url = GitUrl::parse("https://git.example.com/team/proj.git").unwrap();
        let alt = ServerIdentity::https("git.example.com").with_port(8080);
        let loader = ScriptedLoader::new(vec![alt.clone()]);

        let prober = DiscoveryProber::new(loader, 8080);
        let found = prober.probe(&url).await;

        assert_eq!(found, Some(alt));
        assert_eq!(prober.loader.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_all_candidates_fail() {
        let url = GitUrl::parse("https://git.example.com/team/proj.git").unwrap();
        let loader = ScriptedLoader::new(Vec::new());

        let prober = DiscoveryProber::new(loader, 8080);
        assert_eq!(prober.probe(&url).await, None);
        assert_eq!(prober.loader.attempts.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_probe_skips_short_paths_entirely() {
        let url = GitUrl::parse("https://git.example.com/justowner").unwrap();
        let loader = ScriptedLoader::new(Vec::new());

        let prober = DiscoveryProber::new(loader, 8080);
        assert_eq!(prober.probe(&url).await, None);
        assert!(prober.loader.attempts.lock().unwrap().is_empty());
    }
}
