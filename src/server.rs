//! Hosting server identities and remote URL matching
//!
//! A [`ServerIdentity`] names one git hosting server instance: scheme, host,
//! optional port, optional path suffix for installations served under a
//! sub-path (e.g. `https://company.com/gitea`). Identities are compared
//! structurally so they can live in ordered sets.
//!
//! [`GitUrl`] is the lenient remote-URL parser backing the matching rule. Git
//! remotes come in more shapes than RFC URLs: plain `https://` clone URLs,
//! `ssh://git@host/owner/repo`, and the scp-like `git@host:owner/repo.git`
//! form, all of which must resolve to the same host and path segments.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport scheme of a hosting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP (insecure)
    Http,
    /// HTTPS (secure)
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one git hosting server instance.
///
/// Equality is structural: two identities are the same server only if scheme,
/// host, port and suffix all agree. Matching against remote URLs is looser,
/// see [`ServerIdentity::matches`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerIdentity {
    pub scheme: Scheme,
    pub host: String,
    /// Explicit port, if the server runs off the scheme default.
    #[serde(default)]
    pub port: Option<u16>,
    /// Leading path segments for servers installed under a sub-path,
    /// without surrounding slashes (e.g. "gitea" or "tools/git").
    #[serde(default)]
    pub suffix: Option<String>,
}

impl ServerIdentity {
    /// A secure server identity with default port and no suffix.
    pub fn https(host: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Https,
            host: host.into(),
            port: None,
            suffix: None,
        }
    }

    /// An insecure server identity with default port and no suffix.
    pub fn http(host: impl Into<String>) -> Self {
        Self {
            scheme: Scheme::Http,
            host: host.into(),
            port: None,
            suffix: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.suffix = if suffix.is_empty() { None } else { Some(suffix) };
        self
    }

    /// Base URL for API calls against this server, no trailing slash.
    pub fn base_url(&self) -> String {
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            url.push_str(&format!(":{}", port));
        }
        if let Some(suffix) = &self.suffix {
            url.push('/');
            url.push_str(suffix);
        }
        url
    }

    /// Whether this server's matching rule accepts a remote URL.
    ///
    /// The rule is deliberately scheme-blind: a server registered as https
    /// still owns ssh and scp-style remotes pointing at the same host. Host
    /// comparison is case-insensitive. A server with an explicit port only
    /// claims URLs carrying exactly that port; a server with a path suffix
    /// only claims URLs whose path starts with those segments.
    pub fn matches(&self, url: &GitUrl) -> bool {
        if !self.host.eq_ignore_ascii_case(&url.host) {
            return false;
        }
        if let Some(port) = self.port {
            if url.port != Some(port) {
                return false;
            }
        }
        if let Some(suffix) = &self.suffix {
            let want: Vec<&str> = suffix.split('/').filter(|s| !s.is_empty()).collect();
            if url.segments.len() < want.len() {
                return false;
            }
            if !want
                .iter()
                .zip(url.segments.iter())
                .all(|(w, s)| w.eq_ignore_ascii_case(s))
            {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// A git remote URL decomposed into host, optional port, and path segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitUrl {
    /// Original URL text as configured on the remote.
    pub raw: String,
    pub host: String,
    pub port: Option<u16>,
    /// Path segments with any trailing `.git` stripped from the last one.
    pub segments: Vec<String>,
}

impl GitUrl {
    /// Parse a git remote URL.
    ///
    /// Accepts `scheme://[user@]host[:port]/path`, and the scp-like form
    /// `user@host:path` that git treats as ssh. Rejects anything without a
    /// recognizable host.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(anyhow!("Empty remote URL"));
        }

        if let Some(rest) = raw.split_once("://").map(|(_, rest)| rest) {
            Self::parse_authority_form(raw, rest)
        } else if let Some((user_host, path)) = raw.split_once(':') {
            // scp-like: git@host:owner/repo.git (no scheme, single colon)
            if user_host.contains('/') {
                return Err(anyhow!("Unrecognized remote URL: {}", raw));
            }
            let host = user_host
                .rsplit_once('@')
                .map(|(_, h)| h)
                .unwrap_or(user_host);
            if host.is_empty() {
                return Err(anyhow!("Remote URL has no host: {}", raw));
            }
            Ok(Self {
                raw: raw.to_string(),
                host: host.to_string(),
                port: None,
                segments: split_segments(path),
            })
        } else {
            Err(anyhow!("Unrecognized remote URL: {}", raw))
        }
    }

    fn parse_authority_form(raw: &str, rest: &str) -> Result<Self> {
        let (authority, path) = match rest.split_once('/') {
            Some((a, p)) => (a, p),
            None => (rest, ""),
        };
        let host_port = authority
            .rsplit_once('@')
            .map(|(_, hp)| hp)
            .unwrap_or(authority);

        let (host, port) = match host_port.rsplit_once(':') {
            Some((h, p)) => {
                let port: u16 = p
                    .parse()
                    .map_err(|_| anyhow!("Invalid port in remote URL: {}", raw))?;
                (h, Some(port))
            }
            None => (host_port, None),
        };

        if host.is_empty() {
            return Err(anyhow!("Remote URL has no host: {}", raw));
        }

        Ok(Self {
            raw: raw.to_string(),
            host: host.to_string(),
            port,
            segments: split_segments(path),
        })
    }

}

impl fmt::Display for GitUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_segments(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect();
    if let Some(last) = segments.last_mut() {
        if let Some(stripped) = last.strip_suffix(".git") {
            if stripped.is_empty() {
                segments.pop();
            } else {
                *last = stripped.to_string();
            }
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_https_url() {
        let url = GitUrl::parse("https://git.example.com/team/proj.git").unwrap();
        assert_eq!(url.host, "git.example.com");
        assert_eq!(url.port, None);
        assert_eq!(url.segments, vec!["team", "proj"]);
    }

    #[test]
    fn test_parse_https_url_with_port() {
        let url = GitUrl::parse("https://git.example.com:8080/team/proj.git").unwrap();
        assert_eq!(url.host, "git.example.com");
        assert_eq!(url.port, Some(8080));
        assert_eq!(url.segments, vec!["team", "proj"]);
    }

    #[test]
    fn test_parse_scp_like_url() {
        let url = GitUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert_eq!(url.host, "github.com");
        assert_eq!(url.port, None);
        assert_eq!(url.segments, vec!["owner", "repo"]);
    }

    #[test]
    fn test_parse_ssh_url_with_user() {
        let url = GitUrl::parse("ssh://git@git.example.com/owner/repo").unwrap();
        assert_eq!(url.host, "git.example.com");
        assert_eq!(url.segments, vec!["owner", "repo"]);
    }

    #[test]
    fn test_parse_url_with_install_suffix() {
        let url = GitUrl::parse("https://company.com/gitea/owner/repo.git").unwrap();
        assert_eq!(url.segments, vec!["gitea", "owner", "repo"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(GitUrl::parse("").is_err());
        assert!(GitUrl::parse("not a url at all").is_err());
        assert!(GitUrl::parse("/local/path/repo").is_err());
    }

    #[test]
    fn test_parse_invalid_port() {
        assert!(GitUrl::parse("https://host:notaport/a/b").is_err());
    }

    #[test]
    fn test_match_host_case_insensitive() {
        let server = ServerIdentity::https("GitHub.com");
        let url = GitUrl::parse("https://github.com/owner/repo.git").unwrap();
        assert!(server.matches(&url));
    }

    #[test]
    fn test_match_is_scheme_blind() {
        let server = ServerIdentity::https("github.com");
        let ssh = GitUrl::parse("git@github.com:owner/repo.git").unwrap();
        assert!(server.matches(&ssh));
    }

    #[test]
    fn test_match_wrong_host() {
        let server = ServerIdentity::https("github.com");
        let url = GitUrl::parse("https://gitlab.com/owner/repo.git").unwrap();
        assert!(!server.matches(&url));
    }

    #[test]
    fn test_match_explicit_port_required() {
        let server = ServerIdentity::https("git.example.com").with_port(8080);
        let with_port = GitUrl::parse("https://git.example.com:8080/a/b").unwrap();
        let without_port = GitUrl::parse("https://git.example.com/a/b").unwrap();
        assert!(server.matches(&with_port));
        assert!(!server.matches(&without_port));
    }

    #[test]
    fn test_match_suffix_prefix_rule() {
        let server = ServerIdentity::https("company.com").with_suffix("gitea");
        let under_suffix = GitUrl::parse("https://company.com/gitea/owner/repo.git").unwrap();
        let elsewhere = GitUrl::parse("https://company.com/other/owner/repo.git").unwrap();
        assert!(server.matches(&under_suffix));
        assert!(!server.matches(&elsewhere));
    }

    #[test]
    fn test_base_url_rendering() {
        assert_eq!(
            ServerIdentity::https("git.example.com").base_url(),
            "https://git.example.com"
        );
        assert_eq!(
            ServerIdentity::http("git.example.com")
                .with_port(8080)
                .with_suffix("gitea")
                .base_url(),
            "http://git.example.com:8080/gitea"
        );
    }

    #[test]
    fn test_identity_structural_equality() {
        let a = ServerIdentity::https("host");
        let b = ServerIdentity::https("host").with_port(443);
        assert_ne!(a, b);
        assert_eq!(a, ServerIdentity::https("host"));
    }
}
