//! Mutable set of known peer base URLs (spec.md §4.4).
//!
//! Backed by `dashmap` rather than the coarse coordinator lock: the
//! discovery loop and the `/v1/network/join` handler both touch it
//! independently of any state mutation.

use dashmap::DashSet;

/// Normalize a peer URL: trim whitespace, lower-case scheme+host, drop a
/// trailing slash. Returns `None` for an empty or unparseable input.
pub fn normalize_url(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (scheme_host, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => return None,
    };
    let (authority, path) = match rest.split_once('/') {
        Some((authority, path)) => (authority.to_ascii_lowercase(), format!("/{path}")),
        None => (rest.to_ascii_lowercase(), String::new()),
    };
    if authority.is_empty() {
        return None;
    }
    let path = path.trim_end_matches('/');
    Some(format!("{scheme_host}://{authority}{path}"))
}

#[derive(Debug, Default)]
pub struct PeerSet {
    peers: DashSet<String>,
    self_url: Option<String>,
}

impl PeerSet {
    pub fn new(self_url: Option<String>) -> Self {
        let self_url = self_url.and_then(|u| normalize_url(&u));
        PeerSet {
            peers: DashSet::new(),
            self_url,
        }
    }

    pub fn seed(&self, urls: impl IntoIterator<Item = String>) {
        for url in urls {
            self.add(&url);
        }
    }

    /// Normalize and insert `url` unless it's empty or equal to self.
    /// Returns `true` if it was newly added.
    pub fn add(&self, url: &str) -> bool {
        match normalize_url(url) {
            Some(normalized) if Some(&normalized) != self.self_url.as_ref() => {
                self.peers.insert(normalized)
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn list(&self) -> Vec<String> {
        let mut out: Vec<String> = self.peers.iter().map(|p| p.clone()).collect();
        out.sort();
        out
    }

    pub fn self_url(&self) -> Option<&str> {
        self.self_url.as_deref()
    }
}
