use super::models::Proto;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    Subdomain {
        host: String,
    },
    OpenPort {
        host: String,
        port: u16,
        proto: Proto,
    },
    LiveHost {
        url: String,
        status_code: Option<u16>,
        title: Option<String>,
        #[serde(default)]
        tech: Vec<String>,
    },
    Endpoint {
        url: String,
        source: String,
    },
    Parameter {
        url: String,
        name: String,
    },
    Screenshot {
        url: String,
        file_path: PathBuf,
    },
}

/// Uniqueness key of a finding: its kind plus the identifying fields.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FindingKey {
    Subdomain(String),
    OpenPort(String, u16, Proto),
    LiveHost(String),
    Endpoint(String),
    Parameter(String, String),
    Screenshot(String),
}

impl Finding {
    pub fn key(&self) -> FindingKey {
        match self {
            Finding::Subdomain { host } => FindingKey::Subdomain(host.clone()),
            Finding::OpenPort { host, port, proto } => {
                FindingKey::OpenPort(host.clone(), *port, *proto)
            }
            Finding::LiveHost { url, .. } => FindingKey::LiveHost(url.clone()),
            Finding::Endpoint { url, .. } => FindingKey::Endpoint(url.clone()),
            Finding::Parameter { url, name } => FindingKey::Parameter(url.clone(), name.clone()),
            Finding::Screenshot { url, .. } => FindingKey::Screenshot(url.clone()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Finding::Subdomain { .. } => "subdomain",
            Finding::OpenPort { .. } => "open_port",
            Finding::LiveHost { .. } => "live_host",
            Finding::Endpoint { .. } => "endpoint",
            Finding::Parameter { .. } => "parameter",
            Finding::Screenshot { .. } => "screenshot",
        }
    }
}

/// De-duplicated, append-only set of findings for one target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoreRepr", into = "StoreRepr")]
pub struct FindingStore {
    target: String,
    findings: BTreeMap<FindingKey, Finding>,
}

#[derive(Serialize, Deserialize)]
struct StoreRepr {
    target: String,
    findings: Vec<Finding>,
}

impl From<StoreRepr> for FindingStore {
    fn from(repr: StoreRepr) -> Self {
        let mut store = FindingStore::new(repr.target);
        store.extend(repr.findings);
        store
    }
}

impl From<FindingStore> for StoreRepr {
    fn from(store: FindingStore) -> Self {
        StoreRepr {
            target: store.target,
            findings: store.findings.into_values().collect(),
        }
    }
}

impl FindingStore {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            findings: BTreeMap::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns `true` when the finding was not present yet. Re-inserting a
    /// known key keeps the first recorded finding.
    pub fn insert(&mut self, finding: Finding) -> bool {
        let key = finding.key();
        if self.findings.contains_key(&key) {
            return false;
        }
        self.findings.insert(key, finding);
        true
    }

    /// Inserts every finding and returns how many were new.
    pub fn extend(&mut self, findings: impl IntoIterator<Item = Finding>) -> usize {
        let mut added = 0;
        for finding in findings {
            if self.insert(finding) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, key: &FindingKey) -> bool {
        self.findings.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Finding> {
        self.findings.values()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.iter().filter(|f| f.kind() == kind).count()
    }

    pub fn subdomains(&self) -> impl Iterator<Item = &str> {
        self.iter().filter_map(|f| match f {
            Finding::Subdomain { host } => Some(host.as_str()),
            _ => None,
        })
    }

    pub fn open_ports(&self) -> impl Iterator<Item = (&str, u16, Proto)> {
        self.iter().filter_map(|f| match f {
            Finding::OpenPort { host, port, proto } => Some((host.as_str(), *port, *proto)),
            _ => None,
        })
    }

    pub fn live_urls(&self) -> impl Iterator<Item = &str> {
        self.iter().filter_map(|f| match f {
            Finding::LiveHost { url, .. } => Some(url.as_str()),
            _ => None,
        })
    }
}
