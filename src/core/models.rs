use super::errors::InvalidTargetError;
use crate::utils::fs::short_digest;
use ipnet::IpNet;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Domain,
    Ip,
    Cidr,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub raw_input: String,
    pub kind: TargetKind,
    pub normalized: String,
    pub workspace_path: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proto {
    Tcp,
    Udp,
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Proto::Tcp => write!(f, "tcp"),
            Proto::Udp => write!(f, "udp"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Fast,
    Deep,
}

impl Profile {
    /// Work done under `self` also satisfies a run under `other`.
    pub fn covers(&self, other: Profile) -> bool {
        matches!((self, other), (Profile::Deep, _) | (Profile::Fast, Profile::Fast))
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Fast => write!(f, "fast"),
            Profile::Deep => write!(f, "deep"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageState {
    /// Dependents may start once a stage reaches one of these states.
    pub fn unblocks_dependents(&self) -> bool {
        matches!(self, StageState::Completed | StageState::Skipped)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

fn domain_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z](?:[a-z0-9-]{0,61}[a-z0-9])?$")
            .expect("domain regex is valid")
    })
}

/// Syntactic check for a DNS host name as emitted by enumeration tools.
pub fn is_valid_hostname(host: &str) -> bool {
    host.len() <= 253 && domain_regex().is_match(host)
}

impl Target {
    pub fn normalize(raw_input: &str, output_base: &Path) -> Result<Self, InvalidTargetError> {
        let trimmed = raw_input.trim();
        if trimmed.is_empty() {
            return Err(InvalidTargetError::Empty);
        }

        if trimmed.contains("..") || trimmed.contains('\\') || trimmed.contains('\0') {
            return Err(InvalidTargetError::PathTraversal(trimmed.to_string()));
        }

        let mut value = trimmed.to_ascii_lowercase();
        for scheme in ["http://", "https://"] {
            if let Some(rest) = value.strip_prefix(scheme) {
                value = rest.to_string();
            }
        }
        if let Some(rest) = value.strip_suffix('/') {
            value = rest.to_string();
        }

        let (kind, normalized) = if let Ok(ip) = value.parse::<IpAddr>() {
            (TargetKind::Ip, ip.to_string())
        } else if let Ok(net) = value.parse::<IpNet>() {
            (TargetKind::Cidr, net.trunc().to_string())
        } else {
            let host = value.strip_suffix('.').unwrap_or(&value);
            if !is_valid_hostname(host) {
                return Err(InvalidTargetError::Unrecognized(trimmed.to_string()));
            }
            (TargetKind::Domain, host.to_string())
        };

        let workspace_path = output_base.join(workspace_name(&normalized));

        Ok(Self {
            raw_input: raw_input.to_string(),
            kind,
            normalized,
            workspace_path,
        })
    }

    pub fn is_domain(&self) -> bool {
        self.kind == TargetKind::Domain
    }
}

/// Folder name for a normalized target: readable prefix plus a digest suffix
/// so that targets differing only in punctuation never share a workspace.
fn workspace_name(normalized: &str) -> String {
    let sanitized: String = normalized
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}_{}", sanitized, short_digest(normalized))
}
