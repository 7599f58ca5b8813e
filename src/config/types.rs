use crate::core::errors::AdapterError;
use crate::core::models::Profile;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub output: OutputConfig,
    pub concurrency: ConcurrencyConfig,
    pub timeouts: TimeoutConfig,
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Parent directory of every target workspace.
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./autoscope-results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Concurrent invocations within one stage.
    pub workers: usize,
    /// Hosts per stdin batch for tools that read host lists.
    pub batch_size: usize,
    /// How long in-flight invocations may keep running after Ctrl-C.
    pub shutdown_grace_secs: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            batch_size: 50,
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub fast_secs: u64,
    pub deep_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fast_secs: 60,
            deep_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn for_profile(&self, profile: Profile) -> Duration {
        Duration::from_secs(match profile {
            Profile::Fast => self.fast_secs,
            Profile::Deep => self.deep_secs,
        })
    }
}

/// Settings every tool section shares.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable override; the tool's usual name when unset.
    pub command: Option<String>,
    /// Appended to the generated arguments, split like a shell would.
    pub extra_args: String,
    pub timeout_secs: Option<u64>,
    pub enabled: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: None,
            extra_args: String::new(),
            timeout_secs: None,
            enabled: true,
        }
    }
}

impl ToolConfig {
    pub fn executable(&self, default: &str) -> String {
        self.command.clone().unwrap_or_else(|| default.to_string())
    }

    pub fn extra_args(&self) -> Result<Vec<String>, AdapterError> {
        shell_words::split(&self.extra_args)
            .map_err(|e| AdapterError::InvalidConfig(format!("extra_args {:?}: {}", self.extra_args, e)))
    }

    pub fn timeout(&self, profile: Profile, defaults: &TimeoutConfig) -> Duration {
        self.timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| defaults.for_profile(profile))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub subfinder: ToolConfig,
    pub naabu: NaabuConfig,
    pub nmap: ToolConfig,
    pub httpx: ToolConfig,
    pub curl: ToolConfig,
    pub ffuf: FfufConfig,
    pub arjun: ToolConfig,
    pub gowitness: ToolConfig,
}

impl ToolsConfig {
    pub fn sections(&self) -> [(&'static str, &ToolConfig); 8] {
        [
            ("subfinder", &self.subfinder),
            ("naabu", &self.naabu.tool),
            ("nmap", &self.nmap),
            ("httpx", &self.httpx),
            ("curl", &self.curl),
            ("ffuf", &self.ffuf.tool),
            ("arjun", &self.arjun),
            ("gowitness", &self.gowitness),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NaabuConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,
    pub fast_ports: String,
    pub deep_ports: String,
}

impl Default for NaabuConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            fast_ports: "1-1000".to_string(),
            deep_ports: "1-65535".to_string(),
        }
    }
}

impl NaabuConfig {
    pub fn ports_for(&self, profile: Profile) -> &str {
        match profile {
            Profile::Fast => &self.fast_ports,
            Profile::Deep => &self.deep_ports,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FfufConfig {
    #[serde(flatten)]
    pub tool: ToolConfig,
    pub wordlist: PathBuf,
    pub match_codes: Vec<u16>,
}

impl Default for FfufConfig {
    fn default() -> Self {
        Self {
            tool: ToolConfig::default(),
            wordlist: PathBuf::from("/usr/share/seclists/Discovery/Web-Content/common.txt"),
            match_codes: vec![200, 301],
        }
    }
}

impl FfufConfig {
    pub fn match_codes_arg(&self) -> String {
        self.match_codes
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}
