use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::models::Proto;
use crate::core::state::RunContext;
use crate::plugins::types::{
    batches, parse_lines, scan_hosts, string_args, Invocation, ParsedOutput, ToolAdapter, ToolSettings,
};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Connect scan confirming naabu's results in the deep profile.
/// Full TCP connect scan with nmap, deep profile only.
#[derive(Clone)]
pub struct NmapPortScan {
    pub settings: ToolSettings,
    pub ports: String,
}

fn host_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^Host:\s+(\S+)\s+\(([^)]*)\)").expect("host regex is valid"))
}

fn port_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)/open/(tcp|udp)").expect("port regex is valid"))
}

#[async_trait]
impl ToolAdapter for NmapPortScan {
    fn name(&self) -> &'static str {
        "nmap"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        let args = self
            .settings
            .args(string_args(&["-sT", "-Pn", "--open", "-p", self.ports.as_str(), "-oG", "-", "-iL", "-"]))?;
        Ok(batches(&scan_hosts(ctx), self.settings.batch_size)
            .into_iter()
            .enumerate()
            .map(|(i, hosts)| Invocation::new(format!("batch-{}", i + 1), args.clone()).with_stdin(hosts))
            .collect())
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            if line.starts_with('#') {
                return Some(Vec::new());
            }
            let caps = host_re().captures(line)?;
            let host = match caps.get(2).map(|m| m.as_str()) {
                Some(name) if !name.is_empty() => name,
                _ => caps.get(1)?.as_str(),
            }
            .to_ascii_lowercase();

            Some(
                port_re()
                    .captures_iter(line)
                    .filter_map(|c| {
                        let port = c[1].parse::<u16>().ok()?;
                        let proto = if &c[2] == "udp" { Proto::Udp } else { Proto::Tcp };
                        Some(Finding::OpenPort { host: host.clone(), port, proto })
                    })
                    .collect(),
            )
        })
    }
}
