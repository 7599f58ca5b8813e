use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::state::RunContext;
use crate::plugins::types::{
    batches, parse_lines, scan_hosts, string_args, Invocation, ParsedOutput, ToolAdapter, ToolSettings,
};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;

/// Probes hosts and open ports for live HTTP services.
#[derive(Clone)]
pub struct HttpxProbe {
    pub settings: ToolSettings,
}

#[derive(Deserialize)]
struct HttpxLine {
    url: String,
    #[serde(alias = "status-code")]
    status_code: Option<u16>,
    title: Option<String>,
    #[serde(default)]
    tech: Vec<String>,
}

impl HttpxProbe {
    /// Bare hosts plus `host:port` for every open port found so far.
    fn probe_inputs(ctx: &RunContext) -> Vec<String> {
        let mut inputs: BTreeSet<String> = scan_hosts(ctx).into_iter().collect();
        inputs.extend(ctx.store.open_ports().map(|(host, port, _)| format!("{}:{}", host, port)));
        inputs.into_iter().collect()
    }
}

#[async_trait]
impl ToolAdapter for HttpxProbe {
    fn name(&self) -> &'static str {
        "httpx"
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
            .args(string_args(&["-json", "-silent", "-title", "-status-code", "-tech-detect"]))?;
        Ok(batches(&Self::probe_inputs(ctx), self.settings.batch_size)
            .into_iter()
            .enumerate()
            .map(|(i, hosts)| Invocation::new(format!("batch-{}", i + 1), args.clone()).with_stdin(hosts))
            .collect())
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            let parsed: HttpxLine = serde_json::from_str(line).ok()?;
            if parsed.url.is_empty() {
                return None;
            }
            Some(vec![Finding::LiveHost {
                url: parsed.url,
                status_code: parsed.status_code,
                title: parsed.title.filter(|t| !t.trim().is_empty()),
                tech: parsed.tech,
            }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::core::models::{Profile, Proto, Target};
    use pretty_assertions::assert_eq;

    fn adapter() -> HttpxProbe {
        let config = GlobalConfig::default();
        HttpxProbe {
            settings: ToolSettings::resolve(&config.tools.httpx, "httpx", &config, Profile::Fast),
        }
    }

    #[test]
    fn test_parses_json_lines() {
        let raw = br#"{"timestamp":"2024-01-01T00:00:00Z","url":"https://www.example.com","status_code":200,"title":"Example Domain","tech":["Nginx","HSTS"],"host":"93.184.216.34"}
{"url":"http://api.example.com:8080","status-code":301,"title":""}
{"status_code":200}
"#;
        let parsed = adapter().parse_output(raw);
        assert_eq!(
            parsed.findings,
            vec![
                Finding::LiveHost {
                    url: "https://www.example.com".into(),
                    status_code: Some(200),
                    title: Some("Example Domain".into()),
                    tech: vec!["Nginx".into(), "HSTS".into()],
                },
                Finding::LiveHost {
                    url: "http://api.example.com:8080".into(),
                    status_code: Some(301),
                    title: None,
                    tech: vec![],
                },
            ]
        );
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_probes_hosts_and_open_ports() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::fresh(Target::normalize("example.com", dir.path()).unwrap());
        ctx.store.insert(Finding::Subdomain { host: "www.example.com".into() });
        ctx.store.insert(Finding::OpenPort { host: "www.example.com".into(), port: 8443, proto: Proto::Tcp });

        let plan = adapter().plan(&ctx).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan[0].stdin.as_deref(),
            Some("example.com\nwww.example.com\nwww.example.com:8443\n")
        );
    }
}
