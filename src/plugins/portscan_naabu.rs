use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::models::Proto;
use crate::core::state::RunContext;
use crate::plugins::types::{
    batches, parse_lines, scan_hosts, string_args, Invocation, ParsedOutput, ToolAdapter, ToolSettings,
};
use serde_json::Value;
use std::time::Duration;

/// Fast TCP port discovery with naabu.
#[derive(Clone)]
pub struct NaabuPortScan {
    pub settings: ToolSettings,
    /// Value for `-p`, e.g. `1-1000`.
    pub ports: String,
}

#[async_trait]
impl ToolAdapter for NaabuPortScan {
    fn name(&self) -> &'static str {
        "naabu"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        let args = self.settings.args(string_args(&["-json", "-silent", "-p", self.ports.as_str()]))?;
        Ok(batches(&scan_hosts(ctx), self.settings.batch_size)
            .into_iter()
            .enumerate()
            .map(|(i, hosts)| Invocation::new(format!("batch-{}", i + 1), args.clone()).with_stdin(hosts))
            .collect())
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            let json: Value = serde_json::from_str(line).ok()?;
            let host = json
                .get("host")
                .and_then(Value::as_str)
                .filter(|h| !h.is_empty())
                .or_else(|| json.get("ip").and_then(Value::as_str))?;

            // Older releases nest the port in an object.
            let port = match json.get("port")? {
                Value::Object(inner) => inner.get("Port").and_then(Value::as_u64)?,
                other => other.as_u64()?,
            };
            let port = u16::try_from(port).ok().filter(|p| *p > 0)?;

            let proto = match json.get("protocol").and_then(Value::as_str) {
                Some("udp") => Proto::Udp,
                _ => Proto::Tcp,
            };

            Some(vec![Finding::OpenPort {
                host: host.to_ascii_lowercase(),
                port,
                proto,
            }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::core::models::{Profile, Target};
    use pretty_assertions::assert_eq;

    fn adapter(batch_size: usize) -> NaabuPortScan {
        let mut config = GlobalConfig::default();
        config.concurrency.batch_size = batch_size;
        NaabuPortScan {
            settings: ToolSettings::resolve(&config.tools.naabu.tool, "naabu", &config, Profile::Fast),
            ports: config.tools.naabu.ports_for(Profile::Fast).to_string(),
        }
    }

    #[test]
    fn test_parses_json_lines() {
        let raw = br#"{"host":"www.example.com","ip":"93.184.216.34","port":443,"protocol":"tcp","tls":false}
{"ip":"93.184.216.34","port":{"Port":80,"Protocol":0,"TLS":false}}
{"host":"www.example.com","port":70000}
not json
"#;
        let parsed = adapter(50).parse_output(raw);
        assert_eq!(
            parsed.findings,
            vec![
                Finding::OpenPort { host: "www.example.com".into(), port: 443, proto: Proto::Tcp },
                Finding::OpenPort { host: "93.184.216.34".into(), port: 80, proto: Proto::Tcp },
            ]
        );
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_plan_batches_hosts_on_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::fresh(Target::normalize("example.com", dir.path()).unwrap());
        for host in ["a.example.com", "b.example.com"] {
            ctx.store.insert(Finding::Subdomain { host: host.into() });
        }

        let plan = adapter(2).plan(&ctx).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].stdin.as_deref(), Some("example.com\na.example.com\n"));
        assert_eq!(plan[1].subject, "batch-2");
        assert_eq!(plan[0].args, vec!["-json", "-silent", "-p", "1-1000"]);
    }
}
