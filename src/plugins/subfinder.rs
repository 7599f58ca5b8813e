use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::models::is_valid_hostname;
use crate::core::state::RunContext;
use crate::plugins::types::{parse_lines, string_args, Invocation, ParsedOutput, ToolAdapter, ToolSettings};
use std::time::Duration;

/// Passive subdomain enumeration. Only domain targets have subdomains.
pub struct SubfinderEnum {
    pub settings: ToolSettings,
    /// Use every passive source instead of the fast default set.
    pub all_sources: bool,
}

#[async_trait]
impl ToolAdapter for SubfinderEnum {
    fn name(&self) -> &'static str {
        "subfinder"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        if !ctx.target.is_domain() {
            return Ok(Vec::new());
        }
        let domain = &ctx.target.normalized;
        let mut args = string_args(&["-d", domain.as_str(), "-silent"]);
        if self.all_sources {
            args.push("-all".to_string());
        }
        Ok(vec![Invocation::new(domain.clone(), self.settings.args(args)?)])
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            let host = line.trim_end_matches('.').to_ascii_lowercase();
            is_valid_hostname(&host).then(|| vec![Finding::Subdomain { host }])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::core::models::{Profile, Target};
    use pretty_assertions::assert_eq;

    fn adapter(all_sources: bool) -> SubfinderEnum {
        let config = GlobalConfig::default();
        SubfinderEnum {
            settings: ToolSettings::resolve(&config.tools.subfinder, "subfinder", &config, Profile::Fast),
            all_sources,
        }
    }

    #[test]
    fn test_parses_hostnames() {
        let raw = b"www.example.com\nAPI.Example.com.\n[INF] Loading provider config\n\n";
        let parsed = adapter(false).parse_output(raw);
        assert_eq!(
            parsed.findings,
            vec![
                Finding::Subdomain { host: "www.example.com".into() },
                Finding::Subdomain { host: "api.example.com".into() },
            ]
        );
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_plan_depends_on_target_kind() {
        let dir = tempfile::tempdir().unwrap();
        let domain = RunContext::fresh(Target::normalize("example.com", dir.path()).unwrap());
        let plan = adapter(true).plan(&domain).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].args, vec!["-d", "example.com", "-silent", "-all"]);

        let ip = RunContext::fresh(Target::normalize("10.0.0.1", dir.path()).unwrap());
        assert!(adapter(false).plan(&ip).unwrap().is_empty());
    }
}
