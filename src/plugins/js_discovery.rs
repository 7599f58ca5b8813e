use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::state::RunContext;
use crate::executors::command::execute;
use crate::plugins::types::{
    archive_output, string_args, Invocation, InvocationEnv, ParsedOutput, ToolAdapter, ToolSettings,
};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

/// Scripts followed from a single page.
const MAX_SCRIPTS_PER_PAGE: usize = 25;

/// Fetches every live URL with curl, follows the same-origin scripts it
/// references, and extracts query-bearing paths from page and scripts.
#[derive(Clone)]
pub struct JsEndpointDiscovery {
    pub settings: ToolSettings,
}

fn endpoint_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[/\w-]+\?\w+=").expect("endpoint regex is valid"))
}

fn script_src_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)<script\b[^>]*\bsrc\s*=\s*["']([^"']+)["']"#).expect("script regex is valid")
    })
}

/// Endpoints found in `body`, resolved against `source_url` the way a
/// browser resolves relative references. Matches that do not resolve are
/// dropped.
pub fn extract_endpoints(source_url: &str, body: &str) -> Vec<Finding> {
    let Ok(base) = Url::parse(source_url) else {
        tracing::debug!("Not a URL, skipping endpoint extraction: {}", source_url);
        return Vec::new();
    };

    let found: BTreeSet<String> = endpoint_re()
        .find_iter(body)
        .filter_map(|m| base.join(m.as_str()).ok())
        .map(String::from)
        .collect();

    found
        .into_iter()
        .map(|url| Finding::Endpoint {
            url,
            source: format!("js:{}", source_url),
        })
        .collect()
}

/// Absolute URLs of the `<script src>` tags in `body` that share the page's
/// origin, in document order.
pub fn script_sources(page_url: &str, body: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };

    let mut seen = BTreeSet::new();
    script_src_re()
        .captures_iter(body)
        .filter_map(|caps| base.join(caps[1].trim()).ok())
        .filter(|script| script.origin() == base.origin())
        .map(String::from)
        .filter(|script| seen.insert(script.clone()))
        .take(MAX_SCRIPTS_PER_PAGE)
        .collect()
}

fn is_script_url(url: &str) -> bool {
    Url::parse(url).is_ok_and(|u| u.path().ends_with(".js"))
}

impl JsEndpointDiscovery {
    fn fetch_args(&self, url: &str) -> Result<Vec<String>, AdapterError> {
        self.settings.args(string_args(&["-sSL", url]))
    }

    /// Body of `url`; the raw output is archived either way.
    async fn fetch(&self, url: &str, args: &[String], env: &InvocationEnv) -> Result<String, AdapterError> {
        let result = execute(self.executable(), args, None, &env.workspace, self.timeout()).await?;
        archive_output(self.name(), url, &result, env);
        let result = result.into_success()?;
        Ok(String::from_utf8_lossy(&result.stdout).into_owned())
    }
}

#[async_trait]
impl ToolAdapter for JsEndpointDiscovery {
    fn name(&self) -> &'static str {
        "curl"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        ctx.store
            .live_urls()
            .map(|url| Ok(Invocation::new(url, self.fetch_args(url)?)))
            .collect()
    }

    /// Bodies are parsed in `invoke`, where the source URL is known.
    fn parse_output(&self, _raw: &[u8]) -> ParsedOutput {
        ParsedOutput::default()
    }

    async fn invoke(&self, invocation: &Invocation, env: &InvocationEnv) -> Result<Vec<Finding>, AdapterError> {
        let page_url = &invocation.subject;
        let page = self.fetch(page_url, &invocation.args, env).await?;
        let mut findings = extract_endpoints(page_url, &page);

        if is_script_url(page_url) {
            return Ok(findings);
        }

        for script in script_sources(page_url, &page) {
            let args = self.fetch_args(&script)?;
            match self.fetch(&script, &args, env).await {
                Ok(body) => findings.extend(extract_endpoints(&script, &body)),
                Err(e) => tracing::warn!("curl could not fetch script {}: {}", script, e),
            }
        }

        tracing::debug!("{} endpoints from {}", findings.len(), page_url);
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GlobalConfig;
    use crate::core::models::{Profile, Target};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn endpoint(url: &str, source: &str) -> Finding {
        Finding::Endpoint {
            url: url.into(),
            source: source.into(),
        }
    }

    #[test]
    fn test_extracts_endpoints_from_script() {
        let body = r#"fetch("/api/search?q=" + term); const u = 'user/profile?id=' + id; fetch("/api/search?q=" + x);"#;
        let findings = extract_endpoints("https://www.example.com/app/main.js", body);
        assert_eq!(
            findings,
            vec![
                endpoint("https://www.example.com/api/search?q=", "js:https://www.example.com/app/main.js"),
                endpoint("https://www.example.com/app/user/profile?id=", "js:https://www.example.com/app/main.js"),
            ]
        );
    }

    #[rstest]
    #[case("http://api.example.com:8080", "/v1/items?id=", "http://api.example.com:8080/v1/items?id=")]
    #[case("https://www.example.com/a/b/page.html", "c/d?x=", "https://www.example.com/a/b/c/d?x=")]
    #[case("https://www.example.com/a/", "d?y=", "https://www.example.com/a/d?y=")]
    fn test_resolves_relative_references(#[case] page: &str, #[case] body: &str, #[case] expected: &str) {
        let findings = extract_endpoints(page, body);
        assert_eq!(findings, vec![endpoint(expected, &format!("js:{}", page))]);
    }

    #[test]
    fn test_unparseable_source_yields_nothing() {
        assert!(extract_endpoints("not a url", "/api?x=").is_empty());
        assert!(script_sources("::", "<script src=\"/a.js\"></script>").is_empty());
    }

    #[test]
    fn test_script_sources_stay_on_origin() {
        let page = r#"
            <script src="/static/app.js"></script>
            <SCRIPT type="module" src='vendor/chunk.js'></SCRIPT>
            <script src="https://cdn.other.net/lib.js"></script>
            <script src="/static/app.js"></script>
            <script>inline()</script>
        "#;
        assert_eq!(
            script_sources("https://www.example.com/shop/", page),
            vec![
                "https://www.example.com/static/app.js".to_string(),
                "https://www.example.com/shop/vendor/chunk.js".to_string(),
            ]
        );
    }

    #[test]
    fn test_plans_one_fetch_per_live_url() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = RunContext::fresh(Target::normalize("example.com", dir.path()).unwrap());
        for url in ["https://a.example.com", "https://b.example.com"] {
            ctx.store.insert(Finding::LiveHost { url: url.into(), status_code: Some(200), title: None, tech: vec![] });
        }
        let config = GlobalConfig::default();
        let adapter = JsEndpointDiscovery {
            settings: ToolSettings::resolve(&config.tools.curl, "curl", &config, Profile::Deep),
        };

        let plan = adapter.plan(&ctx).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].args, vec!["-sSL", "https://a.example.com"]);
        assert_eq!(plan[1].subject, "https://b.example.com");
    }

    /// Stand-in for curl that serves a page, one script and one broken script.
    #[cfg(unix)]
    const FAKE_CURL: &str = r#"#!/bin/sh
for url; do :; done
case "$url" in
  */shop/static/app.js) echo 'fetch("api/items?id=" + id); fetch("/v2/users?name=" + n)' ;;
  */missing.js) echo "not found" >&2; exit 22 ;;
  *) echo '<a href="/search?q=x"><script src="static/app.js"></script><script src="/missing.js"></script><script src="https://cdn.other.net/lib.js"></script>' ;;
esac
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_follows_scripts_referenced_by_page() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("fake-curl");
        std::fs::write(&fake, FAKE_CURL).unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut config = GlobalConfig::default();
        config.tools.curl.command = Some(fake.to_string_lossy().into_owned());
        let adapter = JsEndpointDiscovery {
            settings: ToolSettings::resolve(&config.tools.curl, "curl", &config, Profile::Deep),
        };
        let env = InvocationEnv {
            workspace: dir.path().to_path_buf(),
            raw_dir: dir.path().join("raw").join("js_discovery"),
        };

        let page = "https://www.example.com/shop/";
        let inv = Invocation::new(page, adapter.fetch_args(page).unwrap());
        let found: BTreeSet<(String, String)> = adapter
            .invoke(&inv, &env)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|f| match f {
                Finding::Endpoint { url, source } => Some((url, source)),
                _ => None,
            })
            .collect();

        let script = "js:https://www.example.com/shop/static/app.js";
        let expected: BTreeSet<(String, String)> = [
            ("https://www.example.com/search?q=", "js:https://www.example.com/shop/"),
            ("https://www.example.com/shop/static/api/items?id=", script),
            ("https://www.example.com/v2/users?name=", script),
        ]
        .into_iter()
        .map(|(u, s)| (u.to_string(), s.to_string()))
        .collect();
        assert_eq!(found, expected);

        let archived = std::fs::read_dir(&env.raw_dir).unwrap().count();
        assert_eq!(archived, 6);
    }
}
