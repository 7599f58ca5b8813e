use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::stage::RAW_DIR;
use crate::core::state::RunContext;
use crate::plugins::types::{batches, parse_lines, Invocation, ParsedOutput, ToolAdapter, ToolSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const SCREENSHOT_DIR: &str = "screenshots";
const STAGE_DIR: &str = "screenshots";

/// Screenshots of live URLs, taken in batches by gowitness.
#[derive(Clone)]
pub struct GowitnessShots {
    pub settings: ToolSettings,
}

#[derive(Deserialize)]
struct GowitnessLine {
    url: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    failed: bool,
}

#[async_trait]
impl ToolAdapter for GowitnessShots {
    fn name(&self) -> &'static str {
        "gowitness"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        let workspace = &ctx.target.workspace_path;
        let shots = workspace.join(SCREENSHOT_DIR);
        let urls: Vec<String> = ctx.store.live_urls().map(str::to_string).collect();

        batches(&urls, self.settings.batch_size)
            .into_iter()
            .enumerate()
            .map(|(i, payload)| {
                let subject = format!("batch-{}", i + 1);
                let jsonl = workspace
                    .join(RAW_DIR)
                    .join(STAGE_DIR)
                    .join(format!("gowitness_{}.jsonl", subject));
                let args = self.settings.args(vec![
                    "scan".to_string(),
                    "file".to_string(),
                    "-f".to_string(),
                    "-".to_string(),
                    "-s".to_string(),
                    shots.to_string_lossy().into_owned(),
                    "--write-jsonl".to_string(),
                    "--write-jsonl-file".to_string(),
                    jsonl.to_string_lossy().into_owned(),
                ])?;
                Ok(Invocation::new(subject, args)
                    .with_stdin(payload)
                    .with_output_file(jsonl))
            })
            .collect()
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            let shot: GowitnessLine = serde_json::from_str(line).ok()?;
            if shot.failed || shot.file_name.is_empty() {
                return Some(Vec::new());
            }
            Some(vec![Finding::Screenshot {
                url: shot.url,
                file_path: PathBuf::from(SCREENSHOT_DIR).join(shot.file_name),
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

    fn adapter() -> GowitnessShots {
        let config = GlobalConfig::default();
        GowitnessShots {
            settings: ToolSettings::resolve(&config.tools.gowitness, "gowitness", &config, Profile::Deep),
        }
    }

    #[test]
    fn test_parses_jsonl_results() {
        let raw = br#"{"id":1,"url":"https://www.example.com","response_code":200,"file_name":"https---www.example.com.jpeg","failed":false}
{"id":2,"url":"https://down.example.com","file_name":"","failed":true}
"#;
        let parsed = adapter().parse_output(raw);
        assert_eq!(
            parsed.findings,
            vec![Finding::Screenshot {
                url: "https://www.example.com".into(),
                file_path: PathBuf::from("screenshots/https---www.example.com.jpeg"),
            }]
        );
        assert_eq!(parsed.skipped, 0);
    }

    #[test]
    fn test_no_live_hosts_means_no_plan() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RunContext::fresh(Target::normalize("example.com", dir.path()).unwrap());
        assert!(adapter().plan(&ctx).unwrap().is_empty());
    }
}
