use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::stage::RAW_DIR;
use crate::core::state::RunContext;
use crate::plugins::types::{web_roots, Invocation, ParsedOutput, ToolAdapter, ToolSettings};
use crate::utils::fs::file_token;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Stage whose raw directory receives arjun's JSON files.
const STAGE_DIR: &str = "param_discovery";

/// HTTP parameter discovery. arjun only writes results to a file.
/// Hidden query parameter discovery with arjun, one run per web root.
#[derive(Clone)]
pub struct ArjunParams {
    pub settings: ToolSettings,
}

#[derive(Deserialize)]
struct ArjunEntry {
    #[serde(default)]
    params: Vec<String>,
}

#[async_trait]
impl ToolAdapter for ArjunParams {
    fn name(&self) -> &'static str {
        "arjun"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        let out_dir = ctx.target.workspace_path.join(RAW_DIR).join(STAGE_DIR);
        web_roots(ctx)
            .into_iter()
            .map(|url| {
                let out_file = out_dir.join(format!("arjun_{}.json", file_token(&url)));
                let args = self.settings.args(vec![
                    "-u".to_string(),
                    url.clone(),
                    "--stable".to_string(),
                    "-oJ".to_string(),
                    out_file.to_string_lossy().into_owned(),
                ])?;
                Ok(Invocation::new(url, args).with_output_file(out_file))
            })
            .collect()
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        if raw.iter().all(u8::is_ascii_whitespace) {
            return ParsedOutput::default();
        }
        match serde_json::from_slice::<BTreeMap<String, ArjunEntry>>(raw) {
            Ok(entries) => ParsedOutput {
                findings: entries
                    .into_iter()
                    .flat_map(|(url, entry)| {
                        entry
                            .params
                            .into_iter()
                            .map(move |name| Finding::Parameter { url: url.clone(), name })
                    })
                    .collect(),
                skipped: 0,
            },
            Err(e) => {
                tracing::debug!("arjun output is not a result object: {}", e);
                ParsedOutput {
                    findings: Vec::new(),
                    skipped: 1,
                }
            }
        }
    }
}
