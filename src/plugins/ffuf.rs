use async_trait::async_trait;
use crate::core::errors::AdapterError;
use crate::core::findings::Finding;
use crate::core::state::RunContext;
use crate::plugins::types::{parse_lines, web_roots, Invocation, ParsedOutput, ToolAdapter, ToolSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Directory brute-forcing against every live web root.
/// Directory brute force with ffuf against each web root.
#[derive(Clone)]
pub struct FfufDirScan {
    pub settings: ToolSettings,
    pub wordlist: PathBuf,
    /// Comma-separated status codes for `-mc`.
    pub match_codes: String,
}

#[derive(Deserialize)]
struct FfufResult {
    url: String,
    status: u16,
}

#[async_trait]
impl ToolAdapter for FfufDirScan {
    fn name(&self) -> &'static str {
        "ffuf"
    }

    fn executable(&self) -> &str {
        &self.settings.executable
    }

    fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    fn plan(&self, ctx: &RunContext) -> Result<Vec<Invocation>, AdapterError> {
        if !self.wordlist.is_file() {
            return Err(AdapterError::InvalidConfig(format!(
                "wordlist not found: {}",
                self.wordlist.display()
            )));
        }
        let wordlist = self.wordlist.to_string_lossy().into_owned();

        web_roots(ctx)
            .into_iter()
            .map(|root| {
                let args = self.settings.args(vec![
                    "-u".to_string(),
                    format!("{}/FUZZ", root),
                    "-w".to_string(),
                    wordlist.clone(),
                    "-mc".to_string(),
                    self.match_codes.clone(),
                    "-json".to_string(),
                    "-s".to_string(),
                    "-noninteractive".to_string(),
                ])?;
                Ok(Invocation::new(root, args))
            })
            .collect()
    }

    fn parse_output(&self, raw: &[u8]) -> ParsedOutput {
        parse_lines(raw, |line| {
            let result: FfufResult = serde_json::from_str(line).ok()?;
            Some(vec![Finding::Endpoint {
                url: result.url,
                source: format!("ffuf:{}", result.status),
            }])
        })
    }
}
