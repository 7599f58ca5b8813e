use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use super::types::GlobalConfig;

const CONFIG_FILE: &str = "autoscope.yaml";

const DEFAULT_CONFIG_PATHS: &[&str] = &["./autoscope.yaml", "./config/autoscope.yaml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist and parse; the default locations are
    /// tried in order and skipped when absent.
    pub fn load_with_custom_path(custom_path: Option<&Path>) -> Result<GlobalConfig> {
        if let Some(path) = custom_path {
            return Self::load_from_file(path)
                .with_context(|| format!("Failed to load config from custom path: {:?}", path));
        }

        for path in Self::candidate_paths() {
            if path.exists() {
                let config = Self::load_from_file(&path)?;
                tracing::info!("Loaded configuration from: {:?}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using default settings");
        Ok(GlobalConfig::default())
    }

    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect();
        if let Some(dirs) = ProjectDirs::from("", "", "autoscope") {
            paths.push(dirs.config_dir().join(CONFIG_FILE));
        }
        paths
    }

    fn load_from_file(path: &Path) -> Result<GlobalConfig> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: GlobalConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML config: {:?}", path))?;

        config.output.base_dir = Self::expand_path(&config.output.base_dir);
        config.tools.ffuf.wordlist = Self::expand_path(&config.tools.ffuf.wordlist);

        Self::validate_config(&config)?;
        Ok(config)
    }

    pub fn validate_config(config: &GlobalConfig) -> Result<()> {
        if config.concurrency.workers == 0 {
            anyhow::bail!("concurrency.workers must be greater than 0");
        }
        if config.concurrency.batch_size == 0 {
            anyhow::bail!("concurrency.batch_size must be greater than 0");
        }
        if config.timeouts.fast_secs == 0 || config.timeouts.deep_secs == 0 {
            anyhow::bail!("timeouts must be greater than 0");
        }

        for (name, tool) in config.tools.sections() {
            if tool.command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                anyhow::bail!("{} command cannot be empty", name);
            }
            if tool.timeout_secs == Some(0) {
                anyhow::bail!("{} timeout_secs must be greater than 0", name);
            }
            tool.extra_args()
                .with_context(|| format!("{} extra_args cannot be parsed", name))?;
        }

        let naabu = &config.tools.naabu;
        if naabu.fast_ports.trim().is_empty() || naabu.deep_ports.trim().is_empty() {
            anyhow::bail!("naabu port ranges cannot be empty");
        }
        if config.tools.ffuf.match_codes.is_empty() {
            anyhow::bail!("ffuf match_codes cannot be empty");
        }

        Ok(())
    }

    fn expand_path(path: &Path) -> PathBuf {
        if let Ok(rest) = path.strip_prefix("~") {
            if let Some(home) = directories::BaseDirs::new() {
                return home.home_dir().join(rest);
            }
        }
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_validate() {
        let config = GlobalConfig::default();
        ConfigLoader::validate_config(&config).unwrap();
        assert_eq!(config.concurrency.workers, 10);
        assert_eq!(config.tools.naabu.fast_ports, "1-1000");
        assert!(config.tools.httpx.enabled);
    }

    #[test]
    fn test_load_custom_config() {
        let temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
output:
  base_dir: /tmp/recon
concurrency:
  workers: 4
tools:
  naabu:
    deep_ports: "1-10000"
    extra_args: "-rate 500"
  ffuf:
    wordlist: /opt/words.txt
    match_codes: [200, 204, 301]
  gowitness:
    enabled: false
  httpx:
    command: httpx-pd
    timeout_secs: 30
"#;
        fs::write(&temp_file, config_content).unwrap();

        let config = ConfigLoader::load_with_custom_path(Some(temp_file.path())).unwrap();
        assert_eq!(config.output.base_dir, PathBuf::from("/tmp/recon"));
        assert_eq!(config.concurrency.workers, 4);
        assert_eq!(config.concurrency.batch_size, 50);
        assert_eq!(config.tools.naabu.deep_ports, "1-10000");
        assert_eq!(config.tools.naabu.fast_ports, "1-1000");
        assert_eq!(config.tools.naabu.tool.extra_args().unwrap(), vec!["-rate", "500"]);
        assert_eq!(config.tools.ffuf.match_codes, vec![200, 204, 301]);
        assert!(!config.tools.gowitness.enabled);
        assert_eq!(config.tools.httpx.executable("httpx"), "httpx-pd");
        assert_eq!(
            config.tools.httpx.timeout(crate::core::models::Profile::Fast, &config.timeouts),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_validation_errors() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, "concurrency:\n  workers: 0\n").unwrap();

        let result = ConfigLoader::load_with_custom_path(Some(temp_file.path()));
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("concurrency.workers must be greater than 0"));
    }

    #[test]
    fn test_missing_custom_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = ConfigLoader::load_with_custom_path(Some(&dir.path().join("nope.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_unparseable_extra_args_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(&temp_file, "tools:\n  curl:\n    extra_args: \"-H 'broken\"\n").unwrap();
        assert!(ConfigLoader::load_with_custom_path(Some(temp_file.path())).is_err());
    }
}
