use crate::config::types::ToolConfig;
use crate::config::GlobalConfig;
use crate::core::models::Profile;
use crate::core::stage::StageDefinition;
use crate::plugins::arjun::ArjunParams;
use crate::plugins::ffuf::FfufDirScan;
use crate::plugins::gowitness::GowitnessShots;
use crate::plugins::httpx_probe::HttpxProbe;
use crate::plugins::js_discovery::JsEndpointDiscovery;
use crate::plugins::portscan_naabu::NaabuPortScan;
use crate::plugins::portscan_nmap::NmapPortScan;
use crate::plugins::subfinder::SubfinderEnum;
use crate::plugins::types::{ToolAdapter, ToolSettings};
use std::sync::Arc;

pub const SUBDOMAINS: &str = "subdomains";
pub const PORTS: &str = "ports";
pub const HTTP_PROBE: &str = "http_probe";
pub const JS_DISCOVERY: &str = "js_discovery";
pub const DIR_BRUTEFORCE: &str = "dir_bruteforce";
pub const PARAM_DISCOVERY: &str = "param_discovery";
pub const SCREENSHOTS: &str = "screenshots";

pub const STAGE_NAMES: &[&str] = &[
    SUBDOMAINS,
    PORTS,
    HTTP_PROBE,
    JS_DISCOVERY,
    DIR_BRUTEFORCE,
    PARAM_DISCOVERY,
    SCREENSHOTS,
];

const BOTH: &[Profile] = &[Profile::Fast, Profile::Deep];
const DEEP: &[Profile] = &[Profile::Deep];

/// Stage layout for `profile`, with adapters configured from `config`.
/// Tools disabled in the configuration are left out; a stage left without
/// adapters is disabled.
pub fn build_pipeline(config: &GlobalConfig, profile: Profile) -> Vec<StageDefinition> {
    let tools = &config.tools;
    let settings = |tool: &ToolConfig, exe: &str| ToolSettings::resolve(tool, exe, config, profile);

    let mut port_scanners: Vec<Option<Arc<dyn ToolAdapter>>> = vec![tools.naabu.tool.enabled.then(|| {
        Arc::new(NaabuPortScan {
            settings: settings(&tools.naabu.tool, "naabu"),
            ports: tools.naabu.ports_for(profile).to_string(),
        }) as Arc<dyn ToolAdapter>
    })];
    if profile == Profile::Deep {
        port_scanners.push(tools.nmap.enabled.then(|| {
            Arc::new(NmapPortScan {
                settings: settings(&tools.nmap, "nmap"),
                ports: tools.naabu.ports_for(profile).to_string(),
            }) as Arc<dyn ToolAdapter>
        }));
    }

    vec![
        stage(
            SUBDOMAINS,
            &[],
            BOTH,
            vec![tools.subfinder.enabled.then(|| {
                Arc::new(SubfinderEnum {
                    settings: settings(&tools.subfinder, "subfinder"),
                    all_sources: profile == Profile::Deep,
                }) as Arc<dyn ToolAdapter>
            })],
        ),
        stage(PORTS, &[SUBDOMAINS], BOTH, port_scanners),
        stage(
            HTTP_PROBE,
            &[SUBDOMAINS, PORTS],
            BOTH,
            vec![tools.httpx.enabled.then(|| {
                Arc::new(HttpxProbe {
                    settings: settings(&tools.httpx, "httpx"),
                }) as Arc<dyn ToolAdapter>
            })],
        ),
        stage(
            JS_DISCOVERY,
            &[HTTP_PROBE],
            DEEP,
            vec![tools.curl.enabled.then(|| {
                Arc::new(JsEndpointDiscovery {
                    settings: settings(&tools.curl, "curl"),
                }) as Arc<dyn ToolAdapter>
            })],
        ),
        stage(
            DIR_BRUTEFORCE,
            &[HTTP_PROBE],
            DEEP,
            vec![tools.ffuf.tool.enabled.then(|| {
                Arc::new(FfufDirScan {
                    settings: settings(&tools.ffuf.tool, "ffuf"),
                    wordlist: tools.ffuf.wordlist.clone(),
                    match_codes: tools.ffuf.match_codes_arg(),
                }) as Arc<dyn ToolAdapter>
            })],
        ),
        stage(
            PARAM_DISCOVERY,
            &[HTTP_PROBE],
            DEEP,
            vec![tools.arjun.enabled.then(|| {
                Arc::new(ArjunParams {
                    settings: settings(&tools.arjun, "arjun"),
                }) as Arc<dyn ToolAdapter>
            })],
        ),
        stage(
            SCREENSHOTS,
            &[HTTP_PROBE],
            DEEP,
            vec![tools.gowitness.enabled.then(|| {
                Arc::new(GowitnessShots {
                    settings: settings(&tools.gowitness, "gowitness"),
                }) as Arc<dyn ToolAdapter>
            })],
        ),
    ]
}

fn stage(
    name: &str,
    depends_on: &[&str],
    profiles: &[Profile],
    adapters: Vec<Option<Arc<dyn ToolAdapter>>>,
) -> StageDefinition {
    let adapters: Vec<Arc<dyn ToolAdapter>> = adapters.into_iter().flatten().collect();
    StageDefinition {
        name: name.to_string(),
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        profiles: profiles.to_vec(),
        enabled: !adapters.is_empty(),
        adapters,
    }
}

/// `(tool, executable)` for every adapter of the given stages.
pub fn executables<'a>(stages: impl IntoIterator<Item = &'a StageDefinition>) -> Vec<(&'static str, String)> {
    let mut seen = Vec::new();
    for stage in stages {
        for adapter in &stage.adapters {
            if !seen.iter().any(|(name, _)| *name == adapter.name()) {
                seen.push((adapter.name(), adapter.executable().to_string()));
            }
        }
    }
    seen
}

/// Logs each stage with its dependencies and adapters at info level.
pub fn log_pipeline_summary(stages: &[StageDefinition]) {
    tracing::info!("Pipeline Summary:");
    for stage in stages {
        let tools: Vec<&str> = stage.adapters.iter().map(|a| a.name()).collect();
        tracing::info!(
            "  {} (after {:?}, profiles {:?}, enabled {}): {}",
            stage.name,
            stage.depends_on,
            stage.profiles,
            stage.enabled,
            tools.join(", ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn adapter_names(stage: &StageDefinition) -> Vec<&'static str> {
        stage.adapters.iter().map(|a| a.name()).collect()
    }

    #[test]
    fn test_pipeline_declares_every_stage() {
        let stages = build_pipeline(&GlobalConfig::default(), Profile::Deep);
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, STAGE_NAMES);
        assert!(stages.iter().all(|s| s.enabled));
    }

    #[test]
    fn test_nmap_only_in_deep_profile() {
        let fast = build_pipeline(&GlobalConfig::default(), Profile::Fast);
        assert_eq!(adapter_names(&fast[1]), vec!["naabu"]);

        let deep = build_pipeline(&GlobalConfig::default(), Profile::Deep);
        assert_eq!(adapter_names(&deep[1]), vec!["naabu", "nmap"]);
    }

    #[test]
    fn test_profile_membership() {
        let stages = build_pipeline(&GlobalConfig::default(), Profile::Fast);
        let fast: Vec<&str> = stages
            .iter()
            .filter(|s| s.runs_in(Profile::Fast))
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(fast, vec![SUBDOMAINS, PORTS, HTTP_PROBE]);
    }

    #[test]
    fn test_disabled_tool_disables_stage() {
        let mut config = GlobalConfig::default();
        config.tools.gowitness.enabled = false;
        config.tools.nmap.enabled = false;
        let stages = build_pipeline(&config, Profile::Deep);

        let screenshots = stages.iter().find(|s| s.name == SCREENSHOTS).unwrap();
        assert!(!screenshots.enabled);
        assert_eq!(adapter_names(&stages[1]), vec!["naabu"]);
    }

    #[test]
    fn test_executables_are_unique() {
        let mut config = GlobalConfig::default();
        config.tools.httpx.command = Some("httpx-pd".to_string());
        let stages = build_pipeline(&config, Profile::Deep);
        let exes = executables(&stages);
        assert_eq!(exes.len(), 8);
        assert!(exes.contains(&("httpx", "httpx-pd".to_string())));
    }
}
