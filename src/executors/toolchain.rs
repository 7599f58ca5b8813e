use which::which;

/// Executables that cannot be found on `PATH`. The run goes on without
/// them; the affected stages record `ExecutableNotFound`.
pub fn missing_tools(tools: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
    let mut missing = Vec::new();

    for (tool, executable) in tools {
        match which(executable) {
            Ok(path) => {
                tracing::debug!("Found {}: {:?}", tool, path);
            }
            Err(_) => {
                tracing::warn!("{} not found ({}); its stage will be degraded or fail", tool, executable);
                missing.push((*tool, executable.clone()));
            }
        }
    }

    if missing.is_empty() {
        tracing::info!("All required tools found");
    }
    missing
}
