use crate::core::errors::OrchestratorError;
use crate::core::models::Target;
use crate::core::stage::RAW_DIR;
use crate::plugins::gowitness::SCREENSHOT_DIR;
use std::fs;
use std::path::Path;

/// Creates the workspace tree of `target` and checks it accepts writes.
pub fn prepare_workspace(target: &Target) -> Result<(), OrchestratorError> {
    let root = &target.workspace_path;
    let unwritable = |source| OrchestratorError::WorkspaceUnwritable {
        path: root.clone(),
        source,
    };

    for dir in [root.clone(), root.join(RAW_DIR), root.join(SCREENSHOT_DIR)] {
        fs::create_dir_all(&dir).map_err(unwritable)?;
    }

    verify_writable(root).map_err(unwritable)?;

    // Make the new directory entries durable.
    #[cfg(unix)]
    if let Some(parent) = root.parent() {
        let _ = fs::File::open(parent).and_then(|d| d.sync_all());
    }

    tracing::debug!("Workspace ready at {:?}", root);
    Ok(())
}

fn verify_writable(path: &Path) -> std::io::Result<()> {
    let test_file = path.join(".write_test");
    fs::write(&test_file, b"test")?;
    fs::remove_file(&test_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_workspace_tree() {
        let dir = tempfile::tempdir().unwrap();
        let target = Target::normalize("example.com", dir.path()).unwrap();
        prepare_workspace(&target).unwrap();

        assert!(target.workspace_path.join("raw").is_dir());
        assert!(target.workspace_path.join("screenshots").is_dir());
        assert!(!target.workspace_path.join(".write_test").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_base_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o500)).unwrap();

        // Root ignores permission bits.
        if fs::write(locked.join("write-check"), b"x").is_ok() {
            return;
        }

        let target = Target::normalize("example.com", &locked).unwrap();
        let err = prepare_workspace(&target).unwrap_err();
        assert!(matches!(err, OrchestratorError::WorkspaceUnwritable { .. }));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o700)).unwrap();
    }
}
