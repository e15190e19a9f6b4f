use std::fs;
use std::path::{Path, PathBuf};

use crate::detection::domain::detector_error::ConfigurationError;

/// Which branch of [`load_or_build`] produced the result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// The artifact already existed and was loaded as-is.
    Loaded,
    /// The artifact was built, persisted, then loaded.
    Built,
}

/// Loads the artifact at `artifact`, building it first if it does not
/// exist yet.
///
/// `build` receives a temporary sibling path to write to; on success that
/// file is renamed over `artifact` so a half-written build is never picked
/// up by a later run. The result always comes from `load(artifact)`, so a
/// freshly built artifact behaves exactly like one found on disk.
pub fn load_or_build<T, L, B>(
    artifact: &Path,
    load: L,
    build: B,
) -> Result<(T, ArtifactOrigin), ConfigurationError>
where
    L: FnOnce(&Path) -> Result<T, ConfigurationError>,
    B: FnOnce(&Path) -> Result<(), ConfigurationError>,
{
    if artifact.is_file() {
        log::info!("Loading optimized artifact {}", artifact.display());
        return Ok((load(artifact)?, ArtifactOrigin::Loaded));
    }

    if let Some(parent) = artifact.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ConfigurationError::model_load(parent, e))?;
    }

    let staging = staging_path(artifact);
    let _ = fs::remove_file(&staging);
    log::info!(
        "Optimized artifact {} not found, building it (this can take several minutes)",
        artifact.display()
    );

    if let Err(e) = build(&staging) {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    if !staging.is_file() {
        return Err(ConfigurationError::model_load(
            artifact,
            "build step did not produce an artifact",
        ));
    }
    fs::rename(&staging, artifact).map_err(|e| {
        let _ = fs::remove_file(&staging);
        ConfigurationError::model_load(artifact, e)
    })?;
    log::info!("Optimized artifact written to {}", artifact.display());

    Ok((load(artifact)?, ArtifactOrigin::Built))
}

fn staging_path(artifact: &Path) -> PathBuf {
    let mut name = artifact
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".building");
    artifact.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn read(path: &Path) -> Result<String, ConfigurationError> {
        fs::read_to_string(path).map_err(|e| ConfigurationError::model_load(path, e))
    }

    #[test]
    fn test_existing_artifact_is_loaded_without_building() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model_optimized.onnx");
        fs::write(&artifact, "cached").unwrap();

        let (value, origin) = load_or_build(&artifact, read, |_| {
            panic!("build must not run when the artifact exists")
        })
        .unwrap();

        assert_eq!(value, "cached");
        assert_eq!(origin, ArtifactOrigin::Loaded);
    }

    #[test]
    fn test_missing_artifact_is_built_once_then_loaded() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("nested").join("model_optimized.onnx");
        let builds = Cell::new(0);
        let build = |out: &Path| {
            builds.set(builds.get() + 1);
            fs::write(out, "optimized").map_err(|e| ConfigurationError::model_load(out, e))
        };

        let (first, origin) = load_or_build(&artifact, read, build).unwrap();
        assert_eq!(origin, ArtifactOrigin::Built);
        assert!(artifact.is_file());

        let (second, origin) = load_or_build(&artifact, read, build).unwrap();
        assert_eq!(origin, ArtifactOrigin::Loaded);
        assert_eq!(first, second);
        assert_eq!(builds.get(), 1);
    }

    #[test]
    fn test_failed_build_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model_optimized.onnx");

        let result = load_or_build(&artifact, read, |out: &Path| {
            fs::write(out, "partial").unwrap();
            Err(ConfigurationError::BaseModel {
                name: "model".into(),
                message: "download failed".into(),
            })
        });

        assert!(matches!(result, Err(ConfigurationError::BaseModel { .. })));
        assert!(!artifact.exists());
        assert!(!staging_path(&artifact).exists());
    }

    #[test]
    fn test_build_that_writes_nothing_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("model_optimized.onnx");
        let result = load_or_build(&artifact, read, |_| Ok(()));
        assert!(matches!(result, Err(ConfigurationError::ModelLoad { .. })));
    }

    #[test]
    fn test_staging_path_is_a_sibling() {
        let staging = staging_path(Path::new("/models/ssd_optimized.onnx"));
        assert_eq!(staging, Path::new("/models/ssd_optimized.onnx.building"));
    }
}
