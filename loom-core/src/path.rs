//! Artifact locations
//!
//! Every artifact lives at `<pipeline-root>/<step-name>/<artifact-name>`.
//! Locations are symbolic strings (for example `gs:///vertex-ai/pipeline_root/train/model`);
//! a [`LocalMount`] turns them into filesystem paths by replacing the symbolic
//! prefix with a local directory.

use std::path::{Path, PathBuf};

/// Symbolic prefix replaced by the local mount directory
pub const DEFAULT_SYMBOLIC_PREFIX: &str = "gs://";

/// Pipeline root used when nothing else is configured
pub const DEFAULT_PIPELINE_ROOT: &str = "gs:///vertex-ai/pipeline_root";

/// File name of the per-step result file
pub const RESULT_FILE_NAME: &str = "execution_output.json";

/// Builds the canonical location of an artifact
///
/// Pure function: identical inputs always produce the identical location.
/// A single trailing `/` on the root is ignored.
pub fn path_for(pipeline_root: &str, step_name: &str, artifact_name: &str) -> String {
    format!("{}/{}", step_location(pipeline_root, step_name), artifact_name)
}

/// Location of the directory holding all artifacts of a step
pub fn step_location(pipeline_root: &str, step_name: &str) -> String {
    let root = pipeline_root.strip_suffix('/').unwrap_or(pipeline_root);
    format!("{}/{}", root, step_name)
}

/// Location of the result file written after a step completes
pub fn result_file_location(symbolic_prefix: &str, step_name: &str) -> String {
    format!("{}{}/{}", symbolic_prefix, step_name, RESULT_FILE_NAME)
}

/// Whether step directories under `pipeline_root` coincide with result file directories
///
/// Result files live in `<prefix><step>/`, so a root that is the bare
/// symbolic prefix would put artifacts in the same directories.
pub fn root_overlaps_result_files(pipeline_root: &str, symbolic_prefix: &str) -> bool {
    pipeline_root
        .strip_prefix(symbolic_prefix)
        .is_some_and(|rest| rest.trim_matches('/').is_empty())
}

/// Translates symbolic locations into filesystem paths
///
/// Outside a container the local directory is the developer's working
/// directory (e.g. `./gcs`); inside a container it is the mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMount {
    prefix: String,
    local_dir: PathBuf,
}

impl LocalMount {
    pub fn new(prefix: impl Into<String>, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            local_dir: local_dir.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn local_dir(&self) -> &Path {
        &self.local_dir
    }

    /// Same prefix, different directory
    pub fn rebase(&self, local_dir: impl Into<PathBuf>) -> Self {
        Self::new(self.prefix.clone(), local_dir)
    }

    /// Translates a location into a filesystem path
    ///
    /// Locations that do not start with the symbolic prefix are already
    /// paths and are returned as-is.
    pub fn localize(&self, location: &str) -> PathBuf {
        match location.strip_prefix(self.prefix.as_str()) {
            Some(rest) => {
                let rest = rest.trim_start_matches('/');
                if rest.is_empty() {
                    self.local_dir.clone()
                } else {
                    self.local_dir.join(rest)
                }
            }
            None => PathBuf::from(location),
        }
    }
}

impl Default for LocalMount {
    fn default() -> Self {
        Self::new(DEFAULT_SYMBOLIC_PREFIX, "./gcs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_for_is_deterministic() {
        let a = path_for("root", "A", "data");
        let b = path_for("root", "A", "data");
        assert_eq!(a, "root/A/data");
        assert_eq!(a, b);
    }

    #[test]
    fn test_path_for_ignores_trailing_slash() {
        assert_eq!(path_for("root/", "A", "data"), "root/A/data");
        assert_eq!(path_for("gs://", "A", "data"), "gs://A/data");
        assert_eq!(
            path_for(DEFAULT_PIPELINE_ROOT, "train", "model"),
            "gs:///vertex-ai/pipeline_root/train/model"
        );
    }

    #[test]
    fn test_result_file_location() {
        assert_eq!(
            result_file_location("gs://", "train"),
            "gs://train/execution_output.json"
        );
    }

    #[test]
    fn test_root_overlaps_result_files() {
        assert!(root_overlaps_result_files("gs://", "gs://"));
        assert!(root_overlaps_result_files("gs:///", "gs://"));
        assert!(!root_overlaps_result_files("gs://root", "gs://"));
        assert!(!root_overlaps_result_files(DEFAULT_PIPELINE_ROOT, DEFAULT_SYMBOLIC_PREFIX));
        assert!(!root_overlaps_result_files("/tmp/root", "gs://"));
    }

    #[test]
    fn test_localize_replaces_prefix() {
        let mount = LocalMount::new("gs://", "./gcs");
        assert_eq!(
            mount.localize("gs:///vertex-ai/pipeline_root/train/model"),
            PathBuf::from("./gcs/vertex-ai/pipeline_root/train/model")
        );
        assert_eq!(
            mount.localize("gs://train/execution_output.json"),
            PathBuf::from("./gcs/train/execution_output.json")
        );
        assert_eq!(mount.localize("gs://"), PathBuf::from("./gcs"));
    }

    #[test]
    fn test_localize_plain_path_passthrough() {
        let mount = LocalMount::default();
        assert_eq!(
            mount.localize("/data/train.csv"),
            PathBuf::from("/data/train.csv")
        );
    }

    #[test]
    fn test_rebase_keeps_prefix() {
        let mount = LocalMount::new("gs://", "./gcs").rebase("/gcs");
        assert_eq!(mount.prefix(), "gs://");
        assert_eq!(mount.localize("gs://a/b"), PathBuf::from("/gcs/a/b"));
    }
}
