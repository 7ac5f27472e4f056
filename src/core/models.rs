use super::profile::ProfileContent;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// Payload of a "project" profile: which folder it packs, where the archive goes and
// which patterns are left out. Unknown or missing fields fall back to defaults so
// older documents keep loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub root_folder: Option<PathBuf>,
    pub archive_path: Option<PathBuf>,
    pub exclude_patterns: Vec<String>,
}

impl ProjectSettings {
    /// Creates settings for the given root folder with no archive and no excludes.
    pub fn new(root_folder: PathBuf) -> Self {
        ProjectSettings {
            root_folder: Some(root_folder),
            archive_path: None,
            exclude_patterns: Vec::new(),
        }
    }
}

impl ProfileContent for ProjectSettings {
    const KIND: &'static str = "project";
}
