use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::layout::TemplateText;

pub const ENV_UPLOAD_DIR: &str = "POSTER_STUDIO_UPLOAD_DIR";
pub const ENV_UPLOAD_URL: &str = "POSTER_STUDIO_UPLOAD_URL";
pub const ENV_LOGO: &str = "POSTER_STUDIO_LOGO";
/// Extra font directories, read by the font index at lookup time.
pub const ENV_FONTS: &str = "POSTER_STUDIO_FONTS";

/// Deployment settings. Defaults, then a JSON file, then environment
/// variables; command-line flags are applied last by the binary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioConfig {
    pub upload_dir: PathBuf,
    pub upload_url: String,
    /// Organiser logo drawn beside the QR code.
    pub logo_path: Option<PathBuf>,
    /// Directory of `{id}.json` content records.
    pub content_dir: PathBuf,
    pub template: TemplateText,
    pub author: String,
    pub creator: String,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            upload_url: "/uploads".into(),
            logo_path: None,
            content_dir: PathBuf::from("content"),
            template: TemplateText::default(),
            author: "GEM Malgrat".into(),
            creator: "Poster Studio".into(),
        }
    }
}

impl StudioConfig {
    pub fn from_file(path: &Path) -> Result<StudioConfig, Error> {
        let data = std::fs::read(path)?;
        let config: StudioConfig = serde_json::from_slice(&data)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Optional file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<StudioConfig, Error> {
        let base = match path {
            Some(p) => StudioConfig::from_file(p)?,
            None => StudioConfig::default(),
        };
        Ok(base.with_env_from(|key| std::env::var(key).ok()))
    }

    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = set(ENV_UPLOAD_DIR) {
            self.upload_dir = PathBuf::from(dir);
        }
        if let Some(url) = set(ENV_UPLOAD_URL) {
            self.upload_url = url;
        }
        if let Some(logo) = set(ENV_LOGO) {
            self.logo_path = Some(PathBuf::from(logo));
        }
        self
    }
}
