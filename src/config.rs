use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::ValueEnum;
use directories::ProjectDirs;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Git hosting platform the wiki backend should clone from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Github,
    Gitlab,
    Bitbucket,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Github => "github",
            Platform::Gitlab => "gitlab",
            Platform::Bitbucket => "bitbucket",
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Platform::Github
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wiki-generation options chosen for one repository input.
///
/// Field names match the persisted cache format so blobs written by earlier
/// front-ends remain readable. Each field is decoded on its own: an absent,
/// `null`, `false`, `0` or `""` value takes the field default instead of
/// rejecting the whole record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoConfig {
    /// Empty means "use the session language".
    #[serde(deserialize_with = "falsy_as_default")]
    pub selected_language: String,
    /// Only an absent or `null` value falls back to `true`.
    #[serde(deserialize_with = "null_as_comprehensive")]
    pub is_comprehensive_view: bool,
    #[serde(deserialize_with = "falsy_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub model: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub is_custom_model: bool,
    #[serde(deserialize_with = "falsy_as_default")]
    pub custom_model: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub selected_platform: Platform,
    #[serde(deserialize_with = "falsy_as_default")]
    pub excluded_dirs: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub excluded_files: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub included_dirs: String,
    #[serde(deserialize_with = "falsy_as_default")]
    pub included_files: String,
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::String(text) => text.is_empty(),
        Value::Number(number) => number.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn falsy_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if is_falsy(&value) {
        return Ok(T::default());
    }
    serde_json::from_value(value).map_err(serde::de::Error::custom)
}

fn null_as_comprehensive<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            selected_language: String::new(),
            is_comprehensive_view: true,
            provider: String::new(),
            model: String::new(),
            is_custom_model: false,
            custom_model: String::new(),
            selected_platform: Platform::default(),
            excluded_dirs: String::new(),
            excluded_files: String::new(),
            included_dirs: String::new(),
            included_files: String::new(),
        }
    }
}

impl RepoConfig {
    pub fn with_language(language: impl Into<String>) -> Self {
        Self {
            selected_language: language.into(),
            ..Self::default()
        }
    }

    /// Custom model name to send, if the custom toggle is on and a name is set.
    pub fn effective_custom_model(&self) -> Option<&str> {
        (self.is_custom_model && !self.custom_model.is_empty()).then_some(self.custom_model.as_str())
    }
}

/// User configuration for the launcher itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherSettings {
    /// Origin serving both the wiki pages and the `/api` endpoints.
    #[serde(default = "LauncherSettings::default_server_url")]
    pub server_url: String,
    /// Optional override for the durable key-value blob.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
    #[serde(default = "LauncherSettings::default_language")]
    pub default_language: String,
    #[serde(default)]
    pub default_platform: Platform,
    #[serde(default = "LauncherSettings::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Program used by `--open`; falls back to the desktop opener on `PATH`.
    #[serde(default)]
    pub open_command: Option<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            server_url: Self::default_server_url(),
            storage_path: None,
            default_language: Self::default_language(),
            default_platform: Platform::default(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            open_command: None,
        }
    }
}

impl LauncherSettings {
    fn default_server_url() -> String {
        "http://localhost:3000".into()
    }

    fn default_language() -> String {
        "en".into()
    }

    fn default_request_timeout_secs() -> u64 {
        30
    }

    /// Load settings from disk, writing defaults if missing.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Unable to read config at {}", path.display()))?;
            let parsed: Self = serde_json::from_str(&raw)
                .with_context(|| format!("Malformed config at {}", path.display()))?;
            Ok(parsed)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            Ok(settings)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory {}", parent.display())
            })?;
        }
        let serialised = serde_json::to_string_pretty(self)?;
        fs::write(path, serialised)
            .with_context(|| format!("Failed to persist config to {}", path.display()))
    }

    /// Resolve the file backing durable client storage.
    pub fn resolve_storage_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.storage_path {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("storage.json"))
    }

    /// Server origin without a trailing slash.
    pub fn server_origin(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "deepwiki", "DeepWikiLauncher")
        .context("Unable to resolve platform data directory")
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(project_dirs()?.config_dir().join("config.json"))
}
