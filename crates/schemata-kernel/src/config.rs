//! Engine configuration.
//!
//! Loaded from a TOML file (by default `<config dir>/schemata/config.toml`).
//! Every key is optional; missing keys take the defaults below, and a
//! `[file_types.<Type>]` table only overrides the fields it names.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use strum::IntoEnumIterator;

use schemata_client::{Credentials, QueueOptions};
use schemata_types::SchemaType;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine the user config directory")]
    NoConfigDir,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Presentation and filtering settings for one schema type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTypeConfig {
    /// Suffix appended to the schema name, including the leading dot.
    pub extension: String,
    /// Whether items of this type appear in the filesystem at all.
    pub enabled: bool,
    /// Label for the type's folder in the tree.
    pub name: String,
}

impl FileTypeConfig {
    fn new(extension: &str, enabled: bool, name: &str) -> Self {
        Self {
            extension: extension.to_string(),
            enabled,
            name: name.to_string(),
        }
    }

    /// Built-in settings for a type.
    pub fn default_for(ty: SchemaType) -> Self {
        match ty {
            SchemaType::ClientUnit => Self::new(".js", true, "Client modules"),
            SchemaType::SourceCode => Self::new(".cs", true, "Source code"),
            SchemaType::SqlScript => Self::new(".sql", true, "SQL scripts"),
            SchemaType::ProcessUserTask => Self::new(".usertask.cs", true, "User tasks"),
            SchemaType::Entity => Self::new(".json", false, "Objects"),
            SchemaType::Data => Self::new(".data.json", false, "Data"),
            SchemaType::Process => Self::new(".process.json", false, "Business processes"),
            SchemaType::Case => Self::new(".case.json", false, "Cases"),
            SchemaType::Dll => Self::new(".dll", false, "Libraries"),
            SchemaType::Unknown => Self::new("", false, "Other"),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileTypeOverride {
    extension: Option<String>,
    enabled: Option<bool>,
    name: Option<String>,
}

fn default_file_types() -> BTreeMap<String, FileTypeConfig> {
    SchemaType::iter()
        .filter(|ty| *ty != SchemaType::Unknown)
        .map(|ty| (ty.to_string(), FileTypeConfig::default_for(ty)))
        .collect()
}

/// Overlay user tables onto the built-in defaults, field by field.
fn merge_file_types<'de, D>(deserializer: D) -> Result<BTreeMap<String, FileTypeConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = BTreeMap::<String, FileTypeOverride>::deserialize(deserializer)?;
    let mut merged = default_file_types();
    for (key, o) in overrides {
        let base = key
            .parse::<SchemaType>()
            .map(FileTypeConfig::default_for)
            .unwrap_or_else(|_| FileTypeConfig::default_for(SchemaType::Unknown));
        let entry = merged.entry(key).or_insert(base);
        if let Some(extension) = o.extension {
            entry.extension = extension;
        }
        if let Some(enabled) = o.enabled {
            entry.enabled = enabled;
        }
        if let Some(name) = o.name {
            entry.name = name;
        }
    }
    Ok(merged)
}

/// Transport retry policy handed to the request queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_ms: 1000,
        }
    }
}

/// Saved login for one remote host.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub url: String,
    pub login: String,
    pub password: String,
}

impl ConnectionInfo {
    pub fn new(url: impl Into<String>, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            login: login.into(),
            password: password.into(),
        }
    }

    /// Host part of the url, without scheme, credentials, port or path.
    ///
    /// This is the session root of the virtual filesystem.
    pub fn host_name(&self) -> String {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        let host = authority.rsplit('@').next().unwrap_or_default();
        let host = match host.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h,
            _ => host,
        };
        host.to_ascii_lowercase()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.login, &self.password)
    }
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("url", &self.url)
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemataConfig {
    /// Re-verify cached bodies against the remote once they go stale.
    pub careful_mode: bool,
    pub staleness_window_secs: u64,
    /// Coalescing window for change notifications.
    pub debounce_ms: u64,
    /// Wait before retrying a read whose reconnect prompt went unanswered.
    pub reconnect_backoff_secs: u64,
    pub prompt_timeout_secs: u64,
    pub max_reconnect_attempts: u32,
    /// Overrides where raw content files live (`<cache_base>/data` otherwise).
    pub cache_path: Option<PathBuf>,
    pub cache_base: PathBuf,
    pub retry: RetryPolicy,
    #[serde(deserialize_with = "merge_file_types")]
    pub file_types: BTreeMap<String, FileTypeConfig>,
    pub connections: Vec<ConnectionInfo>,
}

impl Default for SchemataConfig {
    fn default() -> Self {
        Self {
            careful_mode: false,
            staleness_window_secs: 900,
            debounce_ms: 5,
            reconnect_backoff_secs: 5,
            prompt_timeout_secs: 30,
            max_reconnect_attempts: 3,
            cache_path: None,
            cache_base: std::env::temp_dir().join("bpmcode"),
            retry: RetryPolicy::default(),
            file_types: default_file_types(),
            connections: Vec::new(),
        }
    }
}

impl SchemataConfig {
    /// `<config dir>/schemata/config.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(dir.join("schemata").join("config.toml"))
    }

    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// Load `path`, or return defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    // ── Per-type lookups ─────────────────────────────────────────────────

    pub fn file_type(&self, ty: SchemaType) -> FileTypeConfig {
        self.file_types
            .get(&ty.to_string())
            .cloned()
            .unwrap_or_else(|| FileTypeConfig::default_for(ty))
    }

    pub fn extension(&self, ty: SchemaType) -> String {
        self.file_type(ty).extension
    }

    pub fn is_enabled(&self, ty: SchemaType) -> bool {
        ty != SchemaType::Unknown && self.file_type(ty).enabled
    }

    pub fn label(&self, ty: SchemaType) -> String {
        self.file_type(ty).name
    }

    // ── Durations and paths ──────────────────────────────────────────────

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }

    /// Directory holding metadata documents.
    pub fn metadata_dir(&self) -> PathBuf {
        self.cache_base.join("cache")
    }

    /// Directory holding raw content files.
    pub fn data_dir(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| self.cache_base.join("data"))
    }

    /// Saved connection whose url resolves to `host`.
    pub fn connection_for(&self, host: &str) -> Option<&ConnectionInfo> {
        self.connections.iter().find(|c| c.host_name() == host)
    }

    pub fn queue_options(&self, credentials: Option<Credentials>) -> QueueOptions {
        QueueOptions {
            retry_attempts: self.retry.attempts.max(1),
            retry_delay: Duration::from_millis(self.retry.delay_ms),
            credentials,
        }
    }
}
