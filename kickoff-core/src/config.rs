use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{PluginId, PluginKind};
use crate::plugin::{PlatformStep, PositionOptions};
use crate::qos::QosPolicy;
use crate::selector::ErrorPolicy;
use crate::view::AppInfo;

pub const CONFIG_ENV: &str = "KICKOFF_CONFIG";
const CONFIG_NAMES: [&str; 4] = ["kickoff.yaml", "kickoff.yml", ".kickoff.yaml", ".kickoff.yml"];

/// How clients are run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LaunchMode {
    /// All clients in this process, one pane each
    #[default]
    InProcess,
    /// One child process per client, respawned on exit
    Process,
}

impl std::fmt::Display for LaunchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMode::InProcess => write!(f, "in-process"),
            LaunchMode::Process => write!(f, "process"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClientsConfig {
    #[serde(default = "default_count")]
    pub count: usize,

    #[serde(default)]
    pub mode: LaunchMode,

    /// Exit a failing child so the parent respawns it
    #[serde(default = "default_true")]
    pub restart_on_error: bool,

    /// Executable started for child clients (defaults to the current one)
    #[serde(default)]
    pub program: Option<PathBuf>,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            mode: LaunchMode::default(),
            restart_on_error: true,
            program: None,
        }
    }
}

fn default_count() -> usize {
    1
}
fn default_true() -> bool {
    true
}
fn default_init_ms() -> u64 {
    800
}

/// A simulated plugin of the demo client
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PluginConfig {
    pub id: PluginId,

    /// Defaults to the kind of a well-known id
    #[serde(default)]
    pub kind: Option<PluginKind>,

    /// Time spent in `started` (per step for platform plugins)
    #[serde(default = "default_init_ms")]
    pub init_ms: u64,

    /// End in `errored` instead of completing
    #[serde(default)]
    pub fail: bool,

    /// Platform step that fails, implies `fail`
    #[serde(default)]
    pub fail_at: Option<PlatformStep>,

    /// Features reported as unavailable by the failing step
    #[serde(default)]
    pub failed_features: Vec<String>,

    #[serde(default)]
    pub position: Option<PositionOptions>,
}

impl PluginConfig {
    pub fn new(id: impl Into<PluginId>, init_ms: u64) -> Self {
        Self {
            id: id.into(),
            kind: None,
            init_ms,
            fail: false,
            fail_at: None,
            failed_features: Vec::new(),
            position: None,
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind.unwrap_or_else(|| PluginKind::from_id(&self.id))
    }

    pub fn fails(&self) -> bool {
        self.fail || self.fail_at.is_some()
    }
}

/// Simulated connection of the demo client
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Drop the connection after this long
    #[serde(default)]
    pub drop_after_ms: Option<u64>,
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LauncherConfig {
    #[serde(default)]
    pub app: AppInfo,

    #[serde(default)]
    pub clients: ClientsConfig,

    /// Screen language, picked from the locale when unset
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub qos: QosPolicy,

    #[serde(default)]
    pub error_policy: ErrorPolicy,

    #[serde(default = "default_plugins")]
    pub plugins: Vec<PluginConfig>,

    #[serde(default)]
    pub connection: ConnectionConfig,
}

fn default_plugins() -> Vec<PluginConfig> {
    vec![
        PluginConfig::new("platform", 600),
        PluginConfig::new("sync", 1500),
        PluginConfig::new("audio-buffer-loader", 2000),
    ]
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            app: AppInfo {
                name: "kickoff".into(),
                author: String::new(),
            },
            clients: ClientsConfig::default(),
            language: None,
            qos: QosPolicy::default(),
            error_policy: ErrorPolicy::default(),
            plugins: default_plugins(),
            connection: ConnectionConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("plugin '{id}' is declared more than once")]
    DuplicatePlugin { id: PluginId },
    #[error("no config file found, searched: {searched:?}")]
    NotFound { searched: Vec<PathBuf> },
}

impl LauncherConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: LauncherConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search for a config file: `KICKOFF_CONFIG` first, then the standard
    /// names in `start_dir` and its parents
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        let mut dir = Some(start_dir);
        while let Some(current) = dir {
            for name in &CONFIG_NAMES {
                let path = current.join(name);
                if path.exists() {
                    return Ok((path.clone(), Self::load(&path)?));
                }
                searched.push(path);
            }
            dir = current.parent();
        }

        Err(ConfigError::NotFound { searched })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clients.count == 0 {
            return Err(ConfigError::Invalid("clients.count must be at least 1".into()));
        }

        let mut seen = BTreeSet::new();
        for plugin in &self.plugins {
            if plugin.id.is_empty() {
                return Err(ConfigError::Invalid("plugin id must not be empty".into()));
            }
            if !seen.insert(plugin.id.as_str()) {
                return Err(ConfigError::DuplicatePlugin {
                    id: plugin.id.clone(),
                });
            }
            if plugin.fail_at.is_some() && plugin.kind() != PluginKind::Platform {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}': fail_at only applies to platform plugins",
                    plugin.id
                )));
            }
            if plugin.position.is_some() && plugin.kind() != PluginKind::Position {
                return Err(ConfigError::Invalid(format!(
                    "plugin '{}': position options only apply to position plugins",
                    plugin.id
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
app:
  name: Drone Choir
  author: ircam
clients:
  count: 3
  mode: process
  restart_on_error: false
language: fr
qos:
  socket_close_delay_ms: 2000
plugins:
  - id: platform
    init_ms: 300
    fail_at: authorization
    failed_features: [microphone]
  - id: scripts
  - id: seat
    kind: position
    position:
      x_range: [0, 2]
connection:
  drop_after_ms: 10000
"#;
        let config = LauncherConfig::from_str(yaml).unwrap();
        assert_eq!(config.app.name, "Drone Choir");
        assert_eq!(config.clients.count, 3);
        assert_eq!(config.clients.mode, LaunchMode::Process);
        assert!(!config.clients.restart_on_error);
        assert_eq!(config.language.as_deref(), Some("fr"));
        assert_eq!(config.qos.socket_close_delay_ms, 2000);
        assert_eq!(config.qos.visibility_delay_ms, 50);
        assert_eq!(config.plugins.len(), 3);
        assert!(config.plugins[0].fails());
        assert_eq!(config.plugins[1].kind(), PluginKind::Generic);
        assert_eq!(config.plugins[1].init_ms, 800);
        assert_eq!(config.plugins[2].kind(), PluginKind::Position);
        assert_eq!(config.connection.drop_after_ms, Some(10000));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = LauncherConfig::from_str("{}").unwrap();
        assert_eq!(config.clients.count, 1);
        assert_eq!(config.clients.mode, LaunchMode::InProcess);
        assert!(config.clients.restart_on_error);
        assert_eq!(config.error_policy, ErrorPolicy::FirstFound);
        assert_eq!(config.plugins.len(), 3);
    }

    #[test]
    fn test_zero_clients_rejected() {
        let result = LauncherConfig::from_str("clients: { count: 0 }");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_plugin_rejected() {
        let yaml = r#"
plugins:
  - id: sync
  - id: sync
"#;
        let result = LauncherConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::DuplicatePlugin { ref id }) if id == "sync"));
    }

    #[test]
    fn test_fail_at_requires_platform() {
        let yaml = r#"
plugins:
  - id: sync
    fail_at: finalization
"#;
        let result = LauncherConfig::from_str(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_discover_walks_parents() {
        let root = std::env::temp_dir().join(format!("kickoff-discover-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join(".kickoff.yml"), "clients: { count: 2 }").unwrap();

        let (path, config) = LauncherConfig::discover(&nested).unwrap();
        assert_eq!(path, root.join(".kickoff.yml"));
        assert_eq!(config.clients.count, 2);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
