use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use dataplane::ClientOptions;
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TABLE_DIRS,
};

// =============================================================================
// File Config Structs (all fields optional, merged across files)
// =============================================================================

/// Server configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Table loading section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TablesFileConfig {
    pub dirs: Option<Vec<String>>,
}

/// Remote table section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RemoteFileConfig {
    pub timeout_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub tables: Option<TablesFileConfig>,
    pub remote: Option<RemoteFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                tracing::trace!(host = ?server.host, "Merging server.host");
                current.host = server.host;
            }
            if server.port.is_some() {
                tracing::trace!(port = ?server.port, "Merging server.port");
                current.port = server.port;
            }
        }

        // A later file's dirs replace the earlier list rather than extend it
        if let Some(tables) = other.tables {
            let current = self.tables.get_or_insert_with(TablesFileConfig::default);
            if tables.dirs.is_some() {
                tracing::trace!(dirs = ?tables.dirs, "Merging tables.dirs");
                current.dirs = tables.dirs;
            }
        }

        if let Some(remote) = other.remote {
            let current = self.remote.get_or_insert_with(RemoteFileConfig::default);
            if remote.timeout_secs.is_some() {
                tracing::trace!(timeout_secs = ?remote.timeout_secs, "Merging remote.timeout_secs");
                current.timeout_secs = remote.timeout_secs;
            }
        }

        if other.debug.is_some() {
            self.debug = other.debug;
        }
    }
}

// =============================================================================
// Runtime Config Structs (final merged configuration)
// =============================================================================

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Where table files are read from
#[derive(Debug, Clone)]
pub struct TablesConfig {
    pub dirs: Vec<PathBuf>,
}

/// Options for tables that delegate to another server or a CSV URL
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            headers: Vec::new(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tables: TablesConfig,
    pub remote: RemoteConfig,
    pub debug: bool,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.dataplane/dataplane.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let file_server = file_config.server.unwrap_or_default();
        let file_tables = file_config.tables.unwrap_or_default();
        let file_remote = file_config.remote.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        // --tables-dir names a single directory and replaces the file list
        let dirs = match &cli.tables_dir {
            Some(dir) => vec![expand_path(&dir.to_string_lossy())],
            None => file_tables
                .dirs
                .unwrap_or_else(|| DEFAULT_TABLE_DIRS.iter().map(|d| d.to_string()).collect())
                .iter()
                .map(|d| expand_path(d))
                .collect(),
        };

        let timeout_secs = cli.remote_timeout_secs.or(file_remote.timeout_secs);

        let debug = cli.debug || file_config.debug.unwrap_or(false);

        let config = Self {
            server: ServerConfig { host, port },
            tables: TablesConfig { dirs },
            remote: RemoteConfig { timeout_secs },
            debug,
        };

        config.validate()?;

        tracing::debug!(
            host = %config.server.host,
            port = config.server.port,
            tables = ?config.tables.dirs,
            debug = config.debug,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }

        // Port 0 would bind a random port the clients cannot know
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }

        if self.tables.dirs.is_empty() {
            anyhow::bail!("Configuration error: tables.dirs must name at least one directory");
        }

        if self.remote.timeout_secs == Some(0) {
            anyhow::bail!("Configuration error: remote.timeout_secs must be greater than 0");
        }

        Ok(())
    }
}

/// Get the profile config path (~/.dataplane/dataplane.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

/// Expand `~` and make relative paths absolute against the working directory
fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();
    let expanded = match path.strip_prefix("~") {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    };
    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_parse_full() {
        let json = r#"{
            "server": { "host": "0.0.0.0", "port": 9000 },
            "tables": { "dirs": ["/srv/tables", "more"] },
            "remote": { "timeout_secs": 30 },
            "debug": true
        }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        let server = config.server.as_ref().unwrap();
        assert_eq!(server.host, Some("0.0.0.0".to_string()));
        assert_eq!(server.port, Some(9000));
        assert_eq!(
            config.tables.as_ref().unwrap().dirs,
            Some(vec!["/srv/tables".to_string(), "more".to_string()])
        );
        assert_eq!(config.remote.as_ref().unwrap().timeout_secs, Some(30));
        assert_eq!(config.debug, Some(true));
    }

    #[test]
    fn test_file_config_parse_empty() {
        let config: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(config.server.is_none());
        assert!(config.tables.is_none());
        assert!(config.remote.is_none());
    }

    #[test]
    fn test_file_config_parse_extra_fields() {
        let json = r#"{ "server": { "host": "localhost" }, "unknown_field": 123 }"#;
        let config: FileConfig = serde_json::from_str(json).unwrap();

        assert_eq!(
            config.server.as_ref().unwrap().host,
            Some("localhost".to_string())
        );
        assert_eq!(config.extra.get("unknown_field").unwrap(), 123);
    }

    #[test]
    fn test_file_config_merge() {
        let mut base = FileConfig {
            server: Some(ServerFileConfig {
                host: Some("base.host".to_string()),
                port: Some(1000),
            }),
            tables: Some(TablesFileConfig {
                dirs: Some(vec!["a".to_string(), "b".to_string()]),
            }),
            remote: Some(RemoteFileConfig {
                timeout_secs: Some(10),
            }),
            debug: Some(false),
            extra: serde_json::Value::Null,
        };
        let overlay = FileConfig {
            server: Some(ServerFileConfig {
                host: None,
                port: Some(2000),
            }),
            tables: Some(TablesFileConfig {
                dirs: Some(vec!["c".to_string()]),
            }),
            remote: None,
            debug: Some(true),
            extra: serde_json::Value::Null,
        };
        base.merge(overlay);

        let server = base.server.unwrap();
        assert_eq!(server.host, Some("base.host".to_string()));
        assert_eq!(server.port, Some(2000));
        assert_eq!(base.tables.unwrap().dirs, Some(vec!["c".to_string()]));
        assert_eq!(base.remote.unwrap().timeout_secs, Some(10));
        assert_eq!(base.debug, Some(true));
    }

    #[test]
    fn test_app_config_cli_override() {
        let cli = CliConfig {
            host: Some("cli.host".to_string()),
            port: Some(3000),
            debug: true,
            config: None,
            tables_dir: Some(PathBuf::from("/srv/tables")),
            remote_timeout_secs: Some(7),
        };
        let config = AppConfig::load(&cli).unwrap();

        assert_eq!(config.server.host, "cli.host");
        assert_eq!(config.server.port, 3000);
        assert!(config.debug);
        assert_eq!(config.tables.dirs, vec![PathBuf::from("/srv/tables")]);
        assert_eq!(
            config.remote.client_options().timeout,
            Some(Duration::from_secs(7))
        );
    }

    #[test]
    fn test_app_config_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        fs::write(
            &path,
            r#"{ "server": { "port": 9100 }, "tables": { "dirs": ["/data/t"] } }"#,
        )
        .unwrap();

        let cli = CliConfig {
            config: Some(path),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.tables.dirs, vec![PathBuf::from("/data/t")]);
    }

    #[test]
    fn test_app_config_missing_config_file() {
        let cli = CliConfig {
            config: Some(PathBuf::from("/definitely/not/here/dataplane.json")),
            ..Default::default()
        };
        let err = AppConfig::load(&cli).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_app_config_validation_empty_host() {
        let cli = CliConfig {
            host: Some(String::new()),
            ..Default::default()
        };
        let result = AppConfig::load(&cli);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("server.host must not be empty")
        );
    }

    #[test]
    fn test_app_config_validation_port_zero() {
        let cli = CliConfig {
            port: Some(0),
            ..Default::default()
        };
        assert!(
            AppConfig::load(&cli)
                .unwrap_err()
                .to_string()
                .contains("server.port must be greater than 0")
        );
    }

    #[test]
    fn test_app_config_validation_timeout_zero() {
        let cli = CliConfig {
            remote_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(
            AppConfig::load(&cli)
                .unwrap_err()
                .to_string()
                .contains("remote.timeout_secs")
        );
    }

    #[test]
    fn test_no_timeout_by_default() {
        assert_eq!(RemoteConfig::default().client_options().timeout, None);
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
        assert!(expand_path("relative").is_absolute());
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_path("~/x"), home.join("x"));
        }
    }
}
