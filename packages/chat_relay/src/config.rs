use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Two equivalent ways to configure:
//
//   config.toml:     [server]
//                    port = 8080
//
//   env var:         RELAY_SERVER__PORT=8080   (double underscore = nesting)
//
//   (single underscore stays within field names: RELAY_WEBSOCKET__HISTORY_LIMIT)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
    #[serde(default)]
    pub cors: CorsFileConfig,
}

/// Listener tunables (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// WebSocket tunables (lives under `[websocket]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    /// Number of messages replayed to a client on connect.
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
        }
    }
}

/// Cross-origin tunables (lives under `[cors]` in config.toml).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorsFileConfig {
    /// Origins allowed to call the HTTP/WebSocket endpoints.
    /// Empty means any origin is accepted.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_history_limit() -> i64 {
    50
}

/// Build a figment that layers: defaults → config.toml → RELAY_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `RELAY_SERVER__PORT=9090`  →  `server.port = 9090`
///   `RELAY_WEBSOCKET__HISTORY_LIMIT=100`  →  `websocket.history_limit = 100`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the server)
// =============================================================================

/// Server configuration for runtime behavior.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Messages replayed to each new connection.
    pub history_limit: i64,
    /// Allowed CORS origins; empty means permissive.
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            history_limit: fc.websocket.history_limit,
            allowed_origins: fc.cors.allowed_origins.clone(),
        }
    }
}

// =============================================================================
// Directory layout config (not tunable via figment — derived from --data-dir)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
}

impl RelayConfig {
    pub fn new(custom_dir: Option<PathBuf>) -> Result<Self> {
        let data_dir = custom_dir.unwrap_or_else(|| {
            dirs::home_dir()
                .expect("Could not find home directory")
                .join(".chatrelay")
        });

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let db_path = data_dir.join("chatrelay.db");

        info!("Data directory: {}", data_dir.display());

        Ok(Self { data_dir, db_path })
    }

    pub fn db_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.db_path.display())
    }

    pub fn reset_database(&self) -> Result<()> {
        if self.db_path.exists() {
            std::fs::remove_file(&self.db_path)
                .with_context(|| format!("Failed to delete database: {:?}", self.db_path))?;
            info!("Database reset: {:?}", self.db_path);

            let wal_path = self.db_path.with_extension("db-wal");
            if wal_path.exists() {
                std::fs::remove_file(&wal_path)?;
            }
            let shm_path = self.db_path.with_extension("db-shm");
            if shm_path.exists() {
                std::fs::remove_file(&shm_path)?;
            }
        }
        Ok(())
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── defaults ────────────────────────────────────────────────────────

    #[test]
    fn test_server_file_config_defaults() {
        let d = ServerFileConfig::default();
        assert_eq!(d.host, "127.0.0.1");
        assert_eq!(d.port, 8080);
    }

    #[test]
    fn test_websocket_file_config_defaults() {
        let d = WebSocketFileConfig::default();
        assert_eq!(d.history_limit, 50);
    }

    #[test]
    fn test_cors_file_config_defaults() {
        let d = CorsFileConfig::default();
        assert!(d.allowed_origins.is_empty());
    }

    // ── ServerConfig::from_file ─────────────────────────────────────────

    #[test]
    fn test_server_config_from_file_defaults() {
        let sc = ServerConfig::from_file(&FileConfig::default());
        assert_eq!(sc.host, "127.0.0.1");
        assert_eq!(sc.port, 8080);
        assert_eq!(sc.history_limit, 50);
        assert!(sc.allowed_origins.is_empty());
    }

    #[test]
    fn test_server_config_custom_values() {
        let fc = FileConfig {
            server: ServerFileConfig {
                host: "0.0.0.0".to_string(),
                port: 9090,
            },
            websocket: WebSocketFileConfig { history_limit: 100 },
            cors: CorsFileConfig {
                allowed_origins: vec!["https://chat.example.com".to_string()],
            },
        };
        let sc = ServerConfig::from_file(&fc);
        assert_eq!(sc.host, "0.0.0.0");
        assert_eq!(sc.port, 9090);
        assert_eq!(sc.history_limit, 100);
        assert_eq!(sc.allowed_origins.len(), 1);
    }

    // ── RelayConfig ─────────────────────────────────────────────────────

    #[test]
    fn test_relay_config_with_custom_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RelayConfig::new(Some(tmp.path().to_path_buf())).unwrap();

        assert_eq!(config.data_dir, tmp.path());
        assert_eq!(config.db_path, tmp.path().join("chatrelay.db"));
        assert_eq!(config.config_toml_path(), tmp.path().join("config.toml"));
    }

    #[test]
    fn test_db_url() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RelayConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        let url = config.db_url();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("chatrelay.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_reset_database() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RelayConfig::new(Some(tmp.path().to_path_buf())).unwrap();

        // Create fake db files
        std::fs::write(&config.db_path, "fake db").unwrap();
        let wal = config.db_path.with_extension("db-wal");
        std::fs::write(&wal, "wal").unwrap();
        let shm = config.db_path.with_extension("db-shm");
        std::fs::write(&shm, "shm").unwrap();

        config.reset_database().unwrap();

        assert!(!config.db_path.exists());
        assert!(!wal.exists());
        assert!(!shm.exists());
    }

    #[test]
    fn test_reset_database_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config = RelayConfig::new(Some(tmp.path().to_path_buf())).unwrap();
        // Should not error when file doesn't exist
        config.reset_database().unwrap();
    }

    // ── load_config ─────────────────────────────────────────────────────

    #[test]
    fn test_load_config_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.port, 8080);
        assert_eq!(fc.websocket.history_limit, 50);
        assert!(fc.cors.allowed_origins.is_empty());
    }

    #[test]
    fn test_load_config_toml_sets_values() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 9090\n\n[websocket]\nhistory_limit = 25\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host, "0.0.0.0");
        assert_eq!(fc.server.port, 9090);
        assert_eq!(fc.websocket.history_limit, 25);
    }

    #[test]
    fn test_load_config_toml_partial_section() {
        let tmp = tempfile::tempdir().unwrap();
        // Only port set — host keeps its default
        std::fs::write(tmp.path().join("config.toml"), "[server]\nport = 3000\n").unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.server.host, "127.0.0.1");
        assert_eq!(fc.server.port, 3000);
    }

    #[test]
    fn test_load_config_cors_origins() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "[cors]\nallowed_origins = [\"https://a.example\", \"https://b.example\"]\n",
        )
        .unwrap();
        let fc: FileConfig = load_config(tmp.path()).extract().unwrap();
        assert_eq!(fc.cors.allowed_origins.len(), 2);
        assert_eq!(fc.cors.allowed_origins[0], "https://a.example");
    }
}
