//! Program configuration: command-line file path plus JSON settings (spec §6, §10.1).

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{DbError, Result};

/// Socket-level settings. Mirrors the original `ServerConfiguration`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8080,
            max_connection: 128,
        }
    }
}

/// Store-level settings. Mirrors the original `DatabaseConfiguration`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "./data.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Loads and parses the JSON configuration file at `path`. A member that is
    /// missing, or present with the wrong JSON type, is skipped -- it leaves the
    /// corresponding default in place rather than failing the whole load. Only an
    /// unreadable file or invalid JSON syntax is a `DbError::Config`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("unable to open file: {path:?}: {e}")))?;

        let document: Value = serde_json::from_str(&text)
            .map_err(|e| DbError::Config(format!("invalid configuration JSON: {e}")))?;

        let mut config = Config::default();

        // Note: "servive" (not "service") is the key the original program actually
        // reads. Carried forward verbatim -- see DESIGN.md.
        if let Some(service) = document.get("servive").filter(|v| v.is_object()) {
            if let Some(ip) = service.get("ip").and_then(Value::as_str) {
                config.server.ip = ip.to_string();
            }
            if let Some(port) = service.get("port").and_then(Value::as_i64) {
                if let Ok(port) = u16::try_from(port) {
                    config.server.port = port;
                }
            }
            if let Some(max_connection) = service.get("maxConnection").and_then(Value::as_i64) {
                config.server.max_connection = max_connection as i32;
            }
        }

        if let Some(database) = document.get("database").filter(|v| v.is_object()) {
            if let Some(path) = database.get("path").and_then(Value::as_str) {
                config.database.path = path.to_string();
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_recognized_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"servive": {{"ip": "0.0.0.0", "port": 9090, "maxConnection": 64}}, "database": {{"path": "/tmp/x.db"}}}}"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.ip, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.max_connection, 64);
        assert_eq!(config.database.path, "/tmp/x.db");
    }

    #[test]
    fn missing_fields_keep_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"servive": {{"ip": "10.0.0.1"}}}}"#).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.ip, "10.0.0.1");
        assert_eq!(config.server.port, ServerConfig::default().port);
        assert_eq!(config.database.path, DatabaseConfig::default().path);
    }

    #[test]
    fn unreadable_file_is_config_error() {
        let err = Config::load("/nonexistent/path/config.json").unwrap_err();
        assert!(matches!(err, DbError::Config(_)));
    }
}
