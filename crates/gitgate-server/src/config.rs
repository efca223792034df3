//! Server configuration.
//!
//! Values are layered: built-in defaults, then an optional file, then
//! `GITGATE__`-prefixed environment variables (`GITGATE__ACCESS__RECEIVE_PACK`
//! sets `access.receive_pack`). Command-line flags are applied last by the
//! binary.

use config::{Config, ConfigError, Environment, File};
use gitgate_auth::AccessConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Configuration for the Gitgate server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen_addr: SocketAddr,
    /// Directory holding the served repositories.
    pub repositories_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Smart HTTP access policy.
    pub access: AccessConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            repositories_dir: PathBuf::from("./repositories"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            access: AccessConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration.
    ///
    /// With `path`, that file must exist. Without it, `gitgate.yaml` or
    /// `gitgate.toml` in the working directory is read when present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name("gitgate").required(false),
        };
        Self::build(file, Environment::with_prefix("GITGATE"))
    }

    fn build(
        file: File<config::FileSourceFile, config::FileFormat>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                env.prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitgate_auth::Permission;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix("GITGATE").source(Some(source))
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.access.upload_pack);
        assert!(config.access.receive_pack);
    }

    #[test]
    fn test_file_then_environment() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("gitgate.toml");
        std::fs::write(
            &path,
            r#"
repositories_dir = "/srv/git"
log_format = "json"

[access]
default_permission = "read"

[access.users]
alice = "write"
"#,
        )
        .unwrap();

        let config = ServerConfig::build(
            File::from(path.as_path()).required(true),
            env(&[
                ("GITGATE__LISTEN_ADDR", "0.0.0.0:9000"),
                ("GITGATE__ACCESS__RECEIVE_PACK", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.listen_addr, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.repositories_dir, PathBuf::from("/srv/git"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, "info");
        assert!(config.access.upload_pack);
        assert!(!config.access.receive_pack);
        assert_eq!(config.access.default_permission, Permission::Read);
        assert_eq!(config.access.users.get("alice"), Some(&Permission::Write));
    }

    #[test]
    fn test_missing_required_file() {
        let result = ServerConfig::load(Some(Path::new("/nonexistent/gitgate.toml")));
        assert!(result.is_err());
    }
}
