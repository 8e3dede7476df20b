//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Target server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Suite fixture settings
    #[serde(default)]
    pub suite: SuiteConfig,

    /// Completion polling bounds
    #[serde(default)]
    pub poll: PollConfig,

    /// Optional bearer-token endpoint
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

/// Target server settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base address of the HTTP interface (the `/query` endpoint is appended)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Workflow server host forwarded as the `host` query parameter
    #[serde(default = "default_host")]
    pub host: Option<String>,

    /// Workflow server port forwarded as the `port` query parameter
    #[serde(default = "default_port")]
    pub port: Option<u16>,

    /// Basic-auth user
    #[serde(default = "default_user")]
    pub user: String,

    /// Basic-auth password
    #[serde(default = "default_password")]
    pub password: Option<String>,

    /// Skip TLS certificate verification (test environments only)
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
            accept_invalid_certs: default_accept_invalid_certs(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://localhost:8080".to_string()
}
fn default_host() -> Option<String> {
    Some("ecflow-server".to_string())
}
fn default_port() -> Option<u16> {
    Some(3141)
}
fn default_user() -> String {
    "partio".to_string()
}
fn default_password() -> Option<String> {
    Some("partio".to_string())
}
fn default_accept_invalid_certs() -> bool {
    true
}
fn default_request_timeout() -> u64 {
    30
}

/// Suite fixture settings
#[derive(Debug, Deserialize, Clone)]
pub struct SuiteConfig {
    /// Suite name as listed by the server (node path is `/<name>`)
    #[serde(default = "default_suite_name")]
    pub name: String,

    /// Definition file sent with `load`
    #[serde(default = "default_definition")]
    pub definition: PathBuf,

    /// Exact text `get` must return; the check is skipped when unset
    #[serde(default = "default_expected_definition")]
    pub expected_definition: Option<PathBuf>,

    /// Task script used by `edit_script`
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Value of `ECF_API_HOST` set on family b
    #[serde(default = "default_api_host")]
    pub api_host: String,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            name: default_suite_name(),
            definition: default_definition(),
            expected_definition: default_expected_definition(),
            script: default_script(),
            api_host: default_api_host(),
        }
    }
}

fn default_suite_name() -> String {
    "test".to_string()
}
fn default_definition() -> PathBuf {
    PathBuf::from("suites/test.def")
}
fn default_expected_definition() -> Option<PathBuf> {
    Some(PathBuf::from("suites/test.get.expected"))
}
fn default_script() -> PathBuf {
    PathBuf::from("suites/a.ecf")
}
fn default_api_host() -> String {
    "ecflow-devel".to_string()
}

impl SuiteConfig {
    /// Absolute node path of the suite
    pub fn node_path(&self) -> String {
        format!("/{}", self.name.trim_start_matches('/'))
    }

    /// Resolve relative fixture paths against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.definition);
        resolve(&mut self.script);
        if let Some(expected) = self.expected_definition.as_mut() {
            resolve(expected);
        }
    }
}

/// Completion polling bounds
///
/// The product of both values bounds how long a test may wait on one node.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PollConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_interval_ms() -> u64 {
    2000
}
fn default_max_attempts() -> u32 {
    20
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent waiting for one node
    pub fn max_wait(&self) -> Duration {
        self.interval() * self.max_attempts.saturating_sub(1)
    }
}

/// Bearer-token endpoint settings
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Base address of the token service (`/auth` is appended)
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Otherwise the default config file is used
    /// when present, and built-in defaults when it isn't.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }

        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load and validate a configuration file
    ///
    /// Relative suite paths resolve against the file's directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::file_read(path, e))?;
        let mut config = Self::parse(&content)?;

        let base = path.parent().unwrap_or(Path::new("."));
        config.suite.resolve_paths(base);

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration text without resolving paths
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    /// Reject settings that would make a run meaningless or unbounded
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(Error::Config("server.base_url must not be empty".to_string()));
        }
        if self.suite.name.trim_matches('/').is_empty() {
            return Err(Error::Config("suite.name must not be empty".to_string()));
        }
        if self.poll.max_attempts == 0 {
            return Err(Error::Config(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "https://localhost:8080");
        assert_eq!(config.server.port, Some(3141));
        assert!(config.server.accept_invalid_certs);
        assert_eq!(config.suite.node_path(), "/test");
        assert_eq!(config.poll.interval(), Duration::from_secs(2));
        assert_eq!(config.poll.max_attempts, 20);
        assert!(config.auth.is_none());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [server]
            base_url = "http://127.0.0.1:9000"
            host = "wf-host"

            [poll]
            interval_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.server.host.as_deref(), Some("wf-host"));
        assert_eq!(config.server.user, "partio");
        assert_eq!(config.poll.interval_ms, 50);
        assert_eq!(config.poll.max_attempts, 20);
    }

    #[test]
    fn test_parse_auth_section() {
        let config = Config::parse(
            r#"
            [auth]
            url = "http://localhost:5001"
            username = "fred"
            password = "frogs"
            "#,
        )
        .unwrap();
        let auth = config.auth.unwrap();
        assert_eq!(auth.url, "http://localhost:5001");
        assert_eq!(auth.username, "fred");
    }

    #[test]
    fn test_parse_error_is_reported() {
        let err = Config::parse("[poll]\nmax_attempts = \"many\"").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = Config::default();
        config.poll.max_attempts = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_max_wait() {
        let poll = PollConfig {
            interval_ms: 2000,
            max_attempts: 20,
        };
        assert_eq!(poll.max_wait(), Duration::from_secs(38));
    }

    #[test]
    fn test_relative_paths_resolve_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowprobe.toml");
        std::fs::write(
            &path,
            "[suite]\ndefinition = \"defs/x.def\"\nscript = \"/abs/a.ecf\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.suite.definition, dir.path().join("defs/x.def"));
        assert_eq!(config.suite.script, PathBuf::from("/abs/a.ecf"));
        assert_eq!(
            config.suite.expected_definition,
            Some(dir.path().join("suites/test.get.expected"))
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = Config::load(Some(Path::new("/nonexistent/flowprobe.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
