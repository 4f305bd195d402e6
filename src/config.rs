//! Configuration module for the ringserve server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the per-protocol defaults.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Body sent by the HTTP responder unless overridden.
pub const DEFAULT_HTTP_BODY: &str = "Hello World!\n";

/// Which behaviour the connection state machine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Write every received byte back, keep the connection open.
    #[default]
    Echo,
    /// Answer the first bytes with a fixed HTTP response, then close.
    Http,
}

impl ProtocolType {
    /// Port used when no listen address is configured.
    pub fn default_port(self) -> u16 {
        match self {
            ProtocolType::Echo => 8888,
            ProtocolType::Http => 8080,
        }
    }

    /// Per-connection read buffer capacity.
    pub fn default_buffer_size(self) -> usize {
        match self {
            ProtocolType::Echo => 2048,
            ProtocolType::Http => 4096,
        }
    }
}

/// Which completion engine drives the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeType {
    /// Linux io_uring.
    IoUring,
    /// Completion emulation over mio readiness (epoll/kqueue).
    Mio,
}

impl Default for RuntimeType {
    fn default() -> Self {
        if cfg!(target_os = "linux") {
            RuntimeType::IoUring
        } else {
            RuntimeType::Mio
        }
    }
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "ringserve")]
#[command(author = "ringserve authors")]
#[command(version = "0.1.0")]
#[command(about = "A completion-queue driven TCP echo / HTTP server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Connection behaviour
    #[arg(short, long, value_enum)]
    pub protocol: Option<ProtocolType>,

    /// Address to bind to (e.g., 0.0.0.0:8888)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Completion engine
    #[arg(short, long, value_enum)]
    pub runtime: Option<RuntimeType>,

    /// Submission queue depth
    #[arg(long)]
    pub ring_size: Option<u32>,

    /// Per-connection read buffer size in bytes
    #[arg(short, long)]
    pub buffer_size: Option<usize>,

    /// Maximum number of simultaneous connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Use a single self re-arming accept instead of one accept per connection
    #[arg(long)]
    pub multishot_accept: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub protocol: ProtocolType,
    /// Address to bind to; defaults to all interfaces on the protocol's port
    pub listen: Option<String>,
    #[serde(default)]
    pub runtime: RuntimeType,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default)]
    pub multishot_accept: bool,
    /// Listen backlog; defaults to SOMAXCONN
    pub backlog: Option<i32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolType::default(),
            listen: None,
            runtime: RuntimeType::default(),
            max_connections: default_max_connections(),
            multishot_accept: false,
            backlog: None,
        }
    }
}

/// Engine tuning
#[derive(Debug, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_ring_size")]
    pub ring_size: u32,
    /// Completions handled per wakeup
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub buffer_size: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ring_size: default_ring_size(),
            batch_size: default_batch_size(),
            buffer_size: None,
        }
    }
}

/// HTTP responder configuration
#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_body")]
    pub body: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            body: default_http_body(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_connections() -> usize {
    1024
}

fn default_ring_size() -> u32 {
    256
}

fn default_batch_size() -> usize {
    64
}

fn default_http_body() -> String {
    DEFAULT_HTTP_BODY.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub protocol: ProtocolType,
    pub listen: SocketAddr,
    pub runtime: RuntimeType,
    pub ring_size: u32,
    pub batch_size: usize,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub multishot_accept: bool,
    pub backlog: i32,
    pub http_body: String,
    pub log_level: String,
}

impl Config {
    /// Defaults for a protocol, listening on all interfaces.
    pub fn new(protocol: ProtocolType) -> Self {
        Self {
            protocol,
            listen: SocketAddr::from(([0, 0, 0, 0], protocol.default_port())),
            runtime: RuntimeType::default(),
            ring_size: default_ring_size(),
            batch_size: default_batch_size(),
            buffer_size: protocol.default_buffer_size(),
            max_connections: default_max_connections(),
            multishot_accept: false,
            backlog: libc::SOMAXCONN,
            http_body: default_http_body(),
            log_level: default_log_level(),
        }
    }

    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let protocol = cli.protocol.unwrap_or(toml_config.server.protocol);

        let listen = match cli.listen.or(toml_config.server.listen) {
            Some(addr) => addr
                .parse()
                .map_err(|e| ConfigError::InvalidListen(addr, e))?,
            None => SocketAddr::from(([0, 0, 0, 0], protocol.default_port())),
        };

        let config = Config {
            protocol,
            listen,
            runtime: cli.runtime.unwrap_or(toml_config.server.runtime),
            ring_size: cli.ring_size.unwrap_or(toml_config.runtime.ring_size),
            batch_size: toml_config.runtime.batch_size,
            buffer_size: cli
                .buffer_size
                .or(toml_config.runtime.buffer_size)
                .unwrap_or_else(|| protocol.default_buffer_size()),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            multishot_accept: cli.multishot_accept || toml_config.server.multishot_accept,
            backlog: toml_config.server.backlog.unwrap_or(libc::SOMAXCONN),
            http_body: toml_config.http.body,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("ring_size", self.ring_size as usize),
            ("batch_size", self.batch_size),
            ("buffer_size", self.buffer_size),
            ("max_connections", self.max_connections),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::Invalid(name, "must be greater than zero"));
            }
        }
        if self.buffer_size > u32::MAX as usize {
            return Err(ConfigError::Invalid("buffer_size", "must fit in 32 bits"));
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidListen(String, AddrParseError),
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidListen(addr, e) => {
                write!(f, "Invalid listen address '{}': {}", addr, e)
            }
            ConfigError::Invalid(key, reason) => write!(f, "Invalid {}: {}", key, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["ringserve"];
        argv.extend_from_slice(args);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn test_default_config() {
        let config = Config::resolve(cli(&[]), TomlConfig::default()).unwrap();
        assert_eq!(config.protocol, ProtocolType::Echo);
        assert_eq!(config.listen.port(), 8888);
        assert_eq!(config.buffer_size, 2048);
        assert_eq!(config.ring_size, 256);
        assert_eq!(config.backlog, libc::SOMAXCONN);
        assert!(!config.multishot_accept);
        assert_eq!(config.http_body, "Hello World!\n");
    }

    #[test]
    fn test_http_defaults() {
        let config = Config::resolve(cli(&["--protocol", "http"]), TomlConfig::default()).unwrap();
        assert_eq!(config.protocol, ProtocolType::Http);
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.buffer_size, 4096);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            protocol = "http"
            listen = "127.0.0.1:9000"
            runtime = "mio"
            max_connections = 32
            multishot_accept = true
            backlog = 128

            [runtime]
            ring_size = 64
            batch_size = 8
            buffer_size = 1024

            [http]
            body = "ok\n"

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::resolve(cli(&[]), toml_config).unwrap();
        assert_eq!(config.protocol, ProtocolType::Http);
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.runtime, RuntimeType::Mio);
        assert_eq!(config.max_connections, 32);
        assert!(config.multishot_accept);
        assert_eq!(config.backlog, 128);
        assert_eq!(config.ring_size, 64);
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.http_body, "ok\n");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            listen = "127.0.0.1:9000"
            runtime = "mio"

            [runtime]
            buffer_size = 1024
            "#,
        )
        .unwrap();

        let config = Config::resolve(
            cli(&[
                "-l",
                "127.0.0.1:9100",
                "--runtime",
                "io-uring",
                "--buffer-size",
                "512",
                "--log-level",
                "trace",
            ]),
            toml_config,
        )
        .unwrap();
        assert_eq!(config.listen.port(), 9100);
        assert_eq!(config.runtime, RuntimeType::IoUring);
        assert_eq!(config.buffer_size, 512);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::resolve(cli(&["-l", "nope"]), TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidListen(..)));

        let err = Config::resolve(cli(&["--buffer-size", "0"]), TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("buffer_size", _)));
    }
}
