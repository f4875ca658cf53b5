//! Logic for loading configuration in to an object model
mod expansion;

use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
pub(crate) use expansion::Expansion;
use schemars::JsonSchema;
use schemars::r#gen::SchemaSettings;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not expand variable: {key}, {cause}
    CannotExpandVariable { key: String, cause: String },
    /// could not expand variable: {key}. Variables must be prefixed with one of '{supported_modes}' followed by '.' e.g. 'env.'
    UnknownExpansionMode {
        key: String,
        supported_modes: String,
    },
    /// invalid expansion mode configuration
    InvalidExpansionModeConfig,
    /// could not read configuration file {path}: {error}
    CannotReadConfigFile {
        path: String,
        error: std::io::Error,
    },
    /// {message}: {error}
    InvalidConfiguration {
        message: &'static str,
        error: String,
    },
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_json::Error),
}

impl From<shellexpand::LookupError<ConfigurationError>> for ConfigurationError {
    fn from(error: shellexpand::LookupError<ConfigurationError>) -> Self {
        error.cause
    }
}

/// The configuration for the gateway.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or inline in Rust code with `serde_json::json!` and `serde_json::from_value`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Configuration options pertaining to the http server component.
    #[serde(default)]
    pub(crate) server: Server,

    /// Where each kind of entity is stored.
    #[serde(default)]
    pub(crate) sources: Sources,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(server: Option<Server>, sources: Option<Sources>) -> Result<Self, ConfigurationError> {
        Self {
            server: server.unwrap_or_default(),
            sources: sources.unwrap_or_default(),
        }
        .validate()
    }

    /// Loads and validates the YAML configuration file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw_yaml = std::fs::read_to_string(path).map_err(|error| {
            ConfigurationError::CannotReadConfigFile {
                path: path.display().to_string(),
                error,
            }
        })?;
        validate_configuration(&raw_yaml)
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    pub(crate) fn validate(self) -> Result<Self, ConfigurationError> {
        let server = &self.server;
        for (name, path) in [
            ("graphql_path", &server.graphql_path),
            ("health_check_path", &server.health_check_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid server configuration",
                    error: format!("'{name}' must start with a '/', got '{path}'"),
                });
            }
        }
        if server.graphql_path == server.health_check_path {
            return Err(ConfigurationError::InvalidConfiguration {
                message: "invalid server configuration",
                error: format!(
                    "'graphql_path' and 'health_check_path' are both '{}'",
                    server.graphql_path
                ),
            });
        }

        for (name, source) in [
            ("users", &self.sources.users),
            ("messages", &self.sources.messages),
        ] {
            if source.pool_size() == 0 {
                return Err(ConfigurationError::InvalidConfiguration {
                    message: "invalid source configuration",
                    error: format!("'{name}' pool_size must be at least 1"),
                });
            }
        }
        Ok(self)
    }
}

/// Parse configuration from a string in YAML syntax
impl FromStr for Configuration {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_configuration(s)
    }
}

/// Configuration options pertaining to the http server component.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Server {
    /// The socket address and port to listen on
    /// Defaults to 127.0.0.1:4000
    #[serde(default = "default_listen")]
    #[schemars(with = "String")]
    pub(crate) listen: SocketAddr,

    /// The HTTP path on which GraphQL requests will be served.
    /// default: "/"
    #[serde(default = "default_graphql_path")]
    pub(crate) graphql_path: String,

    /// healthCheck path
    /// default: "/health"
    #[serde(default = "default_health_check_path")]
    pub(crate) health_check_path: String,
}

#[buildstructor::buildstructor]
impl Server {
    #[builder(visibility = "pub")]
    fn new(
        listen: Option<SocketAddr>,
        graphql_path: Option<String>,
        health_check_path: Option<String>,
    ) -> Self {
        Self {
            listen: listen.unwrap_or_else(default_listen),
            graphql_path: graphql_path.unwrap_or_else(default_graphql_path),
            health_check_path: health_check_path.unwrap_or_else(default_health_check_path),
        }
    }

    pub fn listen(&self) -> SocketAddr {
        self.listen
    }
}

impl Default for Server {
    fn default() -> Self {
        Server::builder().build()
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 4000)
}

fn default_graphql_path() -> String {
    String::from("/")
}

fn default_health_check_path() -> String {
    String::from("/health")
}

/// The store behind each entity kind.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Sources {
    /// Store holding users.
    #[serde(default)]
    pub users: SourceConfig,

    /// Store holding messages.
    #[serde(default)]
    pub messages: SourceConfig,
}

/// A data source and its connection settings.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    /// Keep records in process memory.
    Memory(MemoryConfig),
    /// Store records as JSON documents in Redis.
    Redis(RedisConfig),
    /// Store records as rows in PostgreSQL.
    Postgres(PostgresConfig),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Memory(MemoryConfig::default())
    }
}

impl SourceConfig {
    /// The store kind, as spelled in the configuration file.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceConfig::Memory(_) => "memory",
            SourceConfig::Redis(_) => "redis",
            SourceConfig::Postgres(_) => "postgres",
        }
    }

    fn pool_size(&self) -> usize {
        match self {
            SourceConfig::Memory(config) => config.pool_size,
            SourceConfig::Redis(config) => config.pool_size,
            SourceConfig::Postgres(config) => config.pool_size as usize,
        }
    }
}

/// In-process store configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Number of concurrent sessions (default: 1)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long to wait for a free session (default: 30s)
    #[serde(with = "humantime_serde", default = "default_acquire_timeout")]
    #[schemars(with = "String")]
    pub acquire_timeout: Duration,

    /// Artificial delay added to every operation
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub latency: Option<Duration>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            acquire_timeout: default_acquire_timeout(),
            latency: None,
        }
    }
}

/// Redis store configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// URL of the Redis server
    pub url: String,

    /// Prefix of every key written (default: "switchboard")
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// The size of the Redis connection pool (default: 1)
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// How long to wait for a free connection (default: 30s)
    #[serde(with = "humantime_serde", default = "default_acquire_timeout")]
    #[schemars(with = "String")]
    pub acquire_timeout: Duration,
}

/// PostgreSQL store configuration
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PostgresConfig {
    /// URL of the PostgreSQL database
    pub url: String,

    /// The size of the PostgreSQL connection pool (default: 1)
    #[serde(default = "default_postgres_pool_size")]
    pub pool_size: u32,

    /// How long to wait for a free connection (default: 30s)
    #[serde(with = "humantime_serde", default = "default_acquire_timeout")]
    #[schemars(with = "String")]
    pub acquire_timeout: Duration,

    /// Idle connections are closed after this long (default: 4mins)
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    #[schemars(with = "String")]
    pub idle_timeout: Duration,
}

const fn default_pool_size() -> usize {
    1
}

const fn default_postgres_pool_size() -> u32 {
    1
}

const fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_idle_timeout() -> Duration {
    Duration::from_secs(60 * 4)
}

fn default_namespace() -> String {
    String::from("switchboard")
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = true;
        s.option_add_null_type = false;
        s.inline_subschemas = true;
    });
    settings.into_generator().into_root_schema_for::<Configuration>()
}

/// Parse, expand and validate configuration YAML.
///
/// An empty document yields the default configuration.
pub(crate) fn validate_configuration(raw_yaml: &str) -> Result<Configuration, ConfigurationError> {
    validate_configuration_with(raw_yaml, &Expansion::default()?)
}

pub(crate) fn validate_configuration_with(
    raw_yaml: &str,
    expansion: &Expansion,
) -> Result<Configuration, ConfigurationError> {
    let yaml: serde_json::Value = if raw_yaml.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_yaml::from_str(raw_yaml).map_err(|e| ConfigurationError::InvalidConfiguration {
            message: "failed to parse yaml",
            error: e.to_string(),
        })?
    };
    let yaml = match yaml {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        yaml => yaml,
    };
    let expanded_yaml = expansion.expand(&yaml)?;
    let configuration: Configuration = serde_json::from_value(expanded_yaml)
        .map_err(ConfigurationError::DeserializeConfigError)?;
    configuration.validate()
}
