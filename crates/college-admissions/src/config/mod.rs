use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::admissions::intake::{IntakePolicy, DEFAULT_MAX_FILE_BYTES, DEFAULT_PAYMENT_AMOUNT};
use crate::admissions::cloudinary::DEFAULT_API_BASE;
use crate::admissions::{CloudinarySettings, MongoSettings};

const DEFAULT_DATABASE: &str = "hims-college";
const DEFAULT_MEDIA_ROOT: &str = "hims-college";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_MEDIA_TIMEOUT_SECS: u64 = 30;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    pub media: MediaConfig,
    pub intake: IntakeConfig,
    pub admin: AdminConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match non_empty_var("APP_LOG_FORMAT") {
            Some(raw) => raw.parse::<LogFormat>()?,
            None => LogFormat::Compact,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            store: StoreConfig::load(environment)?,
            media: MediaConfig::load(environment)?,
            intake: IntakeConfig::load()?,
            admin: AdminConfig {
                api_token: non_empty_var("ADMIN_API_TOKEN"),
            },
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub log_format: LogFormat,
}

/// Line format for emitted log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidLogFormat(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Mongo,
}

/// Where applications are persisted.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub mongodb_uri: Option<String>,
    pub database: String,
    pub timeout: Duration,
}

impl StoreConfig {
    fn load(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let backend = match non_empty_var("STORE_BACKEND") {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "memory" | "in-memory" => StoreBackend::Memory,
                "mongo" | "mongodb" => StoreBackend::Mongo,
                _ => return Err(ConfigError::InvalidBackend(raw)),
            },
            None if environment.is_production() => StoreBackend::Mongo,
            None => StoreBackend::Memory,
        };

        Ok(Self {
            backend,
            mongodb_uri: non_empty_var("MONGODB_URI"),
            database: non_empty_var("MONGODB_DATABASE")
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            timeout: Duration::from_secs(parse_var(
                "STORE_TIMEOUT_SECS",
                DEFAULT_STORE_TIMEOUT_SECS,
            )?),
        })
    }

    pub fn mongo_settings(&self, unique_email: bool) -> Result<MongoSettings, ConfigError> {
        let uri = self
            .mongodb_uri
            .clone()
            .ok_or(ConfigError::MissingVar("MONGODB_URI"))?;
        Ok(MongoSettings {
            uri,
            database: self.database.clone(),
            timeout: self.timeout,
            unique_email,
        })
    }
}

/// Media host credentials. `cloudinary` is `None` when the in-memory host
/// should be used instead.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    pub cloudinary: Option<CloudinarySettings>,
    pub root_folder: String,
    pub timeout: Duration,
}

impl MediaConfig {
    fn load(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let root_folder =
            non_empty_var("MEDIA_ROOT_FOLDER").unwrap_or_else(|| DEFAULT_MEDIA_ROOT.to_string());
        let timeout = Duration::from_secs(parse_var(
            "MEDIA_TIMEOUT_SECS",
            DEFAULT_MEDIA_TIMEOUT_SECS,
        )?);

        let credentials = (
            non_empty_var("CLOUDINARY_CLOUD_NAME"),
            non_empty_var("CLOUDINARY_API_KEY"),
            non_empty_var("CLOUDINARY_API_SECRET"),
        );
        let cloudinary = match credentials {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinarySettings {
                cloud_name,
                api_key,
                api_secret,
                root_folder: root_folder.clone(),
                timeout,
                api_base: non_empty_var("CLOUDINARY_API_BASE")
                    .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            }),
            (None, None, None) if !environment.is_production() => None,
            (cloud_name, api_key, _) => {
                let missing = if cloud_name.is_none() {
                    "CLOUDINARY_CLOUD_NAME"
                } else if api_key.is_none() {
                    "CLOUDINARY_API_KEY"
                } else {
                    "CLOUDINARY_API_SECRET"
                };
                return Err(ConfigError::MissingVar(missing));
            }
        };

        Ok(Self {
            cloudinary,
            root_folder,
            timeout,
        })
    }
}

/// Submission rules and the scratch directory for staged uploads.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub staging_dir: PathBuf,
    pub max_file_bytes: usize,
    pub require_email: bool,
    pub unique_email: bool,
    pub payment_amount: String,
}

impl IntakeConfig {
    fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            staging_dir: non_empty_var("INTAKE_STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("admissions-staging")),
            max_file_bytes: parse_var("INTAKE_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES)?,
            require_email: parse_flag("INTAKE_REQUIRE_EMAIL", false)?,
            unique_email: parse_flag("INTAKE_UNIQUE_EMAIL", false)?,
            payment_amount: non_empty_var("INTAKE_PAYMENT_AMOUNT")
                .unwrap_or_else(|| DEFAULT_PAYMENT_AMOUNT.to_string()),
        })
    }

    pub fn policy(&self) -> IntakePolicy {
        IntakePolicy {
            payment_amount: self.payment_amount.clone(),
            max_file_bytes: self.max_file_bytes,
            require_email: self.require_email,
            unique_email: self.unique_email,
        }
    }
}

#[derive(Clone, Default)]
pub struct AdminConfig {
    pub api_token: Option<String>,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var: name, value: raw }),
        None => Ok(default),
    }
}

fn parse_flag(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var: name, value: raw }),
        },
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str, value: String },
    InvalidFlag { var: &'static str, value: String },
    InvalidBackend(String),
    InvalidLogFormat(String),
    MissingVar(&'static str),
    EphemeralStore(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got '{value}'")
            }
            ConfigError::InvalidFlag { var, value } => {
                write!(f, "{var} must be true or false, got '{value}'")
            }
            ConfigError::InvalidBackend(value) => {
                write!(f, "STORE_BACKEND must be 'memory' or 'mongo', got '{value}'")
            }
            ConfigError::InvalidLogFormat(value) => {
                write!(f, "APP_LOG_FORMAT must be 'compact' or 'json', got '{value}'")
            }
            ConfigError::MissingVar(var) => write!(f, "{var} must be set"),
            ConfigError::EphemeralStore(command) => write!(
                f,
                "`{command}` reads stored applications; set STORE_BACKEND=mongo"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
