use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

const DEFAULT_SECRET_KEY: &str = "change-me-files-signing-secret";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub database: DatabaseConfig,
    pub signing: SigningConfig,
    pub probe: ProbeConfig,
    pub resolver: ResolverConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    pub secret_key: String,
    /// Public base URL that signed file links are rooted at.
    pub files_url: String,
    pub access_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub timeout_seconds: u64,
    pub allow_private_hosts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Batches above this size are processed but logged as oversized.
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:./files.db".to_string(),
        }
    }
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            secret_key: DEFAULT_SECRET_KEY.to_string(),
            files_url: "http://127.0.0.1:5001".to_string(),
            access_timeout_seconds: 300,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            allow_private_hosts: false,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { max_batch_size: 1000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl FactoryConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&FactoryConfig::default())?);

        if std::path::Path::new("files.toml").exists() {
            builder = builder.add_source(File::with_name("files"));
        }

        builder = builder.add_source(
            Environment::with_prefix("FILES")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let factory_config: FactoryConfig = config.try_deserialize()?;

        factory_config.validate()?;

        Ok(factory_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.is_empty() {
            return Err(ConfigError::Message(
                "Database URL cannot be empty".to_string(),
            ));
        }

        if self.signing.secret_key.is_empty() {
            return Err(ConfigError::Message(
                "Signing secret key cannot be empty".to_string(),
            ));
        }

        if self.signing.secret_key == DEFAULT_SECRET_KEY {
            tracing::warn!("Using default file signing secret - change this in production!");
        }

        if url::Url::parse(&self.signing.files_url).is_err() {
            return Err(ConfigError::Message(format!(
                "Invalid files URL: {}",
                self.signing.files_url
            )));
        }

        if self.signing.access_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "File access timeout must be greater than 0".to_string(),
            ));
        }

        if self.probe.timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "Probe timeout must be greater than 0".to_string(),
            ));
        }

        if self.resolver.max_batch_size == 0 {
            return Err(ConfigError::Message(
                "Resolver max batch size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
