pub mod settings;

pub use settings::{
    DatabaseConfig, FactoryConfig, LoggingConfig, ProbeConfig, ResolverConfig, SigningConfig,
};
