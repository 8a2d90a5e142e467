//! Configuration types and re-exports

pub use super::{
    AppConfig, IngestionConfig, LoggingConfig, Profile, QualityConfig, ServerConfig,
};
