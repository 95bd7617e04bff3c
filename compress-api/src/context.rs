//! Shared state handed to every request handler.

use config::ConfigError;

use crate::api::reply::{CorsPolicy, ResponseBuilder};
use crate::compression::CompressionBackend;
use crate::config::Settings;

/// Everything a handler needs, cloned into each request.
#[derive(Clone, Debug)]
pub struct ApiContext {
    /// Loaded settings.
    pub settings: Settings,
    /// The configured compression backend.
    pub compressor: CompressionBackend,
    /// CORS headers for every response.
    pub cors: CorsPolicy,
}

impl ApiContext {
    /// Build the context from validated settings.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let cors = CorsPolicy::from_config(&settings.cors)
            .map_err(|err| ConfigError::Message(err.to_string()))?;
        let compressor = CompressionBackend::from_config(&settings.compression);

        Ok(Self { settings, compressor, cors })
    }

    /// Load settings from the environment and build the context.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_settings(Settings::from_env()?)
    }

    /// A fresh response builder for one request.
    pub fn reply(&self) -> ResponseBuilder {
        ResponseBuilder::new(self.cors.clone())
    }
}
