//! Configuration management for the compression service
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use config::FileFormat;
use serde::Deserialize;
use warp::http::HeaderValue;

use crate::config::error::ConfigValidationError;
use crate::config::serialization::duration_seconds_deserializer;
use crate::config::serialization::optional_dir_deserializer;
use crate::logging::LogFormat;

mod error;
mod serialization;

/// Embedded defaults, so a Lambda deployment does not need a config file on disk.
const DEFAULT_CONFIG: &str = include_str!("default.toml");

/// Prefix of every environment variable read by [`Settings::new`].
pub const ENV_PREFIX: &str = "COMPRESS_API";

/// Smallest palette an indexed PNG can meaningfully hold.
pub const PALETTE_FLOOR: u16 = 2;
/// Largest palette addressable with 8-bit indices.
pub const PALETTE_CEILING: u16 = 256;

/// Trait for validating configuration values.
trait Validatable {
    /// Validate the configuration values.
    fn validate(&self, cfg: &Settings) -> Result<(), ConfigError>;
}

fn invalid(err: ConfigValidationError) -> ConfigError {
    ConfigError::Message(err.to_string())
}

/// Top-level configuration for the compression service
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    /// Local server configuration
    pub server: ServerConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Resource limits applied to every request
    pub limits: LimitsConfig,
    /// Palette bounds and defaults
    pub palette: PaletteConfig,
    /// Compression backend selection
    pub compression: CompressionConfig,
    /// Cross-origin response headers
    pub cors: CorsConfig,
}

/// Bind address for the local (non-Lambda) server.
#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
}

/// Logging configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is not set.
    pub directives: String,
}

/// Resource limits that keep one invocation inside its budget.
#[derive(Deserialize, Clone, Debug)]
pub struct LimitsConfig {
    /// Uploads larger than this are rejected during intake.
    pub max_file_size_bytes: u64,
    /// Cap on the whole multipart body.
    pub max_request_bytes: u64,
    /// Number of images compressed concurrently; groups run one after the other.
    pub concurrency_group_size: NonZeroUsize,
    /// How long a single image may spend in compression.
    #[serde(deserialize_with = "duration_seconds_deserializer")]
    pub item_timeout: Duration,
    /// Where transient upload and output files are written. Falls back to
    /// the OS temp directory.
    #[serde(default, deserialize_with = "optional_dir_deserializer")]
    pub upload_dir: Option<PathBuf>,
}

impl LimitsConfig {
    /// The directory transient files are written to.
    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

impl Validatable for LimitsConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.item_timeout.is_zero() {
            return Err(invalid(ConfigValidationError::ZeroDurationForbidden(
                "limits.item_timeout",
            )));
        }
        if self.max_file_size_bytes == 0 {
            return Err(invalid(ConfigValidationError::ZeroLimitForbidden(
                "limits.max_file_size_bytes",
            )));
        }
        if self.max_file_size_bytes > self.max_request_bytes {
            return Err(invalid(
                ConfigValidationError::FileLimitExceedsRequestLimit(
                    self.max_file_size_bytes,
                    self.max_request_bytes,
                ),
            ));
        }
        Ok(())
    }
}

/// Clamp range and defaults for the user supplied palette parameters.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PaletteConfig {
    /// Lower clamp bound for `colors`.
    pub min_colors: u16,
    /// Upper clamp bound for `colors`.
    pub max_colors: u16,
    /// Palette size used when `colors` is missing or not a number.
    pub default_colors: u16,
    /// Dithering used when `dither` is missing or unrecognised.
    pub default_dither: bool,
}

impl Default for PaletteConfig {
    fn default() -> Self {
        Self {
            min_colors: PALETTE_FLOOR,
            max_colors: PALETTE_CEILING,
            default_colors: 32,
            default_dither: true,
        }
    }
}

impl Validatable for PaletteConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.min_colors < PALETTE_FLOOR || self.max_colors > PALETTE_CEILING {
            return Err(invalid(ConfigValidationError::PaletteOutOfRange(
                PALETTE_FLOOR,
                PALETTE_CEILING,
                self.min_colors,
                self.max_colors,
            )));
        }
        if self.min_colors > self.max_colors {
            return Err(invalid(ConfigValidationError::PaletteBoundsInverted(
                self.min_colors,
                self.max_colors,
            )));
        }
        if !(self.min_colors..=self.max_colors).contains(&self.default_colors) {
            return Err(invalid(ConfigValidationError::DefaultPaletteOutOfRange(
                self.default_colors,
                self.min_colors,
                self.max_colors,
            )));
        }
        Ok(())
    }
}

/// Which compression backend handles the images.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process palette quantization.
    Palette,
    /// An external tool such as `pngquant`.
    External,
}

/// Compression backend configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct CompressionConfig {
    /// The selected backend.
    pub backend: BackendKind,
    /// Settings for the external backend.
    pub external: ExternalToolConfig,
}

/// Command template for the external backend. `{input}`, `{output}` and
/// `{colors}` are substituted per image.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExternalToolConfig {
    /// Program to execute.
    pub program: String,
    /// Argument template.
    pub args: Vec<String>,
    /// Arguments prepended when dithering is disabled.
    #[serde(default)]
    pub no_dither_args: Vec<String>,
}

impl Validatable for CompressionConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        if self.backend != BackendKind::External {
            return Ok(());
        }
        if self.external.program.trim().is_empty() {
            return Err(invalid(ConfigValidationError::MissingExternalProgram));
        }
        if !self.external.args.iter().any(|arg| arg.contains("{input}")) {
            return Err(invalid(ConfigValidationError::MissingInputPlaceholder));
        }
        Ok(())
    }
}

/// Cross-origin configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct CorsConfig {
    /// Value of `Access-Control-Allow-Origin`.
    pub allow_origin: String,
}

impl Validatable for CorsConfig {
    fn validate(&self, _: &Settings) -> Result<(), ConfigError> {
        HeaderValue::from_str(&self.allow_origin)
            .map(|_| ())
            .map_err(|_| {
                invalid(ConfigValidationError::InvalidAllowOrigin(
                    self.allow_origin.clone(),
                ))
            })
    }
}

impl Settings {
    /// Initializing the config first with the embedded default values, then
    /// with the optional config file and finally with environment variables.
    /// The explicit separator with double underscores is needed to correctly
    /// parse the nested config structure, so `limits.item_timeout` is read
    /// from `COMPRESS_API_LIMITS__ITEM_TIMEOUT`.
    pub fn new(config_path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        Self::build(config_path, None)
    }

    /// Settings from the embedded defaults and the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::new(None::<&Path>)
    }

    /// Shared builder. `env_source` replaces the process environment when
    /// set, which keeps tests independent of each other.
    fn build(
        config_path: Option<impl AsRef<Path>>,
        env_source: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .prefix_separator("_")
            .list_separator(",")
            .try_parsing(true)
            .with_list_parse_key("compression.external.args")
            .with_list_parse_key("compression.external.no_dither_args")
            .source(env_source);

        let mut cfg_builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(path) = config_path {
            cfg_builder = cfg_builder.add_source(File::from(path.as_ref()));
        }
        cfg_builder = cfg_builder.add_source(env);

        let settings: Settings = cfg_builder.build()?.try_deserialize()?;

        settings.validate()?;

        Ok(settings)
    }

    /// Perform validation on the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate(self)?;
        self.palette.validate(self)?;
        self.compression.validate(self)?;
        self.cors.validate(self)?;

        Ok(())
    }
}

#[cfg(any(test, feature = "testing"))]
impl Settings {
    /// Settings from the embedded defaults with the given environment
    /// overrides, ignoring the process environment.
    pub fn with_overrides<'a>(
        overrides: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let source = overrides
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self::build(None::<&Path>, Some(source))
    }

    /// Settings from the embedded defaults only.
    pub fn new_from_default_config() -> Result<Self, ConfigError> {
        Self::with_overrides([])
    }
}
