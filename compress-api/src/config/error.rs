/// Configuration error variants.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    /// Palette bounds must sit inside what an indexed PNG can hold.
    #[error("Palette bounds must be within [{0}, {1}], got [{2}, {3}]")]
    PaletteOutOfRange(u16, u16, u16, u16),

    /// The lower palette bound is larger than the upper one.
    #[error("palette.min_colors ({0}) must not exceed palette.max_colors ({1})")]
    PaletteBoundsInverted(u16, u16),

    /// The default palette size must respect the configured bounds.
    #[error("palette.default_colors ({0}) must be within [{1}, {2}]")]
    DefaultPaletteOutOfRange(u16, u16, u16),

    /// An error returned for duration parameters that must be positive.
    #[error("Duration for {0} must be nonzero")]
    ZeroDurationForbidden(&'static str),

    /// A size limit was configured as zero.
    #[error("Limit {0} must be nonzero")]
    ZeroLimitForbidden(&'static str),

    /// A single file may never be larger than the whole request.
    #[error("limits.max_file_size_bytes ({0}) must not exceed limits.max_request_bytes ({1})")]
    FileLimitExceedsRequestLimit(u64, u64),

    /// The external backend needs a program to run.
    #[error("compression.external.program must be set when the external backend is selected")]
    MissingExternalProgram,

    /// The external backend needs to know where its input lives.
    #[error("compression.external.args must reference the {{input}} placeholder")]
    MissingInputPlaceholder,

    /// The configured CORS origin is not a valid header value.
    #[error("cors.allow_origin is not a valid header value: {0}")]
    InvalidAllowOrigin(String),
}
