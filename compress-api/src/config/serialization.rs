//! Custom deserializers for configuration values.

use serde::{Deserialize, Deserializer};

/// A deserializer for the std::time::Duration type.
/// Serde includes a default deserializer, but it expects a struct.
pub fn duration_seconds_deserializer<'de, D>(
    deserializer: D,
) -> Result<std::time::Duration, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(std::time::Duration::from_secs(
        u64::deserialize(deserializer).map_err(serde::de::Error::custom)?,
    ))
}

/// A deserializer for an optional directory. Empty strings are treated as
/// "not set" so that `COMPRESS_API_LIMITS__UPLOAD_DIR=` falls back to the
/// OS temp directory.
pub fn optional_dir_deserializer<'de, D>(
    deserializer: D,
) -> Result<Option<std::path::PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .filter(|s| !s.trim().is_empty())
        .map(std::path::PathBuf::from))
}
