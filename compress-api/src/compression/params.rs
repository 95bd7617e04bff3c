//! Compression parameters parsed from the request form.

use serde::Serialize;

use crate::config::PaletteConfig;

/// Form field holding the requested palette size.
pub const COLORS_FIELD: &str = "colors";
/// Form field toggling dithering.
pub const DITHER_FIELD: &str = "dither";

/// Parameters shared read-only by every compression in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionParameters {
    /// Number of palette entries, always within the configured bounds.
    pub palette_size: u16,
    /// Whether error diffusion dithering is applied.
    pub dither: bool,
}

impl CompressionParameters {
    /// Parse the raw `colors` and `dither` field values. Invalid values
    /// never reject the request: numbers are clamped into the configured
    /// range and anything unparseable falls back to the defaults.
    pub fn from_fields(colors: Option<&str>, dither: Option<&str>, palette: &PaletteConfig) -> Self {
        let palette_size = colors
            .and_then(parse_integer)
            .map(|value| value.clamp(palette.min_colors.into(), palette.max_colors.into()))
            .and_then(|value| u16::try_from(value).ok())
            .unwrap_or(palette.default_colors);

        let dither = dither.and_then(parse_flag).unwrap_or(palette.default_dither);

        Self { palette_size, dither }
    }

    /// The defaults of the given palette configuration.
    pub fn defaults(palette: &PaletteConfig) -> Self {
        Self {
            palette_size: palette.default_colors,
            dither: palette.default_dither,
        }
    }
}

/// Leading-integer parse: `"48"` and `"48.9"` both read as 48.
fn parse_integer(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(value) = raw.parse::<i64>() {
        return Some(value);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.trunc().clamp(i64::MIN as f64, i64::MAX as f64) as i64)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
