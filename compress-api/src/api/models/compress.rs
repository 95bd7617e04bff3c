use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Multipart body accepted by `POST /api/compress`.
///
/// Documentation only: the body is streamed by the intake, never
/// deserialized into this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CompressForm {
    /// Images to compress. Repeat the field once per file; `files[]` is
    /// accepted as well.
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<String>,
    /// Palette size. Clamped to the configured range, 32 by default.
    #[schema(example = 64)]
    pub colors: Option<String>,
    /// Whether to dither (`1`/`0`, `true`/`false`). On by default.
    #[schema(example = "1")]
    pub dither: Option<String>,
}
