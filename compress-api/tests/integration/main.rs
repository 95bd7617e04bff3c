use std::path::Path;

use compress_api::config::Settings;
use compress_api::context::ApiContext;

mod endpoints;
mod external;

/// Settings writing transient files into `upload_dir`, plus extra overrides.
pub fn settings_in(upload_dir: &Path, overrides: &[(&str, &str)]) -> Settings {
    let upload_dir = upload_dir.to_string_lossy().into_owned();
    let mut all = vec![("COMPRESS_API_LIMITS__UPLOAD_DIR", upload_dir.as_str())];
    all.extend_from_slice(overrides);
    Settings::with_overrides(all).expect("test settings must load")
}

/// A context backed by `settings`.
pub fn context(settings: Settings) -> ApiContext {
    ApiContext::from_settings(settings).expect("test context must build")
}

/// Whether the upload directory holds no transient files.
pub fn is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}
