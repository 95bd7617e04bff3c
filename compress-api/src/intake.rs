//! Reading the multipart upload into transient files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Buf as _;
use futures::TryStreamExt as _;
use tokio::io::AsyncWriteExt as _;
use warp::multipart::{FormData, Part};

use crate::common::error::Error;
use crate::config::LimitsConfig;
use crate::janitor::ResourceJanitor;

/// Accepted names of the repeated file field.
pub const FILE_FIELDS: [&str; 2] = ["files", "files[]"];

/// Non-file fields are small scalars; anything longer is cut off.
const MAX_FIELD_BYTES: usize = 1024;

/// One uploaded image, stored in a transient file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Location of the transient input file.
    pub path: PathBuf,
    /// Client supplied name, used to name the archive entry.
    pub logical_name: String,
    /// Number of bytes received.
    pub size_bytes: u64,
}

impl UploadItem {
    /// Create an upload item.
    pub fn new(path: impl Into<PathBuf>, logical_name: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            path: path.into(),
            logical_name: logical_name.into(),
            size_bytes,
        }
    }

    /// The archive entry name for this item once converted to `extension`.
    ///
    /// Only the extension is replaced, and only when it differs from the
    /// target (ignoring case); a name without one gets it appended.
    pub fn output_name(&self, extension: &str) -> String {
        let name = self.logical_name.as_str();
        match name.rsplit_once('.') {
            Some((stem, current)) if !stem.is_empty() => {
                if current.eq_ignore_ascii_case(extension) {
                    name.to_string()
                } else {
                    format!("{stem}.{extension}")
                }
            }
            _ => format!("{name}.{extension}"),
        }
    }
}

/// Everything read from one request body.
#[derive(Debug, Default)]
pub struct Intake {
    /// Uploaded files, in the order they appeared in the body.
    pub items: Vec<UploadItem>,
    /// Remaining scalar form fields.
    pub fields: HashMap<String, String>,
}

impl Intake {
    /// A scalar field value, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Read a multipart form, writing each file part to the upload directory.
///
/// Every file is registered with `janitor` before its first byte is
/// written, so an error half way through still leaves nothing behind once
/// the janitor is released.
pub async fn read_form(
    mut form: FormData,
    limits: &LimitsConfig,
    janitor: &mut ResourceJanitor,
) -> Result<Intake, Error> {
    let upload_dir = limits.upload_dir();
    let mut intake = Intake::default();

    while let Some(mut part) = form.try_next().await? {
        let name = part.name().to_string();

        if FILE_FIELDS.contains(&name.as_str()) {
            let Some(filename) = part.filename().filter(|f| !f.is_empty()).map(str::to_owned)
            else {
                drain(&mut part).await?;
                continue;
            };
            let position = intake.items.len() + 1;
            let item = store_file(
                &mut part,
                &filename,
                position,
                &upload_dir,
                limits.max_file_size_bytes,
                janitor,
            )
            .await?;
            tracing::debug!(name = %item.logical_name, size = item.size_bytes, "received upload");
            intake.items.push(item);
        } else {
            let value = read_field(&mut part).await?;
            intake.fields.insert(name, value);
        }
    }

    Ok(intake)
}

/// The final path component of a client supplied file name.
pub fn logical_name(filename: &str, position: usize) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| format!("image-{position}"))
}

async fn store_file(
    part: &mut Part,
    filename: &str,
    position: usize,
    upload_dir: &Path,
    limit: u64,
    janitor: &mut ResourceJanitor,
) -> Result<UploadItem, Error> {
    let logical_name = logical_name(filename, position);
    let suffix = Path::new(&logical_name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let (file, path) = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile_in(upload_dir)?
        .keep()
        .map_err(|err| Error::Upload(err.to_string()))?;
    janitor.track(&path);
    let mut file = tokio::fs::File::from_std(file);

    let mut size_bytes: u64 = 0;
    while let Some(chunk) = part.data().await.transpose()? {
        size_bytes += chunk.remaining() as u64;
        if size_bytes > limit {
            return Err(Error::FileTooLarge { name: logical_name, limit });
        }
        file.write_all(chunk.chunk()).await?;
    }
    file.flush().await?;

    Ok(UploadItem::new(path, logical_name, size_bytes))
}

async fn read_field(part: &mut Part) -> Result<String, Error> {
    let mut value = Vec::new();
    while let Some(chunk) = part.data().await.transpose()? {
        let room = MAX_FIELD_BYTES.saturating_sub(value.len());
        value.extend_from_slice(&chunk.chunk()[..chunk.remaining().min(room)]);
    }
    Ok(String::from_utf8_lossy(&value).into_owned())
}

async fn drain(part: &mut Part) -> Result<(), Error> {
    while part.data().await.transpose()?.is_some() {}
    Ok(())
}
