//! Packing compressed images into the zip returned to the client.

use std::collections::HashSet;
use std::io::{Cursor, Write as _};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::batch::CompressionOutcome;
use crate::compression::CompressedImage;

/// Errors while assembling an archive.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// No outcome was a success, so there is nothing to archive.
    #[error("no image was compressed successfully")]
    Empty,

    /// The zip container could not be written.
    #[error("could not write archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A derived output could not be read.
    #[error("could not read compressed output: {0}")]
    Io(#[from] std::io::Error),
}

/// An in-memory zip archive.
#[derive(Debug, Clone)]
pub struct Archive {
    /// The encoded zip.
    pub bytes: Vec<u8>,
    /// Entry names, in the order they were written.
    pub entries: Vec<String>,
}

/// Builds the archive from batch outcomes.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveAssembler {
    method: CompressionMethod,
}

impl Default for ArchiveAssembler {
    fn default() -> Self {
        Self { method: CompressionMethod::Deflated }
    }
}

impl ArchiveAssembler {
    /// Write every successful outcome into one zip. Failures are skipped;
    /// a batch without a single success is an error rather than an empty
    /// archive.
    pub fn assemble(&self, outcomes: &[CompressionOutcome]) -> Result<Archive, AssemblyError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(self.method);
        let mut names = EntryNames::default();
        let mut entries = Vec::new();

        for outcome in outcomes {
            let CompressionOutcome::Success { output, output_name } = outcome else {
                continue;
            };
            let contents = match output {
                CompressedImage::Bytes(bytes) => std::borrow::Cow::Borrowed(bytes.as_slice()),
                CompressedImage::File(path) => std::borrow::Cow::Owned(std::fs::read(path)?),
            };

            let name = names.claim(output_name);
            writer.start_file(name.as_str(), options)?;
            writer.write_all(&contents)?;
            entries.push(name);
        }

        if entries.is_empty() {
            return Err(AssemblyError::Empty);
        }

        let bytes = writer.finish()?.into_inner();
        Ok(Archive { bytes, entries })
    }
}

/// Hands out unique entry names: the second `a.png` becomes `a (2).png`.
#[derive(Debug, Default)]
struct EntryNames {
    taken: HashSet<String>,
}

impl EntryNames {
    fn claim(&mut self, wanted: &str) -> String {
        if self.taken.insert(wanted.to_string()) {
            return wanted.to_string();
        }

        let (stem, extension) = match wanted.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() => (stem, Some(extension)),
            _ => (wanted, None),
        };
        (2..)
            .map(|n| match extension {
                Some(extension) => format!("{stem} ({n}).{extension}"),
                None => format!("{stem} ({n})"),
            })
            .find(|candidate| self.taken.insert(candidate.clone()))
            .unwrap_or_else(|| wanted.to_string())
    }
}
