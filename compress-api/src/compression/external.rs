//! Compression through an external command line quantizer such as
//! `pngquant`.
//!
//! The tool is expected to write its result to a file derived from the
//! input path (`<input>-min.png`). Arguments are templated: `{input}`,
//! `{output}` and `{colors}` are substituted per item.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use super::{
    CompressedImage, CompressionError, CompressionFailure, CompressionParameters, Compressor,
    Slot, TARGET_EXTENSION,
};
use crate::config::ExternalToolConfig;
use crate::intake::UploadItem;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";
const COLORS_PLACEHOLDER: &str = "{colors}";

/// Suffix appended to the input path to name the derived output.
pub const DERIVED_SUFFIX: &str = "-min";

/// Runs a configured program once per image.
#[derive(Debug, Clone)]
pub struct ExternalCompressor {
    program: String,
    args: Vec<String>,
    no_dither_args: Vec<String>,
}

impl ExternalCompressor {
    /// Build the compressor from its configuration section.
    pub fn from_config(config: &ExternalToolConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            no_dither_args: config.no_dither_args.clone(),
        }
    }

    /// The arguments passed to the program for one item.
    pub fn command_args(
        &self,
        item: &UploadItem,
        output: &std::path::Path,
        params: &CompressionParameters,
    ) -> Vec<String> {
        let input = item.path.to_string_lossy();
        let output = output.to_string_lossy();
        let colors = params.palette_size.to_string();

        let extra = match params.dither {
            true => &[][..],
            false => &self.no_dither_args[..],
        };

        extra
            .iter()
            .chain(self.args.iter())
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
                    .replace(COLORS_PLACEHOLDER, &colors)
            })
            .collect()
    }

    fn output_path(item: &UploadItem) -> PathBuf {
        let mut path = item.path.clone().into_os_string();
        path.push(DERIVED_SUFFIX);
        path.push(".");
        path.push(TARGET_EXTENSION);
        PathBuf::from(path)
    }
}

impl Compressor for ExternalCompressor {
    async fn compress(
        &self,
        item: &UploadItem,
        params: &CompressionParameters,
        slot: Slot,
    ) -> Result<CompressedImage, CompressionError> {
        // Held until the child is gone; `kill_on_drop` ends it with this future.
        let _slot = slot;
        let output_path = Self::output_path(item);
        let args = self.command_args(item, &output_path, params);
        tracing::trace!(program = %self.program, ?args, "running external compressor");

        // The batch drops this future on timeout; the child must die with it.
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| {
                let failure = CompressionFailure::Spawn { program: self.program.clone(), source };
                CompressionError::new(&item.logical_name, failure)
            })?;

        if !output.status.success() {
            let status = output
                .status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let failure = CompressionFailure::ExitStatus {
                program: self.program.clone(),
                status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            };
            return Err(CompressionError::new(&item.logical_name, failure));
        }

        tokio::fs::metadata(&output_path)
            .await
            .map_err(|err| CompressionError::new(&item.logical_name, err))?;

        Ok(CompressedImage::File(output_path))
    }

    fn derived_path(&self, item: &UploadItem) -> Option<PathBuf> {
        Some(Self::output_path(item))
    }
}
