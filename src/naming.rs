//! Output path resolution.
//!
//! Output names are a pure function of the input path and a [`NamingConfig`]:
//! `<folder>/<stem><suffix><extension>`. There is no counter-based
//! disambiguation, so running the same batch twice overwrites the earlier
//! output.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{MediaBatchError, Result};

/// Where and under which name output files are placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingConfig {
    pub folder: PathBuf,
    #[serde(default)]
    pub suffix: String,
    /// Replaces the input's extension when set. Accepted with or without the leading dot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

impl NamingConfig {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(folder: P, suffix: S, extension: Option<&str>) -> Self {
        Self {
            folder: folder.into(),
            suffix: suffix.into(),
            extension: extension.map(str::to_string),
        }
    }

    /// Same placement, different extension. Used when one input yields several outputs.
    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            extension: Some(extension.to_string()),
            ..self.clone()
        }
    }

    /// Resolve the output path for `input`.
    pub fn resolve(&self, input: &Path) -> Result<PathBuf> {
        resolve_output_path(input, self)
    }
}

/// Compute `<folder>/<stem><suffix><ext>` for `input`.
pub fn resolve_output_path(input: &Path, config: &NamingConfig) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| MediaBatchError::Config(format!("Invalid input filename: {}", input.display())))?
        .to_string_lossy();

    let extension = match config.extension.as_deref() {
        Some(ext) if !ext.is_empty() => normalize_extension(ext),
        _ => input
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default(),
    };

    Ok(config.folder.join(format!("{}{}{}", stem, config.suffix, extension)))
}

/// Create the output folder if it is missing. Called once per run, before any job starts.
pub async fn ensure_output_folder(config: &NamingConfig) -> Result<()> {
    debug!("Ensuring output folder {}", config.folder.display());
    fs::create_dir_all(&config.folder).await?;
    Ok(())
}

/// Swap the extension of `path`, keeping its folder.
pub fn change_extension(path: &Path, extension: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, normalize_extension(extension)))
}

/// Insert `suffix` between the stem and the extension of `path`.
pub fn add_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{}{}{}", stem, suffix, extension))
}

/// Move `path` into `folder`, keeping its file name.
pub fn change_folder(path: &Path, folder: &Path) -> PathBuf {
    match path.file_name() {
        Some(name) => folder.join(name),
        None => folder.to_path_buf(),
    }
}

/// Sibling file a download is streamed into before being renamed to `destination`.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}
