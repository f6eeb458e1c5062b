// Local media transforms
//
// Thin wrappers over ffmpeg for the file-local commands (filter, split, combine, titlecard):
// - Commands: argument builders and process execution
// - Processor: the transforms and their options

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub use commands::{MediaCommand, MediaCommandBuilder};
pub use processor::{CombineOptions, FilterOptions, MediaTransform, SplitOptions, TitlecardOptions, TransformKind};

use crate::config::MediaConfig;
use crate::error::Result;
use crate::naming::NamingConfig;

/// A single-shot operation turning one local file into one or more output files.
#[async_trait]
pub trait LocalTransform: Send + Sync {
    /// Short name used in log lines
    fn description(&self) -> &str;

    /// Placement of the outputs; its folder is created once before the run.
    fn naming(&self) -> &NamingConfig;

    /// Paths `apply` will write for `input`, without touching the filesystem.
    fn outputs(&self, input: &Path) -> Result<Vec<PathBuf>>;

    /// Transform `input`, returning the written paths.
    async fn apply(&self, input: &Path) -> Result<Vec<PathBuf>>;

    /// Check that the underlying tool can be run.
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for local transform instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the ffmpeg-backed transform for `kind`, rejecting unusable options.
    pub fn create_transform(config: &MediaConfig, kind: TransformKind) -> Result<Box<dyn LocalTransform>> {
        kind.validate()?;
        Ok(Box::new(MediaTransform::new(config, kind)))
    }
}
