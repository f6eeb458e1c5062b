use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use super::{LocalTransform, MediaCommand, MediaCommandBuilder};
use crate::config::MediaConfig;
use crate::error::{MediaBatchError, Result};
use crate::naming::{NamingConfig, add_suffix, change_extension, change_folder};

/// Options of the `filter` command.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    pub naming: NamingConfig,
    pub video_filter: Option<String>,
    pub audio_filter: Option<String>,
    /// Playback speed factor applied to both tracks
    pub speed: Option<f64>,
}

impl FilterOptions {
    /// The full `-vf` chain: the user's filter followed by the speed adjustment.
    pub fn video_chain(&self) -> Option<String> {
        let speed = self.speed.map(|factor| format!("setpts={}*PTS", 1.0 / factor));
        join_filters(self.video_filter.as_deref(), speed)
    }

    /// The full `-af` chain.
    pub fn audio_chain(&self) -> Option<String> {
        let speed = self.speed.map(|factor| format!("atempo={}", factor));
        join_filters(self.audio_filter.as_deref(), speed)
    }
}

fn join_filters(user: Option<&str>, extra: Option<String>) -> Option<String> {
    let parts: Vec<String> = user
        .filter(|f| !f.trim().is_empty())
        .map(str::to_string)
        .into_iter()
        .chain(extra)
        .collect();

    if parts.is_empty() { None } else { Some(parts.join(",")) }
}

/// Options of the `split` command. The naming extension is ignored; each track has its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOptions {
    pub naming: NamingConfig,
    pub video_extension: String,
    pub audio_extension: String,
}

/// Options of the `combine` command.
#[derive(Debug, Clone, PartialEq)]
pub struct CombineOptions {
    pub naming: NamingConfig,
    pub audio_extension: String,
    pub audio_suffix: Option<String>,
    /// Where the audio files live; defaults to the video's folder
    pub audio_folder: Option<PathBuf>,
}

impl CombineOptions {
    /// Audio file paired with `video`: same stem, audio extension, then suffix, then folder.
    pub fn audio_input(&self, video: &Path) -> PathBuf {
        let mut audio = change_extension(video, &self.audio_extension);
        if let Some(suffix) = self.audio_suffix.as_deref().filter(|s| !s.is_empty()) {
            audio = add_suffix(&audio, suffix);
        }
        if let Some(folder) = &self.audio_folder {
            audio = change_folder(&audio, folder);
        }
        audio
    }
}

/// Options of the `titlecard` command.
#[derive(Debug, Clone, PartialEq)]
pub struct TitlecardOptions {
    pub naming: NamingConfig,
    /// Image laid over the opening; without one, the frame right after the card is used
    pub card_image: Option<PathBuf>,
    /// Seconds from the start covered by the card
    pub card_duration: f64,
}

impl TitlecardOptions {
    /// Where the frame grabbed from the video goes when no card image is given.
    pub fn extracted_card(&self, output: &Path) -> Option<PathBuf> {
        match self.card_image {
            Some(_) => None,
            None => Some(change_extension(output, ".png")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransformKind {
    Filter(FilterOptions),
    Split(SplitOptions),
    Combine(CombineOptions),
    Titlecard(TitlecardOptions),
}

impl TransformKind {
    pub fn naming(&self) -> &NamingConfig {
        match self {
            TransformKind::Filter(options) => &options.naming,
            TransformKind::Split(options) => &options.naming,
            TransformKind::Combine(options) => &options.naming,
            TransformKind::Titlecard(options) => &options.naming,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TransformKind::Filter(options) => {
                if let Some(speed) = options.speed
                    && !(speed.is_finite() && speed > 0.0)
                {
                    return Err(MediaBatchError::Config(format!("Speed must be a positive number, got {}", speed)));
                }
                Ok(())
            }
            TransformKind::Split(options) => {
                if options.video_extension == options.audio_extension {
                    return Err(MediaBatchError::Config(
                        "Video and audio extensions must differ for split".to_string(),
                    ));
                }
                Ok(())
            }
            TransformKind::Combine(options) => {
                if options.audio_extension.trim().is_empty() {
                    return Err(MediaBatchError::Config("Audio extension must not be empty".to_string()));
                }
                Ok(())
            }
            TransformKind::Titlecard(options) => {
                if !(options.card_duration.is_finite() && options.card_duration > 0.0) {
                    return Err(MediaBatchError::Config(format!(
                        "Card duration must be a positive number of seconds, got {}",
                        options.card_duration
                    )));
                }
                Ok(())
            }
        }
    }
}

/// ffmpeg-backed implementation of [`LocalTransform`].
pub struct MediaTransform {
    builder: MediaCommandBuilder,
    kind: TransformKind,
    description: String,
}

impl MediaTransform {
    pub fn new(config: &MediaConfig, kind: TransformKind) -> Self {
        let description = match &kind {
            TransformKind::Filter(_) => "filter",
            TransformKind::Split(_) => "split",
            TransformKind::Combine(_) => "combine",
            TransformKind::Titlecard(_) => "titlecard",
        }
        .to_string();

        Self {
            builder: MediaCommandBuilder::new(&config.binary_path),
            kind,
            description,
        }
    }

    /// The ffmpeg invocations for `input`, in run order, and the files they write.
    pub fn plan(&self, input: &Path) -> Result<(Vec<MediaCommand>, Vec<PathBuf>)> {
        match &self.kind {
            TransformKind::Filter(options) => {
                let output = options.naming.resolve(input)?;
                let video = options.video_chain();
                let audio = options.audio_chain();
                let command = self
                    .builder
                    .filter(input, output.as_path(), video.as_deref(), audio.as_deref());
                Ok((vec![command], vec![output]))
            }
            TransformKind::Split(options) => {
                let video = options.naming.with_extension(&options.video_extension).resolve(input)?;
                let audio = options.naming.with_extension(&options.audio_extension).resolve(input)?;
                let command = self.builder.split(input, video.as_path(), audio.as_path());
                Ok((vec![command], vec![video, audio]))
            }
            TransformKind::Combine(options) => {
                let output = options.naming.resolve(input)?;
                let audio = options.audio_input(input);
                let command = self.builder.combine(input, audio.as_path(), output.as_path());
                Ok((vec![command], vec![output]))
            }
            TransformKind::Titlecard(options) => {
                let output = options.naming.resolve(input)?;
                let duration = options.card_duration;
                match (&options.card_image, options.extracted_card(&output)) {
                    (Some(image), _) => {
                        let overlay = self.builder.overlay_card(input, image.as_path(), output.as_path(), duration);
                        Ok((vec![overlay], vec![output]))
                    }
                    (None, Some(card)) => {
                        let extract = self.builder.extract_frame(input, duration, card.as_path());
                        let overlay = self.builder.overlay_card(input, card.as_path(), output.as_path(), duration);
                        Ok((vec![extract, overlay], vec![output, card]))
                    }
                    (None, None) => Err(MediaBatchError::Config("No titlecard image available".to_string())),
                }
            }
        }
    }
}

#[async_trait]
impl LocalTransform for MediaTransform {
    fn description(&self) -> &str {
        &self.description
    }

    fn naming(&self) -> &NamingConfig {
        self.kind.naming()
    }

    fn outputs(&self, input: &Path) -> Result<Vec<PathBuf>> {
        self.plan(input).map(|(_, outputs)| outputs)
    }

    async fn apply(&self, input: &Path) -> Result<Vec<PathBuf>> {
        let (commands, outputs) = self.plan(input)?;

        match &self.kind {
            TransformKind::Combine(options) => {
                let audio = options.audio_input(input);
                if fs::metadata(&audio).await.is_err() {
                    return Err(MediaBatchError::FileNotFound(format!(
                        "No audio for {}: {}",
                        input.display(),
                        audio.display()
                    )));
                }
            }
            TransformKind::Titlecard(TitlecardOptions {
                card_image: Some(image),
                ..
            }) => {
                if fs::metadata(image).await.is_err() {
                    return Err(MediaBatchError::FileNotFound(format!("Titlecard image {}", image.display())));
                }
            }
            _ => {}
        }

        info!(
            "Running {} on {} -> {}",
            self.description,
            input.display(),
            outputs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
        );
        for command in &commands {
            debug!("{} step for {}: {}", self.description, input.display(), command.description);
            command.execute().await?;
        }
        debug!("{} finished for {}", self.description, input.display());
        Ok(outputs)
    }

    async fn check_availability(&self) -> Result<()> {
        self.builder
            .version_check()
            .execute()
            .await
            .map_err(|e| MediaBatchError::Media(format!("Media processor not found: {}", e)))?;
        info!("Media processor is available");
        Ok(())
    }
}
