use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaBatchError, Result};

/// One ffmpeg invocation, built up argument by argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create an empty invocation of `binary_path`
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    /// Copy video stream
    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    /// Copy audio stream
    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    /// Disable audio
    pub fn no_audio(self) -> Self {
        self.arg("-an")
    }

    /// Select a stream, e.g. `1:a:0`
    pub fn map<S: Into<String>>(self, stream: S) -> Self {
        self.arg("-map").arg(stream)
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Add audio filter
    pub fn audio_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-af").arg(filter)
    }

    /// Add a filter graph over all inputs
    pub fn complex_filter<S: Into<String>>(self, graph: S) -> Self {
        self.arg("-filter_complex").arg(graph)
    }

    /// Seek the next input to `seconds` before decoding
    pub fn seek(self, seconds: f64) -> Self {
        self.arg("-ss").arg(seconds.to_string())
    }

    /// Stop after `count` video frames
    pub fn frames(self, count: u32) -> Self {
        self.args(["-frames:v".to_string(), count.to_string()])
    }

    /// Run to completion. Fails with the tail of stderr when the process exits non-zero.
    pub async fn execute(&self) -> Result<()> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| MediaBatchError::Media(format!("Failed to execute {}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(MediaBatchError::Media(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                tail.join("\n")
            )));
        }

        Ok(())
    }
}

/// Builds the ffmpeg invocations behind the local commands.
#[derive(Debug, Clone)]
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Re-encode `input` through the given filter chains. Either chain may be absent.
    pub fn filter<P: AsRef<Path>>(
        &self,
        input: P,
        output: P,
        video_filter: Option<&str>,
        audio_filter: Option<&str>,
    ) -> MediaCommand {
        let mut cmd = MediaCommand::new(&self.binary_path, "Filter").overwrite().input(input);
        if let Some(filter) = video_filter {
            cmd = cmd.video_filter(filter);
        }
        if let Some(filter) = audio_filter {
            cmd = cmd.audio_filter(filter);
        }
        cmd.output(output)
    }

    /// Stream-copy the video and audio tracks of `input` into two separate files.
    pub fn split<P: AsRef<Path>>(&self, input: P, video_output: P, audio_output: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Split")
            .overwrite()
            .input(input)
            .no_audio()
            .copy_video()
            .output(video_output)
            .no_video()
            .copy_audio()
            .output(audio_output)
    }

    /// Mux the video of `video` with the audio of `audio`, encoding the audio to AAC.
    pub fn combine<P: AsRef<Path>>(&self, video: P, audio: P, output: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Combine")
            .overwrite()
            .input(video)
            .input(audio)
            .map("0:v:0")
            .map("1:a:0")
            .copy_video()
            .audio_codec("aac")
            .output(output)
    }

    /// Grab the single video frame at `at_seconds` into `image`.
    pub fn extract_frame<P: AsRef<Path>>(&self, input: P, at_seconds: f64, image: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Frame extraction")
            .overwrite()
            .seek(at_seconds)
            .input(input)
            .frames(1)
            .output(image)
    }

    /// Cover the first `seconds` of `input` with `image`.
    pub fn overlay_card<P: AsRef<Path>>(&self, input: P, image: P, output: P, seconds: f64) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Titlecard")
            .overwrite()
            .input(input)
            .input(image)
            .complex_filter(format!("[0:v][1:v]overlay=0:0:enable='between(t,0,{})'", seconds))
            .output(output)
    }

    /// `ffmpeg -version`, used to check the binary runs
    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}
