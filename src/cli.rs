use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Process files with the Auphonic service (create, upload, start, poll, download, delete)
    Auphonic {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Auphonic account username
        #[arg(long)]
        username: Option<String>,

        /// Auphonic account password
        #[arg(long)]
        password: Option<String>,

        /// Loudness target in LUFS
        #[arg(long, allow_hyphen_values = true)]
        loudness_target: Option<i32>,

        /// Enable noise reduction
        #[arg(long)]
        noise_reduction: bool,

        /// Delay between status polls in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,

        #[command(flatten)]
        scheduling: SchedulingArgs,
    },

    /// Apply ffmpeg video and/or audio filters to each file
    Filter {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Video filter string passed to ffmpeg
        #[arg(long)]
        video_filter: Option<String>,

        /// Audio filter string passed to ffmpeg
        #[arg(long)]
        audio_filter: Option<String>,

        /// Change video and audio speed by this factor, e.g. 1.2
        #[arg(long)]
        speed: Option<f64>,

        #[command(flatten)]
        scheduling: SchedulingArgs,
    },

    /// Split each file into separate video and audio files
    Split {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Folder for output files [split]
        #[arg(long)]
        output_folder: Option<PathBuf>,

        /// Suffix for output file names
        #[arg(long)]
        output_suffix: Option<String>,

        /// Extension for the video output
        #[arg(long, default_value = ".m4v")]
        output_video_extension: String,

        /// Extension for the audio output
        #[arg(long, default_value = ".m4a")]
        output_audio_extension: String,

        #[command(flatten)]
        scheduling: SchedulingArgs,
    },

    /// Combine each video file with its matching audio file
    Combine {
        /// Input video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Extension of the audio files
        #[arg(long, default_value = ".m4a")]
        audio_extension: String,

        /// Suffix of the audio file names
        #[arg(long)]
        audio_suffix: Option<String>,

        /// Folder containing the audio files (default: next to the video)
        #[arg(long)]
        audio_folder: Option<PathBuf>,

        #[command(flatten)]
        scheduling: SchedulingArgs,
    },

    /// Cover the opening seconds of each video with a titlecard image
    #[command(visible_alias = "remove-titlecard")]
    Titlecard {
        /// Input video files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,

        /// Replacement card image (default: the frame right after the card)
        #[arg(long)]
        card_image: Option<PathBuf>,

        /// Seconds covered by the card
        #[arg(short = 'd', long, default_value_t = 1.0)]
        card_duration: f64,

        #[command(flatten)]
        scheduling: SchedulingArgs,
    },

    /// Write a configuration file with default values
    InitConfig {
        /// Where to write the file
        #[arg(default_value = "mediabatch.toml")]
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Output placement flags shared by the commands that write one file per input.
#[derive(Debug, Clone, Default, ClapArgs)]
pub struct OutputArgs {
    /// Folder for output files
    #[arg(long)]
    pub output_folder: Option<PathBuf>,

    /// Suffix appended to output file names
    #[arg(long)]
    pub output_suffix: Option<String>,

    /// Extension for output files (default: same as input)
    #[arg(long)]
    pub output_extension: Option<String>,
}

#[derive(Debug, Clone, Default, ClapArgs)]
pub struct SchedulingArgs {
    /// How files are dispatched
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Files per batch for the batched policy
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Keep going after a failed file and report all failures at the end
    #[arg(long)]
    pub collect_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// One file at a time
    Sequential,
    /// All files at once
    Concurrent,
    /// Fixed-size groups, one group at a time
    Batched,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn parses_auphonic_command() {
        let args = Args::parse_from([
            "mediabatch",
            "auphonic",
            "a.wav",
            "b.wav",
            "--output-folder",
            "out",
            "--loudness-target=-16",
            "--policy",
            "batched",
            "--batch-size",
            "2",
            "--collect-all",
        ]);
        match args.command {
            Commands::Auphonic {
                inputs,
                output,
                loudness_target,
                noise_reduction,
                scheduling,
                ..
            } => {
                assert_eq!(inputs, vec![PathBuf::from("a.wav"), PathBuf::from("b.wav")]);
                assert_eq!(output.output_folder, Some(PathBuf::from("out")));
                assert_eq!(loudness_target, Some(-16));
                assert!(!noise_reduction);
                assert_eq!(scheduling.policy, Some(PolicyArg::Batched));
                assert_eq!(scheduling.batch_size, Some(2));
                assert!(scheduling.collect_all);
            }
            _ => panic!("expected Auphonic command"),
        }
    }

    #[test]
    fn parses_filter_with_global_flags() {
        let args = Args::parse_from(["mediabatch", "filter", "clip.mp4", "--speed", "1.5", "-v"]);
        assert!(args.verbose);
        match args.command {
            Commands::Filter { speed, video_filter, .. } => {
                assert_eq!(speed, Some(1.5));
                assert!(video_filter.is_none());
            }
            _ => panic!("expected Filter command"),
        }
    }

    #[test]
    fn split_defaults() {
        let args = Args::parse_from(["mediabatch", "split", "talk.mov"]);
        match args.command {
            Commands::Split {
                output_video_extension,
                output_audio_extension,
                output_folder,
                ..
            } => {
                assert_eq!(output_video_extension, ".m4v");
                assert_eq!(output_audio_extension, ".m4a");
                assert!(output_folder.is_none());
            }
            _ => panic!("expected Split command"),
        }
    }

    #[test]
    fn parses_titlecard_under_both_names() {
        for name in ["titlecard", "remove-titlecard"] {
            let args = Args::parse_from(["mediabatch", name, "talk.mp4", "-d", "2.5", "--card-image", "card.png"]);
            match args.command {
                Commands::Titlecard {
                    card_duration,
                    card_image,
                    ..
                } => {
                    assert_eq!(card_duration, 2.5);
                    assert_eq!(card_image, Some(PathBuf::from("card.png")));
                }
                _ => panic!("expected Titlecard command"),
            }
        }

        match Args::parse_from(["mediabatch", "titlecard", "talk.mp4"]).command {
            Commands::Titlecard { card_duration, .. } => assert_eq!(card_duration, 1.0),
            _ => panic!("expected Titlecard command"),
        }
    }

    #[test]
    fn inputs_are_required() {
        assert!(Args::try_parse_from(["mediabatch", "combine"]).is_err());
    }

    #[test]
    fn cli_verify() {
        Args::command().debug_assert();
    }
}
