use crate::encoder::Converter;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "xwincap")]
#[command(about = "Capture X11 windows to PNG images or video")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Image conversion program used for PNG output
    #[arg(long, global = true, env = "XWINCAP_CONVERT", default_value = "convert")]
    pub convert_bin: String,

    /// Video encoder program
    #[arg(long, global = true, env = "XWINCAP_FFMPEG", default_value = "ffmpeg")]
    pub ffmpeg_bin: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List windows or displays
    List {
        #[command(subcommand)]
        target: ListTarget,
    },

    /// Show geometry and state of a window
    Info {
        /// Window ID (hex with 0x prefix, or decimal)
        #[arg(value_parser = parse_window_id)]
        window: u32,
    },

    /// Capture one frame to a PNG image
    Snapshot {
        /// Window ID to capture (defaults to the whole screen)
        #[arg(long, value_parser = parse_window_id)]
        window: Option<u32>,

        /// Read the window's own contents instead of its screen area
        #[arg(long, requires = "window")]
        direct: bool,

        /// How to produce the PNG
        #[arg(long, value_enum, default_value_t = Converter::External)]
        converter: Converter,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Capture frames until stopped, then encode them to a video
    Record {
        /// Window ID to record
        #[arg(long, value_parser = parse_window_id, conflicts_with = "display")]
        window: Option<u32>,

        /// Display index to record (see `list displays`)
        #[arg(long, conflicts_with = "window")]
        display: Option<usize>,

        /// Read the window's own contents instead of its screen area
        #[arg(long, requires = "window")]
        direct: bool,

        /// Directory for the intermediate frame files
        #[arg(long, default_value = "window_capture")]
        frames_dir: PathBuf,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<f64>,

        /// Keep the frame files and skip encoding
        #[arg(long)]
        no_encode: bool,

        /// Output video path (defaults to output.mp4 in the frame directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Encode the frames of an earlier capture into a video
    Assemble {
        /// Directory holding the frame files
        frames_dir: PathBuf,

        /// Output video path (defaults to output.mp4 in the frame directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Encode exported frame_<n>.png images instead of raw frames
        #[arg(long)]
        from_png: bool,
    },

    /// Convert every frame of a capture to PNG
    Export {
        /// Directory holding the frame files
        frames_dir: PathBuf,

        /// Where to write frame_<n>.png (defaults to the frame directory)
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// How to produce each PNG
        #[arg(long, value_enum, default_value_t = Converter::External)]
        converter: Converter,
    },
}

#[derive(Subcommand)]
pub enum ListTarget {
    /// List client windows with their pid and title
    Windows {
        /// Only windows owned by this process
        #[arg(long)]
        pid: Option<i32>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List named children of the root window
    Tree,
    /// List available displays
    Displays,
}

/// Parse a window ID written as `0x360000a` or `56623114`
pub fn parse_window_id(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid window ID '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_id() {
        assert_eq!(parse_window_id("0x360000A"), Ok(0x360000a));
        assert_eq!(parse_window_id("0X1f"), Ok(0x1f));
        assert_eq!(parse_window_id("56623114"), Ok(56623114));
        assert!(parse_window_id("0xzz").is_err());
        assert!(parse_window_id("window").is_err());
    }

    #[test]
    fn test_record_defaults() {
        let cli = Cli::try_parse_from(["xwincap", "record", "--window", "0x42"]).unwrap();
        match cli.command {
            Commands::Record {
                window,
                display,
                direct,
                frames_dir,
                no_encode,
                ..
            } => {
                assert_eq!(window, Some(0x42));
                assert_eq!(display, None);
                assert!(!direct);
                assert_eq!(frames_dir, PathBuf::from("window_capture"));
                assert!(!no_encode);
            }
            _ => panic!("expected record"),
        }
    }

    #[test]
    fn test_window_and_display_conflict() {
        let result =
            Cli::try_parse_from(["xwincap", "record", "--window", "1", "--display", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_direct_requires_window() {
        assert!(Cli::try_parse_from(["xwincap", "snapshot", "--direct", "-o", "a.png"]).is_err());
    }

    #[test]
    fn test_converter_names() {
        let cli = Cli::try_parse_from(["xwincap", "export", "frames", "--converter", "builtin"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                converter: Converter::Builtin,
                ..
            }
        ));
    }
}
