//! Video assembly from captured frames
//!
//! Frame files are concatenated into one raw BGRA stream which FFmpeg
//! encodes to H.264. Intermediates are only removed after FFmpeg succeeds.

use crate::encoder::png::png_path;
use crate::encoder::tool::{ToolRunner, Tools};
use crate::frame::{read_frame_file, FrameFileError, FrameHeader};
use crate::metadata::metadata_path;
use crate::storage::{collect_frames, remove_files, remove_if_exists};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Name of the concatenated raw stream inside the frame directory
pub const RAW_FILE_NAME: &str = "frames.raw";

pub const LOW_FRAME_RATE: u32 = 10;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const HIGH_FRAME_RATE: u32 = 60;

/// Fewer frames than this play at the low rate
const LOW_RATE_BELOW: usize = 30;
/// More frames than this play at the high rate
const HIGH_RATE_ABOVE: usize = 100;

/// Playback rate for a clip of `frame_count` frames
pub fn select_frame_rate(frame_count: usize) -> u32 {
    if frame_count < LOW_RATE_BELOW {
        LOW_FRAME_RATE
    } else if frame_count > HIGH_RATE_ABOVE {
        HIGH_FRAME_RATE
    } else {
        DEFAULT_FRAME_RATE
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSummary {
    pub frames: usize,
    /// Truncated frames left out of the video
    pub skipped: usize,
    pub frame_rate: u32,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    /// Nothing to encode; no program was run
    NoFrames,
    Encoded(VideoSummary),
}

/// Encode the frame files of `frames_dir` into a video at `output`
///
/// On success the frame files, the raw stream and the run metadata are
/// deleted. On failure the frame files stay so the run can be assembled
/// again; the raw stream is always removed.
pub fn assemble_video(
    frames_dir: &Path,
    output: &Path,
    tools: &Tools,
    runner: &dyn ToolRunner,
) -> Result<AssemblyOutcome> {
    let frames = collect_frames(frames_dir);
    if frames.is_empty() {
        log::warn!("no frames found in {}", frames_dir.display());
        return Ok(AssemblyOutcome::NoFrames);
    }

    let raw_path = frames_dir.join(RAW_FILE_NAME);
    let concatenated = concatenate_frames(&frames, &raw_path);
    let (header, written, skipped) = match concatenated {
        Ok((Some(header), written, skipped)) => (header, written, skipped),
        Ok((None, _, skipped)) => {
            remove_if_exists(&raw_path)?;
            anyhow::bail!(
                "All {} frames in {} are truncated",
                skipped,
                frames_dir.display()
            );
        }
        Err(e) => {
            remove_if_exists(&raw_path)?;
            return Err(e);
        }
    };

    let frame_rate = select_frame_rate(written);
    let args = rawvideo_args(header, frame_rate, &raw_path, output);

    log::info!(
        "encoding {} frames of {}x{} at {} fps",
        written,
        header.width,
        header.height,
        frame_rate
    );
    let encoded = runner.run(&tools.ffmpeg, &args);
    remove_if_exists(&raw_path)?;
    encoded.with_context(|| {
        format!(
            "Failed to encode video; frames kept in {}",
            frames_dir.display()
        )
    })?;

    remove_files(&frames)?;
    remove_if_exists(&metadata_path(frames_dir))?;

    Ok(AssemblyOutcome::Encoded(VideoSummary {
        frames: written,
        skipped,
        frame_rate,
        output: output.to_path_buf(),
    }))
}

/// Append every frame's packed rows to `raw_path`
///
/// The first readable frame's header is trusted for the whole run. Returns
/// that header (none if every frame is truncated) with the number of frames
/// written and skipped.
fn concatenate_frames(
    frames: &[PathBuf],
    raw_path: &Path,
) -> Result<(Option<FrameHeader>, usize, usize)> {
    let file = File::create(raw_path)
        .with_context(|| format!("Failed to create {}", raw_path.display()))?;
    let mut out = BufWriter::new(file);

    let pb = ProgressBar::new(frames.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Concatenating [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );

    let mut header = None;
    let mut written = 0;
    let mut skipped = 0;

    for path in frames {
        pb.inc(1);
        let frame = match read_frame_file(path) {
            Ok(frame) => frame,
            Err(FrameFileError::Truncated {
                expected, found, ..
            }) => {
                log::warn!(
                    "skipping {}: {} of {} bytes present",
                    path.display(),
                    found,
                    expected
                );
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let expected = *header.get_or_insert(frame.header());
        if frame.header() != expected {
            return Err(FrameFileError::HeaderMismatch {
                path: path.clone(),
                expected,
                found: frame.header(),
            }
            .into());
        }

        frame
            .write_packed(&mut out)
            .with_context(|| format!("Failed to write {}", raw_path.display()))?;
        written += 1;
    }

    out.flush()
        .with_context(|| format!("Failed to write {}", raw_path.display()))?;
    pb.finish_and_clear();

    Ok((header, written, skipped))
}

fn rawvideo_args(header: FrameHeader, frame_rate: u32, raw_path: &Path, output: &Path) -> Vec<OsString> {
    let video_size = format!("{}x{}", header.width, header.height);
    let frame_rate = frame_rate.to_string();
    let mut args: Vec<OsString> = [
        "-f",
        "rawvideo",
        "-pixel_format",
        "bgra",
        "-video_size",
        video_size.as_str(),
        "-framerate",
        frame_rate.as_str(),
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(raw_path.into());
    args.extend(
        ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-y"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Encode exported `frame_<n>.png` images into a video
///
/// The images are inputs, not intermediates, and are left in place.
pub fn images_to_video(
    images_dir: &Path,
    output: &Path,
    tools: &Tools,
    runner: &dyn ToolRunner,
) -> Result<AssemblyOutcome> {
    let count = (0..)
        .take_while(|&index| png_path(images_dir, index).is_file())
        .count();
    if count == 0 {
        log::warn!("no frame_<n>.png images found in {}", images_dir.display());
        return Ok(AssemblyOutcome::NoFrames);
    }

    let frame_rate = select_frame_rate(count);
    let mut args: Vec<OsString> = vec!["-framerate".into(), frame_rate.to_string().into(), "-i".into()];
    args.push(images_dir.join("frame_%d.png").into());
    args.extend(
        ["-c:v", "libx264", "-pix_fmt", "yuv420p", "-y"]
            .iter()
            .map(OsString::from),
    );
    args.push(output.into());

    runner
        .run(&tools.ffmpeg, &args)
        .context("Failed to encode image sequence")?;

    Ok(AssemblyOutcome::Encoded(VideoSummary {
        frames: count,
        skipped: 0,
        frame_rate,
        output: output.to_path_buf(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::tool::testing::RecordingRunner;
    use crate::frame::tests::pattern_frame;
    use crate::frame::{FrameBuffer, HEADER_LEN};
    use crate::storage::{frame_path, FrameWriter};
    use std::fs;
    use tempfile::TempDir;

    fn write_frames(dir: &Path, frames: &[FrameBuffer]) {
        let mut writer = FrameWriter::create(dir).unwrap();
        for frame in frames {
            writer.write(frame).unwrap();
        }
    }

    #[test]
    fn test_frame_rate_thresholds() {
        assert_eq!(select_frame_rate(10), LOW_FRAME_RATE);
        assert_eq!(select_frame_rate(29), LOW_FRAME_RATE);
        assert_eq!(select_frame_rate(30), DEFAULT_FRAME_RATE);
        assert_eq!(select_frame_rate(50), DEFAULT_FRAME_RATE);
        assert_eq!(select_frame_rate(100), DEFAULT_FRAME_RATE);
        assert_eq!(select_frame_rate(101), HIGH_FRAME_RATE);
        assert_eq!(select_frame_rate(150), HIGH_FRAME_RATE);
    }

    #[test]
    fn test_no_frames_runs_nothing() {
        let dir = TempDir::new().unwrap();
        let runner = RecordingRunner::default();

        let outcome = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        )
        .unwrap();

        assert_eq!(outcome, AssemblyOutcome::NoFrames);
        assert!(runner.calls().is_empty());
        assert!(!dir.path().join(RAW_FILE_NAME).exists());
    }

    #[test]
    fn test_five_frames_concatenate_in_order() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<_> = (0..5).map(|i| pattern_frame(4, 4, 16, i * 50)).collect();
        write_frames(dir.path(), &frames);
        let output = dir.path().join("output.mp4");
        let runner = RecordingRunner::default();

        let outcome = assemble_video(dir.path(), &output, &Tools::default(), &runner).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.program, "ffmpeg");
        assert_eq!(call.arg_after("-video_size").unwrap(), "4x4");
        assert_eq!(call.arg_after("-framerate").unwrap(), "10");
        assert_eq!(call.arg_after("-pixel_format").unwrap(), "bgra");
        assert_eq!(call.args.last().unwrap(), &OsString::from(&output));

        let expected: Vec<u8> = frames.iter().flat_map(|f| f.data.clone()).collect();
        assert_eq!(call.input.as_deref(), Some(expected.as_slice()));

        assert_eq!(
            outcome,
            AssemblyOutcome::Encoded(VideoSummary {
                frames: 5,
                skipped: 0,
                frame_rate: LOW_FRAME_RATE,
                output: output.clone(),
            })
        );
        assert!(collect_frames(dir.path()).is_empty());
        assert!(!dir.path().join(RAW_FILE_NAME).exists());
    }

    #[test]
    fn test_failed_encode_keeps_frames() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[pattern_frame(4, 4, 16, 0), pattern_frame(4, 4, 16, 1)]);
        let runner = RecordingRunner::failing();

        let result = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        );

        assert!(result.is_err());
        assert_eq!(runner.calls().len(), 1);
        assert_eq!(collect_frames(dir.path()).len(), 2);
        assert!(!dir.path().join(RAW_FILE_NAME).exists());
    }

    #[test]
    fn test_header_mismatch_aborts() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[pattern_frame(4, 4, 16, 0)]);
        // A frame from a differently sized run slipped in
        crate::frame::write_frame_file(&frame_path(dir.path(), 1), &pattern_frame(2, 2, 8, 0))
            .unwrap();
        let runner = RecordingRunner::default();

        let err = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<FrameFileError>(),
            Some(FrameFileError::HeaderMismatch { .. })
        ));
        assert!(runner.calls().is_empty());
        assert_eq!(collect_frames(dir.path()).len(), 2);
        assert!(!dir.path().join(RAW_FILE_NAME).exists());
    }

    #[test]
    fn test_truncated_frame_is_skipped() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<_> = (0..3).map(|i| pattern_frame(4, 4, 16, i)).collect();
        write_frames(dir.path(), &frames);

        let last = frame_path(dir.path(), 2);
        let bytes = fs::read(&last).unwrap();
        fs::write(&last, &bytes[..HEADER_LEN + 10]).unwrap();
        let runner = RecordingRunner::default();

        let outcome = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        )
        .unwrap();

        match outcome {
            AssemblyOutcome::Encoded(summary) => {
                assert_eq!(summary.frames, 2);
                assert_eq!(summary.skipped, 1);
            }
            other => panic!("expected a video, got {:?}", other),
        }
        let expected: Vec<u8> = frames[..2].iter().flat_map(|f| f.data.clone()).collect();
        assert_eq!(runner.calls()[0].input.as_deref(), Some(expected.as_slice()));
    }

    #[test]
    fn test_truncated_first_frame_is_skipped() {
        let dir = TempDir::new().unwrap();
        let frames: Vec<_> = (0..3).map(|i| pattern_frame(4, 4, 16, i)).collect();
        write_frames(dir.path(), &frames);

        let first = frame_path(dir.path(), 0);
        let bytes = fs::read(&first).unwrap();
        fs::write(&first, &bytes[..5]).unwrap();
        let runner = RecordingRunner::default();

        let outcome = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        )
        .unwrap();

        match outcome {
            AssemblyOutcome::Encoded(summary) => {
                assert_eq!(summary.frames, 2);
                assert_eq!(summary.skipped, 1);
            }
            other => panic!("expected a video, got {:?}", other),
        }
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arg_after("-video_size").unwrap(), "4x4");
        let expected: Vec<u8> = frames[1..].iter().flat_map(|f| f.data.clone()).collect();
        assert_eq!(calls[0].input.as_deref(), Some(expected.as_slice()));
    }

    #[test]
    fn test_all_frames_truncated_fails() {
        let dir = TempDir::new().unwrap();
        write_frames(dir.path(), &[pattern_frame(4, 4, 16, 0), pattern_frame(4, 4, 16, 1)]);
        for index in 0..2 {
            fs::write(frame_path(dir.path(), index), [0u8; 5]).unwrap();
        }
        let runner = RecordingRunner::default();

        let result = assemble_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        );

        assert!(result.is_err());
        assert!(runner.calls().is_empty());
        assert_eq!(collect_frames(dir.path()).len(), 2);
        assert!(!dir.path().join(RAW_FILE_NAME).exists());
    }

    #[test]
    fn test_image_sequence_video() {
        let dir = TempDir::new().unwrap();
        for index in 0..40 {
            fs::write(png_path(dir.path(), index), b"png").unwrap();
        }
        let runner = RecordingRunner::default();

        let outcome = images_to_video(
            dir.path(),
            &dir.path().join("output.mp4"),
            &Tools::default(),
            &runner,
        )
        .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[0].arg_after("-framerate").unwrap(), "30");
        assert_eq!(
            calls[0].arg_after("-i").unwrap(),
            &OsString::from(dir.path().join("frame_%d.png"))
        );
        assert!(matches!(outcome, AssemblyOutcome::Encoded(VideoSummary { frames: 40, .. })));
        // Inputs stay
        assert!(png_path(dir.path(), 0).is_file());
    }
}
