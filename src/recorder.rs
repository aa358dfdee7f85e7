use crate::capture::FrameSource;
use crate::frame::FrameHeader;
use crate::storage::FrameWriter;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Limits for one capture run; by default it runs until stopped
#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    pub max_frames: Option<u64>,
    pub duration: Option<Duration>,
}

/// Why a capture run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Interrupted,
    FrameLimit,
    TimeLimit,
    GeometryChanged,
    CaptureFailed(String),
}

#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub frames: u64,
    pub header: Option<FrameHeader>,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

impl CaptureSummary {
    /// Frames per second actually achieved
    pub fn measured_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }
}

/// Grab frames back to back and persist each one
///
/// There is no pacing: the rate is whatever the source and the disk allow.
/// The loop ends when `running` is cleared, a limit is reached, the
/// source's dimensions change, or a capture fails.
pub fn capture_frames<S: FrameSource>(
    source: &mut S,
    writer: &mut FrameWriter,
    config: &CaptureConfig,
    running: &AtomicBool,
) -> Result<CaptureSummary> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} Capturing... {pos} frames {elapsed_precise}")?,
    );

    let start = Instant::now();

    let stop_reason = loop {
        if !running.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }
        if config
            .max_frames
            .is_some_and(|max| writer.frames_written() >= max)
        {
            break StopReason::FrameLimit;
        }
        if config.duration.is_some_and(|limit| start.elapsed() >= limit) {
            break StopReason::TimeLimit;
        }

        let frame = match source.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                let message = format!("{:#}", anyhow::Error::from(e));
                log::warn!(
                    "capture failed after {} frames: {}",
                    writer.frames_written(),
                    message
                );
                break StopReason::CaptureFailed(message);
            }
        };

        if let Some(header) = writer.header() {
            if header != frame.header() {
                log::warn!(
                    "target changed from {} to {}; ending capture",
                    header,
                    frame.header()
                );
                break StopReason::GeometryChanged;
            }
        }

        writer
            .write(&frame)
            .with_context(|| format!("Failed to save frame {}", writer.frames_written()))?;
        pb.inc(1);
    };

    pb.finish_and_clear();

    Ok(CaptureSummary {
        frames: writer.frames_written(),
        header: writer.header(),
        elapsed: start.elapsed(),
        stop_reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureError;
    use crate::frame::tests::pattern_frame;
    use crate::frame::{read_frame_header, FrameBuffer};
    use crate::storage::collect_frames;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Replays scripted frames, then fails like a window that went away
    struct ScriptedSource {
        frames: VecDeque<FrameBuffer>,
    }

    impl ScriptedSource {
        fn new(frames: Vec<FrameBuffer>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn capture_frame(&mut self) -> Result<FrameBuffer, CaptureError> {
            self.frames
                .pop_front()
                .ok_or(CaptureError::NotViewable(0x42))
        }
    }

    fn run(source: &mut ScriptedSource, dir: &TempDir, config: &CaptureConfig) -> CaptureSummary {
        let mut writer = FrameWriter::create(dir.path()).unwrap();
        let running = AtomicBool::new(true);
        capture_frames(source, &mut writer, config, &running).unwrap()
    }

    #[test]
    fn test_run_until_capture_fails() {
        let dir = TempDir::new().unwrap();
        let mut source = ScriptedSource::new((0..6).map(|i| pattern_frame(4, 4, 16, i)).collect());

        let summary = run(&mut source, &dir, &CaptureConfig::default());

        assert_eq!(summary.frames, 6);
        assert!(matches!(summary.stop_reason, StopReason::CaptureFailed(_)));

        let frames = collect_frames(dir.path());
        assert_eq!(frames.len(), 6);
        let headers: Vec<_> = frames
            .iter()
            .map(|path| read_frame_header(path).unwrap())
            .collect();
        assert!(headers.iter().all(|h| *h == headers[0]));
        assert_eq!(Some(headers[0]), summary.header);
    }

    #[test]
    fn test_frame_limit() {
        let dir = TempDir::new().unwrap();
        let mut source = ScriptedSource::new((0..10).map(|i| pattern_frame(2, 2, 8, i)).collect());
        let config = CaptureConfig {
            max_frames: Some(3),
            ..Default::default()
        };

        let summary = run(&mut source, &dir, &config);

        assert_eq!(summary.frames, 3);
        assert_eq!(summary.stop_reason, StopReason::FrameLimit);
        assert_eq!(source.frames.len(), 7);
    }

    #[test]
    fn test_geometry_change_ends_run() {
        let dir = TempDir::new().unwrap();
        let mut source = ScriptedSource::new(vec![
            pattern_frame(4, 4, 16, 0),
            pattern_frame(4, 4, 16, 1),
            pattern_frame(5, 4, 20, 2),
            pattern_frame(4, 4, 16, 3),
        ]);

        let summary = run(&mut source, &dir, &CaptureConfig::default());

        assert_eq!(summary.frames, 2);
        assert_eq!(summary.stop_reason, StopReason::GeometryChanged);
        assert_eq!(collect_frames(dir.path()).len(), 2);
    }

    #[test]
    fn test_cleared_flag_captures_nothing() {
        let dir = TempDir::new().unwrap();
        let mut source = ScriptedSource::new(vec![pattern_frame(4, 4, 16, 0)]);
        let mut writer = FrameWriter::create(dir.path()).unwrap();
        let running = AtomicBool::new(false);

        let summary =
            capture_frames(&mut source, &mut writer, &CaptureConfig::default(), &running).unwrap();

        assert_eq!(summary.frames, 0);
        assert_eq!(summary.header, None);
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert!(collect_frames(dir.path()).is_empty());
    }

    #[test]
    fn test_measured_rate() {
        let summary = CaptureSummary {
            frames: 50,
            header: None,
            elapsed: Duration::from_secs(2),
            stop_reason: StopReason::Interrupted,
        };
        assert!((summary.measured_rate() - 25.0).abs() < 1e-9);
    }
}
