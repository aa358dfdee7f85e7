//! Numbered frame files inside a capture directory

use crate::frame::{write_frame_file, FrameBuffer, FrameFileError, FrameHeader};
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Path of the frame with the given index
pub fn frame_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("pixel_data_{}.bin", index))
}

/// Writes frames of one capture run as `pixel_data_0.bin`, `pixel_data_1.bin`, ...
///
/// The frame counter lives here rather than in the capture loop, so a run
/// is numbered from zero no matter how often capture is restarted.
pub struct FrameWriter {
    dir: PathBuf,
    next_index: u64,
    header: Option<FrameHeader>,
}

impl FrameWriter {
    /// Prepare `dir` for a new run
    ///
    /// Fails if the directory already holds frames from another run.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create frame directory {}", dir.display()))?;

        if frame_path(dir, 0).exists() {
            anyhow::bail!(
                "{} already contains captured frames; assemble or remove them first",
                dir.display()
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            next_index: 0,
            header: None,
        })
    }

    /// Persist a frame under the next index
    ///
    /// Every frame must have the same dimensions as the first one.
    pub fn write(&mut self, frame: &FrameBuffer) -> Result<PathBuf, FrameFileError> {
        let path = frame_path(&self.dir, self.next_index);

        match self.header {
            Some(expected) if expected != frame.header() => {
                return Err(FrameFileError::HeaderMismatch {
                    path,
                    expected,
                    found: frame.header(),
                });
            }
            _ => {}
        }

        write_frame_file(&path, frame)?;
        self.header.get_or_insert(frame.header());
        self.next_index += 1;
        Ok(path)
    }

    pub fn frames_written(&self) -> u64 {
        self.next_index
    }

    /// Header of the first frame written, if any
    pub fn header(&self) -> Option<FrameHeader> {
        self.header
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Frame files in index order, stopping at the first missing index
pub fn collect_frames(dir: &Path) -> Vec<PathBuf> {
    (0..)
        .map(|index| frame_path(dir, index))
        .take_while(|path| path.is_file())
        .collect()
}

/// Delete files, treating already-missing ones as removed
pub fn remove_files(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        remove_if_exists(path)?;
    }
    Ok(())
}

pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::read_frame_header;
    use crate::frame::tests::pattern_frame;
    use tempfile::TempDir;

    #[test]
    fn test_frames_are_numbered_from_zero() {
        let dir = TempDir::new().unwrap();
        let mut writer = FrameWriter::create(dir.path()).unwrap();

        for seed in 0..3 {
            let path = writer.write(&pattern_frame(4, 4, 16, seed)).unwrap();
            assert_eq!(path, frame_path(dir.path(), seed as u64));
        }

        assert_eq!(writer.frames_written(), 3);
        assert_eq!(collect_frames(dir.path()).len(), 3);
    }

    #[test]
    fn test_writer_rejects_mixed_dimensions() {
        let dir = TempDir::new().unwrap();
        let mut writer = FrameWriter::create(dir.path()).unwrap();

        writer.write(&pattern_frame(4, 4, 16, 0)).unwrap();
        let result = writer.write(&pattern_frame(2, 2, 8, 0));

        assert!(matches!(result, Err(FrameFileError::HeaderMismatch { .. })));
        assert_eq!(writer.frames_written(), 1);
        assert!(!frame_path(dir.path(), 1).exists());
    }

    #[test]
    fn test_writer_refuses_directory_with_frames() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = FrameWriter::create(dir.path()).unwrap();
            writer.write(&pattern_frame(4, 4, 16, 0)).unwrap();
        }

        assert!(FrameWriter::create(dir.path()).is_err());
    }

    #[test]
    fn test_writer_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut writer = FrameWriter::create(&nested).unwrap();
        writer.write(&pattern_frame(1, 1, 4, 0)).unwrap();

        assert_eq!(read_frame_header(&frame_path(&nested, 0)).unwrap().width, 1);
    }

    #[test]
    fn test_collect_stops_at_gap() {
        let dir = TempDir::new().unwrap();
        for index in [0u64, 1, 3] {
            fs::write(frame_path(dir.path(), index), b"x").unwrap();
        }

        let frames = collect_frames(dir.path());
        assert_eq!(
            frames,
            vec![frame_path(dir.path(), 0), frame_path(dir.path(), 1)]
        );
    }

    #[test]
    fn test_remove_ignores_missing_files() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("present");
        fs::write(&present, b"x").unwrap();

        remove_files(&[present.clone(), dir.path().join("absent")]).unwrap();
        assert!(!present.exists());
    }
}
