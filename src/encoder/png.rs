//! Still images: PPM intermediates and PNG conversion

use crate::encoder::tool::{ToolRunner, Tools};
use crate::frame::{read_frame_file, FrameBuffer, FrameFileError};
use crate::storage::collect_frames;
use anyhow::{Context, Result};
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use std::ffi::OsString;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a frame becomes a PNG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Converter {
    /// Write a PPM and run the external `convert` program on it
    #[default]
    #[value(name = "convert")]
    External,
    /// Encode the PNG in-process
    Builtin,
}

/// RGB triple of each pixel; frames are BGRX
fn rgb_rows(frame: &FrameBuffer) -> impl Iterator<Item = Vec<u8>> + '_ {
    frame.rows().map(|row| {
        row.chunks_exact(4)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect()
    })
}

pub fn to_rgb_image(frame: &FrameBuffer) -> Result<RgbImage> {
    let data: Vec<u8> = rgb_rows(frame).flatten().collect();
    RgbImage::from_raw(frame.width, frame.height, data)
        .with_context(|| format!("Pixel data does not fill a {} image", frame.header()))
}

/// Write a binary PPM (P6) of the frame
pub fn write_ppm<W: Write>(frame: &FrameBuffer, out: &mut W) -> io::Result<()> {
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)?;
    for row in rgb_rows(frame) {
        out.write_all(&row)?;
    }
    Ok(())
}

/// Turn one frame into a PNG at `output`
///
/// With the external converter the PPM intermediate is deleted once
/// `convert` succeeds; on failure it is kept and its path reported.
pub fn frame_to_png(
    frame: &FrameBuffer,
    output: &Path,
    converter: Converter,
    tools: &Tools,
    runner: &dyn ToolRunner,
) -> Result<()> {
    match converter {
        Converter::Builtin => to_rgb_image(frame)?
            .save(output)
            .with_context(|| format!("Failed to save {}", output.display())),
        Converter::External => {
            let dir = match output.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let mut ppm = tempfile::Builder::new()
                .prefix("xwincap-")
                .suffix(".ppm")
                .tempfile_in(dir)
                .context("Failed to create intermediate image")?;
            {
                let mut out = BufWriter::new(ppm.as_file_mut());
                write_ppm(frame, &mut out)
                    .and_then(|_| out.flush())
                    .context("Failed to write intermediate image")?;
            }

            let args = [OsString::from(ppm.path()), OsString::from(output)];
            match runner.run(&tools.convert, &args) {
                Ok(()) => {
                    log::debug!("converted {} to {}", ppm.path().display(), output.display());
                    // Dropping the temp file removes the intermediate
                    Ok(())
                }
                Err(e) => {
                    let (_, kept) = ppm.keep().context("Failed to keep intermediate image")?;
                    Err(e.context(format!(
                        "Failed to convert to {}; intermediate kept at {}",
                        output.display(),
                        kept.display()
                    )))
                }
            }
        }
    }
}

/// Path of the exported PNG for a frame index
pub fn png_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("frame_{}.png", index))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub exported: usize,
    /// Truncated frames that produced no image
    pub skipped: usize,
}

/// Convert every frame of a capture directory to `frame_<n>.png`
///
/// Frames are converted in parallel and left in place. Truncated frames
/// are skipped, keeping their index free in the output numbering.
pub fn export_frames(
    frames_dir: &Path,
    out_dir: &Path,
    converter: Converter,
    tools: &Tools,
    runner: &dyn ToolRunner,
) -> Result<ExportSummary> {
    let frames = collect_frames(frames_dir);
    if frames.is_empty() {
        log::warn!("no frames found in {}", frames_dir.display());
        return Ok(ExportSummary::default());
    }

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    let pb = ProgressBar::new(frames.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let processed = AtomicUsize::new(0);

    let results: Vec<Result<bool>> = frames
        .par_iter()
        .enumerate()
        .map(|(index, path)| {
            let converted = match read_frame_file(path) {
                Ok(frame) => {
                    frame_to_png(&frame, &png_path(out_dir, index), converter, tools, runner)?;
                    true
                }
                Err(FrameFileError::Truncated {
                    expected, found, ..
                }) => {
                    log::warn!(
                        "skipping {}: {} of {} bytes present",
                        path.display(),
                        found,
                        expected
                    );
                    false
                }
                Err(e) => return Err(e.into()),
            };

            let count = processed.fetch_add(1, Ordering::Relaxed);
            pb.set_position(count as u64 + 1);
            Ok(converted)
        })
        .collect();

    pb.finish_and_clear();

    let mut summary = ExportSummary::default();
    for result in results {
        if result? {
            summary.exported += 1;
        } else {
            summary.skipped += 1;
        }
    }

    Ok(summary)
}
