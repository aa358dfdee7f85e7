mod capture;
mod cli;
mod encoder;
mod frame;
mod linux;
mod metadata;
mod recorder;
mod storage;

use anyhow::{Context, Result};
use capture::FrameSource;
use clap::Parser;
use cli::{Cli, Commands, ListTarget};
use encoder::{AssemblyOutcome, Converter, SystemRunner, Tools};
use linux::{CaptureMode, CaptureTarget, X11Capturer, X11Session};
use metadata::{CaptureSource, RunMetadata};
use recorder::CaptureConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let tools = Tools {
        convert: cli.convert_bin,
        ffmpeg: cli.ffmpeg_bin,
    };

    match cli.command {
        Commands::List { target } => match target {
            ListTarget::Windows { pid, json } => {
                let session = X11Session::open()?;
                let windows = match pid {
                    Some(pid) => linux::windows_by_pid(&session, pid),
                    None => linux::list_client_windows(&session),
                };

                if json {
                    println!("{}", serde_json::to_string_pretty(&windows)?);
                } else if windows.is_empty() {
                    println!("No windows found.");
                } else {
                    println!("Available windows:");
                    for w in windows {
                        println!(
                            "  [0x{id:X}] pid {pid} - {title}",
                            id = w.window,
                            pid = w.pid,
                            title = if w.title.is_empty() { "(untitled)" } else { &w.title },
                        );
                    }
                }
            }
            ListTarget::Tree => {
                let session = X11Session::open()?;
                let tree = linux::window_tree(&session)?;
                if let Some(parent) = tree.parent_name {
                    println!("Parent window: {}", parent);
                }
                for entry in tree.entries {
                    match entry.pid {
                        Some(pid) => {
                            println!("  [0x{:x}] pid {} - {}", entry.window, pid, entry.name)
                        }
                        None => println!("  [0x{:x}] no pid - {}", entry.window, entry.name),
                    }
                }
            }
            ListTarget::Displays => {
                let session = X11Session::open()?;
                let monitors = linux::list_monitors(&session)?;
                println!("Available displays:");
                for m in monitors {
                    println!(
                        "  [{index}] {width}x{height}+{x}+{y}{primary}",
                        index = m.index,
                        width = m.width,
                        height = m.height,
                        x = m.x,
                        y = m.y,
                        primary = if m.is_primary { " (primary)" } else { "" }
                    );
                }
            }
        },
        Commands::Info { window } => {
            let session = X11Session::open()?;
            let details = linux::window_details(&session, window)?;
            println!("Window 0x{:x} details:", details.window);
            println!("  Width: {}, Height: {}", details.width, details.height);
            println!("  X: {}, Y: {}", details.x, details.y);
            println!("  Border width: {}", details.border_width);
            println!("  Depth: {}", details.depth);
            println!("  Map state: {}", linux::map_state_name(details.map_state));
            if let Some(class) = details.visual_class {
                println!("  Visual class: {}", linux::visual_class_name(class));
            }
        }
        Commands::Snapshot {
            window,
            direct,
            converter,
            output,
        } => {
            if converter == Converter::External {
                encoder::check_tool(&tools.convert)?;
            }

            let frame = {
                let session = X11Session::open()?;
                let target = window.map_or(CaptureTarget::Root, CaptureTarget::Window);
                let mut capturer = X11Capturer::new(&session, target, capture_mode(direct));
                capturer
                    .capture_frame()
                    .context("Failed to capture window image")?
            };

            encoder::frame_to_png(&frame, &output, converter, &tools, &SystemRunner)?;
            println!(
                "Saved {}x{} capture to {}",
                frame.width,
                frame.height,
                output.display()
            );
        }
        Commands::Record {
            window,
            display,
            direct,
            frames_dir,
            max_frames,
            duration,
            no_encode,
            output,
        } => {
            if !no_encode {
                encoder::check_tool(&tools.ffmpeg)?;
            }

            let config = CaptureConfig {
                max_frames,
                duration: duration.map(Duration::from_secs_f64),
            };
            record(window, display, direct, &frames_dir, &config)?;

            if no_encode {
                println!("Frames kept in {}", frames_dir.display());
            } else {
                let output = output.unwrap_or_else(|| default_output(&frames_dir));
                let outcome =
                    encoder::assemble_video(&frames_dir, &output, &tools, &SystemRunner)?;
                report(&outcome);
            }
        }
        Commands::Assemble {
            frames_dir,
            output,
            from_png,
        } => {
            let output = output.unwrap_or_else(|| default_output(&frames_dir));
            let outcome = if from_png {
                encoder::images_to_video(&frames_dir, &output, &tools, &SystemRunner)?
            } else {
                if let Ok(metadata) = RunMetadata::load(&frames_dir) {
                    println!(
                        "Capture: {} frames of {}x{} in {:.2}s",
                        metadata.frames, metadata.width, metadata.height, metadata.elapsed_secs
                    );
                }
                encoder::assemble_video(&frames_dir, &output, &tools, &SystemRunner)?
            };
            report(&outcome);
        }
        Commands::Export {
            frames_dir,
            out_dir,
            converter,
        } => {
            if converter == Converter::External {
                encoder::check_tool(&tools.convert)?;
            }
            let out_dir = out_dir.unwrap_or_else(|| frames_dir.clone());
            let summary =
                encoder::export_frames(&frames_dir, &out_dir, converter, &tools, &SystemRunner)?;
            if summary.skipped > 0 {
                println!("Skipped {} truncated frames", summary.skipped);
            }
            println!(
                "Exported {} frames to {}",
                summary.exported,
                out_dir.display()
            );
        }
    }

    Ok(())
}

fn capture_mode(direct: bool) -> CaptureMode {
    if direct {
        CaptureMode::Direct
    } else {
        CaptureMode::Screen
    }
}

fn default_output(frames_dir: &Path) -> PathBuf {
    frames_dir.join("output.mp4")
}

/// Capture into `frames_dir` until stopped; the X11 connection is closed on return
fn record(
    window: Option<u32>,
    display: Option<usize>,
    direct: bool,
    frames_dir: &Path,
    config: &CaptureConfig,
) -> Result<()> {
    let session = X11Session::open()?;

    let (target, source) = if let Some(window_id) = window {
        (
            CaptureTarget::Window(window_id),
            CaptureSource::Window {
                id: window_id,
                direct,
            },
        )
    } else if let Some(display_index) = display {
        let monitors = linux::list_monitors(&session)?;
        let monitor = monitors
            .iter()
            .find(|m| m.index == display_index)
            .ok_or_else(|| anyhow::anyhow!("Display {} not found", display_index))?;
        (
            CaptureTarget::monitor(monitor),
            CaptureSource::Display {
                index: display_index,
            },
        )
    } else {
        (CaptureTarget::Root, CaptureSource::Root)
    };

    let mut writer = storage::FrameWriter::create(frames_dir)?;
    let mut capturer = X11Capturer::new(&session, target, capture_mode(direct));

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    println!("Capturing frames to {}", writer.dir().display());
    println!("Press Ctrl+C to stop capturing...\n");

    let summary = recorder::capture_frames(&mut capturer, &mut writer, config, &running)?;

    RunMetadata::new(source, &summary).save(frames_dir)?;

    match summary.header {
        Some(header) => println!(
            "Captured {} frames of {}x{} in {:.1}s ({:.1} fps)",
            summary.frames,
            header.width,
            header.height,
            summary.elapsed.as_secs_f64(),
            summary.measured_rate()
        ),
        None => println!("No frames captured."),
    }

    Ok(())
}

fn report(outcome: &AssemblyOutcome) {
    match outcome {
        AssemblyOutcome::NoFrames => println!("No frames to encode."),
        AssemblyOutcome::Encoded(summary) => {
            if summary.skipped > 0 {
                println!("Skipped {} truncated frames", summary.skipped);
            }
            println!(
                "Created video from {} frames at {} fps: {}",
                summary.frames,
                summary.frame_rate,
                summary.output.display()
            );
        }
    }
}
