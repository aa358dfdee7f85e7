//! Running the external image converter and video encoder

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::process::{Command, Stdio};

/// Names of the external programs
#[derive(Debug, Clone)]
pub struct Tools {
    pub convert: String,
    pub ffmpeg: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            convert: "convert".to_string(),
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Runs an external program to completion
///
/// `Ok` means the program was found and exited successfully.
pub trait ToolRunner: Sync {
    fn run(&self, program: &str, args: &[OsString]) -> Result<()>;
}

/// Spawns programs with `std::process::Command`
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<()> {
        log::debug!("running {} {:?}", program, args);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to start {}. Is it installed?", program))?;

        if !output.status.success() {
            let error_output = String::from_utf8_lossy(&output.stderr);
            // Get last few lines
            let last_lines: Vec<&str> = error_output.lines().rev().take(5).collect();
            let error_context = last_lines.into_iter().rev().collect::<Vec<_>>().join("\n");
            if error_context.is_empty() {
                anyhow::bail!("{} failed with status: {}", program, output.status);
            }
            anyhow::bail!("{} failed with status {}:\n{}", program, output.status, error_context);
        }

        Ok(())
    }
}

/// Check that a program can be started
pub fn check_tool(program: &str) -> Result<()> {
    Command::new(program)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("{} not found. Please install it or pass its path", program))?;
    Ok(())
}
