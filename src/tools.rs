//! External tool invocation
//!
//! exiftool, oiiotool, ffmpeg and ImageMagick are run as child processes.
//! Exit status and stderr are captured so a failed conversion reports what
//! the tool said instead of a bare exit code.

use log::{debug, trace};
use std::ffi::OsStr;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// External tool failure
#[derive(Debug)]
pub enum ToolError {
    /// Executable not found on PATH (or at the configured location)
    NotFound(String),
    /// Tool ran but exited non-zero
    Failed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },
    /// Tool succeeded but its output could not be understood
    Parse { tool: String, message: String },
    /// Expected input or output file is missing
    MissingFile(PathBuf),
    Io(io::Error),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(tool) => write!(f, "{} not found (is it installed?)", tool),
            ToolError::Failed { tool, status, stderr } => {
                let code = status.map_or("signal".to_string(), |c| c.to_string());
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    write!(f, "{} failed (exit {})", tool, code)
                } else {
                    write!(f, "{} failed (exit {}): {}", tool, code, stderr)
                }
            }
            ToolError::Parse { tool, message } => {
                write!(f, "Unexpected {} output: {}", tool, message)
            }
            ToolError::MissingFile(path) => write!(f, "File not found: {}", path.display()),
            ToolError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ToolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ToolError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ToolError {
    fn from(e: io::Error) -> Self {
        ToolError::Io(e)
    }
}

/// Display name for an executable path (`/opt/bin/ffmpeg` -> `ffmpeg`)
pub fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Run `program args...`, returning captured output on success
pub fn run<I, S>(program: &Path, args: I) -> Result<Output, ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = tool_name(program);
    let mut cmd = Command::new(program);
    cmd.args(args);
    trace!("Running {:?}", cmd);

    let output = cmd.output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            ToolError::NotFound(name.clone())
        } else {
            ToolError::Io(e)
        }
    })?;

    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: name,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    debug!("{} ok", name);
    Ok(output)
}

/// Run and require that `expected` exists afterwards
pub fn run_producing<I, S>(program: &Path, args: I, expected: &Path) -> Result<(), ToolError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run(program, args)?;
    if expected.exists() {
        Ok(())
    } else {
        Err(ToolError::MissingFile(expected.to_path_buf()))
    }
}
