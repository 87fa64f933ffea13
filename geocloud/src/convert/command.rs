//! External process invocation.
//!
//! Commands are built as argument vectors and executed without a shell, so
//! paths containing spaces or brackets are passed through untouched.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::Path;
use std::process::Command;

use crate::error::ConversionError;

/// Target reference system for every output.
pub const TARGET_CRS: &str = "EPSG:4326";

/// Creation options for Cloud-Optimized GeoTIFF output.
pub const RASTER_CREATION_OPTIONS: &[&str] = &[
    "BIGTIFF=YES",
    "COMPRESS=ZSTD",
    "STATISTICS=YES",
    "OVERVIEWS=IGNORE_EXISTING",
    "OVERVIEW_RESAMPLING=LANCZOS",
    "RESAMPLING=LANCZOS",
];

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns true if `needle` appears as a whole argument.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            let arg = arg.to_string_lossy();
            if arg.contains(' ') {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// `gdal raster reproject` to COG with fixed options.
pub fn raster_command(program: &str, input: &Path, output: &Path) -> CommandSpec {
    let mut spec = CommandSpec::new(program)
        .args(["raster", "reproject", "--overwrite", "-d", TARGET_CRS, "-f", "COG"]);
    for option in RASTER_CREATION_OPTIONS {
        spec = spec.arg("--co").arg(*option);
    }
    spec.arg(input.as_os_str()).arg(output.as_os_str())
}

/// `gdal vector pipeline` producing single-part, valid FlatGeobuf.
pub fn vector_command(program: &str, input: &Path, output: &Path) -> CommandSpec {
    CommandSpec::new(program)
        .args(["vector", "pipeline", "!", "read"])
        .arg(input.as_os_str())
        .args([
            "!",
            "make-valid",
            "!",
            "explode-collections",
            "!",
            "set-geom-type",
            "--single",
            "!",
            "reproject",
            "-d",
            TARGET_CRS,
            "!",
            "write",
            "--overwrite",
            "-f",
            "FlatGeobuf",
        ])
        .arg(output.as_os_str())
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs a command to completion.
pub trait CommandRunner: Send + Sync {
    /// Blocks until the process exits. `Err` means it could not be started.
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput>;
}

/// [`CommandRunner`] that spawns real processes.
///
/// On Unix each child gets its own process group, so a Ctrl+C delivered to
/// the terminal's foreground group reaches only this process. Conversions
/// that have already started run to completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run(&self, spec: &CommandSpec) -> io::Result<CommandOutput> {
        let mut command = Command::new(&spec.program);
        command.args(&spec.args);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let output = command.output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Checks that the conversion tool can be launched.
pub fn check_tool_available(runner: &dyn CommandRunner, program: &str) -> Result<(), ConversionError> {
    let spec = CommandSpec::new(program).arg("--version");
    match runner.run(&spec) {
        Ok(output) if output.success() => Ok(()),
        Ok(output) => Err(ConversionError::ToolFailed {
            program: program.to_string(),
            code: output.code,
            stderr: output.stderr,
        }),
        Err(e) => Err(ConversionError::launch(program, e)),
    }
}
