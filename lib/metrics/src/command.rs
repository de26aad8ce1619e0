use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;
use typed_builder::TypedBuilder;

/// Why a host probe produced no usable data. Every variant is recoverable:
/// collectors map it to their documented fallback.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },
    #[error("`{probe}` did not finish within {timeout:?}")]
    Timeout { probe: String, timeout: Duration },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Unexpected output from `{probe}`: {reason}")]
    Malformed { probe: String, reason: String },
}

impl ProbeError {
    pub fn malformed(probe: &str, reason: impl Into<String>) -> Self {
        ProbeError::Malformed {
            probe: probe.to_string(),
            reason: reason.into(),
        }
    }
}

/// Runs host utilities and reads kernel tables with a bounded timeout.
///
/// Children are killed when the timeout elapses or the caller stops waiting,
/// and run with `LC_ALL=C` so their output keeps the column layout the
/// parsers expect.
#[derive(Debug, Clone, Copy, TypedBuilder)]
pub struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        CommandRunner::builder().timeout(timeout).build()
    }

    /// Runs `program` and returns its stdout. A non-zero exit, a missing
    /// binary, a timeout and non-UTF-8 output are all [`ProbeError`]s.
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<String, ProbeError> {
        trace!(program, ?args, "Running host command");

        let mut command = Command::new(program);
        command.args(args).env("LC_ALL", "C").kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| ProbeError::Timeout {
                probe: program.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProbeError::ExitStatus {
                program: program.to_string(),
                status: output.status,
            });
        }

        String::from_utf8(output.stdout)
            .map_err(|_| ProbeError::malformed(program, "output is not valid UTF-8"))
    }

    /// Reads a (pseudo-)file such as `/proc/stat` under the same timeout.
    pub async fn read_file(&self, path: &str) -> Result<String, ProbeError> {
        timeout(self.timeout, tokio::fs::read_to_string(path))
            .await
            .map_err(|_| ProbeError::Timeout {
                probe: path.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ProbeError::Read {
                path: path.to_string(),
                source,
            })
    }
}
