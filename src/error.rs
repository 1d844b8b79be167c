use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by keeper operations.
///
/// Stale or corrupt pid-file content is deliberately not represented here:
/// reads self-heal by deleting the file and reporting "no record".
#[derive(Error, Debug)]
pub enum KeeperError {
    /// The user log file could not be created before launch.
    #[error("failed to create user log file {path}: {source}")]
    UserLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The process never started, or supervision failed unexpectedly.
    #[error("unexpected error while starting process, aborting: {0:#}")]
    Launch(#[from] anyhow::Error),

    /// The child started, ran and exited with a nonzero status.
    #[error("process exited with code {0}")]
    ProcessExit(i32),

    /// The pid file exists but cannot be read for permission reasons.
    #[error("access denied reading pid file {path}")]
    PidFileAccess { path: PathBuf },

    /// Any other pid-file read, write or delete failure.
    #[error("pid file operation failed on {path}: {source}")]
    PidFileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl KeeperError {
    /// Exit code the host process should propagate for this failure.
    ///
    /// A child exit failure carries the child's own code; everything else
    /// maps to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            KeeperError::ProcessExit(code) => *code,
            _ => 1,
        }
    }
}
