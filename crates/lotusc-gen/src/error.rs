//! Error types for code generation and toolchain invocation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the code generation and assembly stages.
///
/// Unknown constructs inside a function body are not errors (they
/// become assembly comments per the failure semantics), so this enum
/// only covers failures that prevent producing or assembling output.
#[derive(Debug, Error)]
pub enum CodeGenError {
    /// Writing the assembly document failed.
    #[error("failed to write assembly to {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The external assembler/linker could not be spawned.
    #[error("failed to invoke `{command}`: {source}")]
    ToolchainSpawnFailed {
        command: String,
        source: std::io::Error,
    },

    /// The external assembler/linker reported failure.
    #[error("`{command}` exited with {status}:\n{stderr}")]
    ToolchainFailed {
        command: String,
        status: String,
        stderr: String,
    },

    /// Running the produced binary failed to start (the binary's own
    /// exit code is not a compiler error).
    #[error("failed to execute {path}: {source}")]
    ExecFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result alias for code generation operations.
pub type Result<T> = std::result::Result<T, CodeGenError>;
