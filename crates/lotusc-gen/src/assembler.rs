//! External assembler/linker invocation.
//!
//! The assembly document goes to a `NamedTempFile` (removed on every
//! exit path when the guard drops), then
//! `gcc -nostartfiles -no-pie -o <out> <tmp.s>` produces the ELF
//! executable. The child is reaped synchronously. `-run` executes the
//! produced binary with inherited stdio; its exit status is reported
//! back but is not a compiler error.

use std::io::Write as _;
use std::path::Path;
use std::process::Command;

use crate::error::{CodeGenError, Result};

/// Toolchain command used to assemble and link.
pub const TOOLCHAIN: &str = "gcc";

/// Drives the external toolchain.
pub struct Assembler {
    verbose: bool,
}

impl Assembler {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Assemble and link `asm` into `output`.
    pub fn assemble(&self, asm: &str, output: &Path) -> Result<()> {
        let mut tmp = tempfile::Builder::new()
            .prefix("lotusc")
            .suffix(".s")
            .tempfile()
            .map_err(|source| CodeGenError::WriteFailed {
                path: std::env::temp_dir(),
                source,
            })?;
        tmp.write_all(asm.as_bytes())
            .map_err(|source| CodeGenError::WriteFailed {
                path: tmp.path().to_path_buf(),
                source,
            })?;
        tmp.flush().map_err(|source| CodeGenError::WriteFailed {
            path: tmp.path().to_path_buf(),
            source,
        })?;

        if self.verbose {
            log::info!(
                "assembling {} -> {}",
                tmp.path().display(),
                output.display()
            );
        }

        let result = Command::new(TOOLCHAIN)
            .arg("-nostartfiles")
            .arg("-no-pie")
            .arg("-o")
            .arg(output)
            .arg(tmp.path())
            .output()
            .map_err(|source| CodeGenError::ToolchainSpawnFailed {
                command: TOOLCHAIN.to_string(),
                source,
            })?;

        if !result.status.success() {
            return Err(CodeGenError::ToolchainFailed {
                command: TOOLCHAIN.to_string(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
            });
        }

        Ok(())
    }

    /// Run the produced binary with inherited stdio and return its
    /// exit code (non-zero is the program's business, not ours).
    pub fn run(&self, binary: &Path) -> Result<i32> {
        if self.verbose {
            log::info!("running {}", binary.display());
        }

        let status = Command::new(binary)
            .status()
            .map_err(|source| CodeGenError::ExecFailed {
                path: binary.to_path_buf(),
                source,
            })?;

        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_toolchain_like_error_formats() {
        let err = CodeGenError::ToolchainFailed {
            command: TOOLCHAIN.to_string(),
            status: "exit status: 1".to_string(),
            stderr: "undefined reference".to_string(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("gcc"));
        assert!(rendered.contains("undefined reference"));
    }

    #[test]
    fn test_exec_of_missing_binary_is_error() {
        let assembler = Assembler::new(false);
        let result = assembler.run(Path::new("/nonexistent/lotus-binary"));
        assert!(matches!(result, Err(CodeGenError::ExecFailed { .. })));
    }
}
