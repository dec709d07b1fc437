//! Command-line parsing.
//!
//! The flag surface is Go-style (single-dash long options such as
//! `-run` and `-docs`), so this is a hand-written match loop rather
//! than a derive-based parser. Unknown flags and malformed values exit
//! with code 2.

use lotusc_util::{WarningOpts, DEFAULT_MAX_ERRORS};
use std::path::PathBuf;
use thiserror::Error;

/// Color preference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

/// Everything the driver needs to know for one invocation.
#[derive(Clone, Debug)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub output: PathBuf,
    /// `-S`: stop after writing `<out>.s`.
    pub emit_asm: bool,
    /// `-run`: execute the produced binary.
    pub run: bool,
    pub verbose: bool,
    pub token_dump: bool,
    pub ast_dump: bool,
    pub stats: bool,
    pub timing: bool,
    pub quiet: bool,
    pub include_dirs: Vec<PathBuf>,
    pub trim_path: Option<String>,
    pub show_version: bool,
    pub docs: bool,
    pub docs_section: Option<String>,
    pub warnings: WarningOpts,
    pub max_errors: usize,
    pub color: ColorChoice,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input: None,
            output: PathBuf::from("a.out"),
            emit_asm: false,
            run: false,
            verbose: false,
            token_dump: false,
            ast_dump: false,
            stats: false,
            timing: false,
            quiet: false,
            include_dirs: Vec::new(),
            trim_path: None,
            show_version: false,
            docs: false,
            docs_section: None,
            warnings: WarningOpts::default(),
            max_errors: DEFAULT_MAX_ERRORS,
            color: ColorChoice::Auto,
        }
    }
}

impl Config {
    /// Parse a raw argument list (without the program name).
    pub fn parse(args: &[String]) -> Result<Config, CliError> {
        let mut config = Config::default();
        let mut iter = args.iter().peekable();

        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-o" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::MissingValue("-o".into()))?;
                    config.output = PathBuf::from(value);
                }
                "-S" => config.emit_asm = true,
                "-run" => config.run = true,
                "-v" => config.verbose = true,
                "-td" | "--token-dump" => config.token_dump = true,
                "--ast-dump" => config.ast_dump = true,
                "--stats" => config.stats = true,
                "--timing" => config.timing = true,
                "-q" | "--quiet" => config.quiet = true,
                "-I" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::MissingValue("-I".into()))?;
                    config.include_dirs.push(PathBuf::from(value));
                }
                "--trimpath" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::MissingValue("--trimpath".into()))?;
                    config.trim_path = Some(value.clone());
                }
                "--version" => config.show_version = true,
                "-docs" => config.docs = true,
                "-docs-section" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::MissingValue("-docs-section".into()))?;
                    config.docs = true;
                    config.docs_section = Some(value.clone());
                }
                "-Wall" => {
                    let keep = config.warnings;
                    config.warnings = WarningOpts {
                        warnings_as_errors: keep.warnings_as_errors,
                        suppress: keep.suppress,
                        ..WarningOpts::all()
                    };
                }
                "-Werror" => config.warnings.warnings_as_errors = true,
                "-Wunused" => config.warnings.unused = true,
                "-Wshadow" => config.warnings.shadow = true,
                "-Wimplicit" => config.warnings.implicit = true,
                "-Wdeprecated" => config.warnings.deprecated = true,
                "-w" => config.warnings.suppress = true,
                "--max-errors" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| CliError::MissingValue("--max-errors".into()))?;
                    config.max_errors = value
                        .parse()
                        .map_err(|_| CliError::InvalidValue("--max-errors".into(), value.clone()))?;
                }
                "--color" => config.color = ColorChoice::Always,
                "--no-color" => config.color = ColorChoice::Never,
                flag if flag.starts_with('-') => {
                    return Err(CliError::UnknownFlag(flag.to_string()));
                }
                input => {
                    if config.input.is_some() {
                        return Err(CliError::MultipleInputs(input.to_string()));
                    }
                    config.input = Some(PathBuf::from(input));
                }
            }
        }

        Ok(config)
    }
}

/// Flag parsing failures; the driver exits with code 2 on any of
/// these.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("unknown flag `{0}`")]
    UnknownFlag(String),

    #[error("flag `{0}` requires a value")]
    MissingValue(String),

    #[error("invalid value `{1}` for `{0}`")]
    InvalidValue(String, String),

    #[error("multiple input files (`{0}` after an earlier input)")]
    MultipleInputs(String),

    #[error("no input file")]
    NoInput,
}
