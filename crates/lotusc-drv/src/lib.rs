//! lotusc-drv - Compiler driver.
//!
//! Orchestrates the pipeline: read source, lex, parse, analyze,
//! optimize, generate, peephole, then either write the assembly
//! (`-S`) or drive gcc and optionally execute the result (`-run`).
//! Exit codes: 0 success, 1 compilation failed, 2 flag parsing failed.

pub mod cli;
pub mod docs;
pub mod stats;

pub use cli::{CliError, ColorChoice, Config};
pub use stats::Stats;

use anyhow::Context as _;
use lotusc_gen::{Assembler, CodeGen, Peephole};
use lotusc_lex::Lexer;
use lotusc_par::Parser;
use lotusc_sem::SemanticAnalyzer;
use lotusc_util::{Handler, Renderer};
use std::io::IsTerminal as _;
use std::path::Path;
use std::time::Instant;

/// Entry point behind the thin `main.rs`; returns the process exit
/// code.
pub fn main() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match Config::parse(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            return 2;
        }
    };

    if config.show_version {
        println!("lotusc {}", env!("CARGO_PKG_VERSION"));
        return 0;
    }
    if config.docs {
        return if docs::print(config.docs_section.as_deref()) {
            0
        } else {
            2
        };
    }

    let Some(input) = config.input.clone() else {
        eprintln!("error: {}", CliError::NoInput);
        return 2;
    };

    logger::init(config.verbose, config.quiet);

    let mut session = Session::new(config);
    match session.compile(&input) {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}

/// State for one compiler invocation.
pub struct Session {
    pub config: Config,
    pub handler: Handler,
    pub stats: Stats,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let handler = Handler::with_limits(
            config.max_errors,
            config.warnings.warnings_as_errors,
            config.warnings.suppress,
        );
        Self {
            config,
            handler,
            stats: Stats::default(),
        }
    }

    /// Run the pipeline over one source file. `Ok(false)` means
    /// diagnostics stopped the compilation (exit code 1).
    pub fn compile(&mut self, input: &Path) -> anyhow::Result<bool> {
        let path_display = input.display().to_string();
        if input.extension().map(|e| e != "lts").unwrap_or(true) {
            log::warn!("{} does not have the .lts extension", path_display);
        }

        let source = std::fs::read_to_string(input)
            .with_context(|| format!("failed to read {}", path_display))?;

        // Lexing. A fatal lexical error leaves no tokens.
        log::debug!("lexing {}", path_display);
        let start = Instant::now();
        let tokens = Lexer::new(&source, &self.handler).tokenize();
        self.stats.record_phase("lex", start.elapsed());
        self.stats.tokens = tokens.len();

        if tokens.is_empty() {
            self.render_diagnostics(&path_display, &source);
            return Ok(false);
        }

        if self.config.token_dump {
            for token in &tokens {
                match &token.value {
                    Some(value) => println!(
                        "{}:{} {:?} {:?}",
                        token.span.line, token.span.column, token.kind, value
                    ),
                    None => println!("{}:{} {:?}", token.span.line, token.span.column, token.kind),
                }
            }
            return Ok(true);
        }

        // Parsing stops at the first syntactic error.
        log::debug!("parsing {} tokens", tokens.len());
        let start = Instant::now();
        let parse_result = Parser::new(tokens, &self.handler).parse();
        self.stats.record_phase("parse", start.elapsed());

        let ast = match parse_result {
            Ok(ast) => ast,
            Err(_) => {
                self.render_diagnostics(&path_display, &source);
                return Ok(false);
            }
        };
        self.stats.ast_nodes = stats::count_nodes(&ast);

        if self.config.ast_dump {
            println!("{:#?}", ast);
            return Ok(true);
        }

        // Semantic analysis collects, never aborts.
        let start = Instant::now();
        let mut analyzer = SemanticAnalyzer::new(&self.handler, self.config.warnings);
        analyzer.analyze(&ast);
        self.stats.record_phase("analyze", start.elapsed());

        if self.handler.has_errors() {
            self.render_diagnostics(&path_display, &source);
            return Ok(false);
        }

        // AST optimization.
        let start = Instant::now();
        let ast = lotusc_opt::optimize(ast);
        self.stats.record_phase("optimize", start.elapsed());

        // Code generation; unsupported constructs surface here.
        let start = Instant::now();
        let asm = CodeGen::new(&self.handler).generate(&ast);
        self.stats.record_phase("codegen", start.elapsed());

        if self.handler.has_errors() {
            self.render_diagnostics(&path_display, &source);
            return Ok(false);
        }

        // Peephole cleanup.
        let start = Instant::now();
        let asm = Peephole::new().run(&asm);
        self.stats.record_phase("peephole", start.elapsed());
        self.stats.asm_lines = asm.lines().count();

        // Surviving warnings still get rendered.
        self.render_diagnostics(&path_display, &source);

        if self.config.emit_asm {
            let asm_path = self.config.output.with_extension("s");
            std::fs::write(&asm_path, &asm)
                .with_context(|| format!("failed to write {}", asm_path.display()))?;
            log::info!("wrote {}", asm_path.display());
        } else {
            let assembler = Assembler::new(self.config.verbose);
            assembler.assemble(&asm, &self.config.output)?;
            if self.config.run {
                let code = assembler.run(&self.config.output)?;
                log::info!("program exited with status {}", code);
            }
        }

        if self.config.stats {
            self.stats.print();
        } else if self.config.timing {
            self.stats.print_timing();
        }

        Ok(true)
    }

    fn render_diagnostics(&self, path: &str, source: &str) {
        let color = match self.config.color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => std::io::stderr().is_terminal(),
        };
        let mut renderer = Renderer::new(color);
        if let Some(prefix) = &self.config.trim_path {
            renderer = renderer.with_trim_prefix(prefix.clone());
        }

        for diag in self.handler.diagnostics() {
            eprint!("{}", renderer.render(&diag, path, source));
        }

        let errors = self.handler.error_count();
        let dropped = self.handler.dropped_error_count();
        if dropped > 0 {
            eprintln!(
                "error: too many errors, {} not shown (raise with --max-errors)",
                dropped
            );
        }
        if errors > 0 {
            eprintln!(
                "error: aborting due to {} previous error{}",
                errors,
                if errors == 1 { "" } else { "s" }
            );
        }
    }
}

mod logger {
    use log::{Level, LevelFilter, Metadata, Record};

    struct StderrLogger;

    impl log::Log for StderrLogger {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= log::max_level()
        }

        fn log(&self, record: &Record) {
            if self.enabled(record.metadata()) {
                let tag = match record.level() {
                    Level::Error => "error",
                    Level::Warn => "warning",
                    Level::Info => "info",
                    Level::Debug | Level::Trace => "debug",
                };
                eprintln!("lotusc: {}: {}", tag, record.args());
            }
        }

        fn flush(&self) {}
    }

    static LOGGER: StderrLogger = StderrLogger;

    /// `-v` raises the level to debug, `-q` silences everything below
    /// an error.
    pub fn init(verbose: bool, quiet: bool) {
        let level = if quiet {
            LevelFilter::Error
        } else if verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        };
        let _ = log::set_logger(&LOGGER);
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_compile_missing_file_is_io_error() {
        let mut session = Session::new(Config::default());
        let result = session.compile(Path::new("/nonexistent/input.lts"));
        assert!(result.is_err());
    }

    #[test]
    fn test_handler_inherits_warning_configuration() {
        let mut config = Config::default();
        config.warnings.suppress = true;
        let session = Session::new(config);
        session.handler.emit(lotusc_util::Diagnostic::warning(
            "w",
            lotusc_util::Span::DUMMY,
        ));
        assert_eq!(session.handler.warning_count(), 0);
    }
}
