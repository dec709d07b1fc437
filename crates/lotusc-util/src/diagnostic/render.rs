//! Diagnostic rendering.
//!
//! Formats a [`Diagnostic`] against the source text it refers to: a
//! severity header, the offending line, and a caret underline whose
//! width is `end_column - column`. Color is ANSI and off by default.

use super::{Diagnostic, Level};

const RED: &str = "\x1b[31;1m";
const YELLOW: &str = "\x1b[33;1m";
const CYAN: &str = "\x1b[36;1m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Renders diagnostics to strings for terminal output.
pub struct Renderer {
    color: bool,
    /// Prefix stripped from recorded file paths (`--trimpath`).
    trim_prefix: Option<String>,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            trim_prefix: None,
        }
    }

    pub fn with_trim_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.trim_prefix = Some(prefix.into());
        self
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }

    fn level_color(level: Level) -> &'static str {
        match level {
            Level::Error => RED,
            Level::Warning => YELLOW,
            Level::Note => CYAN,
        }
    }

    fn display_path<'a>(&self, path: &'a str) -> &'a str {
        match &self.trim_prefix {
            Some(prefix) => path.strip_prefix(prefix.as_str()).unwrap_or(path),
            None => path,
        }
    }

    /// Render one diagnostic against the source it refers to.
    pub fn render(&self, diag: &Diagnostic, path: &str, source: &str) -> String {
        let mut out = String::new();

        let header = match diag.code {
            Some(code) => format!("{}[{}]", diag.level, code),
            None => diag.level.to_string(),
        };
        out.push_str(&self.paint(Self::level_color(diag.level), &header));
        out.push_str(&self.paint(BOLD, &format!(": {}", diag.message)));
        out.push('\n');

        if !diag.span.is_dummy() {
            out.push_str(&format!(
                "  --> {}:{}:{}\n",
                self.display_path(path),
                diag.span.line,
                diag.span.column
            ));

            if let Some(line_text) = source.lines().nth(diag.span.line as usize - 1) {
                let line_no = diag.span.line.to_string();
                let gutter = " ".repeat(line_no.len());
                out.push_str(&format!("{} |\n", gutter));
                out.push_str(&format!("{} | {}\n", line_no, line_text));

                let pad = " ".repeat(diag.span.column.saturating_sub(1) as usize);
                let carets = "^".repeat(diag.span.width() as usize);
                out.push_str(&format!(
                    "{} | {}{}\n",
                    gutter,
                    pad,
                    self.paint(Self::level_color(diag.level), &carets)
                ));
            }
        }

        for note in &diag.notes {
            out.push_str(&format!("  = note: {}\n", note));
        }
        if let Some(suggestion) = &diag.suggestion {
            out.push_str(&format!("  = help: did you mean `{}`?\n", suggestion));
        } else if let Some(help) = &diag.help {
            out.push_str(&format!("  = help: {}\n", help));
        }

        out
    }
}
