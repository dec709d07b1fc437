//! `io` module lowering: the print surface.
//!
//! `printf` and friends parse their format string at compile time into
//! alternating text chunks and placeholders. Text chunks become
//! length-bounded `write(2)` calls against interned `.data` labels;
//! placeholders evaluate the matching argument and invoke the integer
//! printer, string writer or char writer helper. The `sprint` family
//! formats into an `mmap`-allocated heap buffer instead and returns its
//! base pointer.
//!
//! Placeholders: `%d %b %o %x %X %c %s %q %v %%`.

use crate::codegen::CodeGen;
use lotusc_par::{Expr, Type};

/// Where the output of a print call goes.
#[derive(Clone, Copy)]
enum Out {
    /// A compile-time file descriptor (1 = stdout, 2 = stderr).
    Fd(i64),
    /// A runtime descriptor held in `%r12` for the whole call.
    DynFd,
    /// The heap buffer cursor held in `%r13` (sprint family).
    Buffer,
}

/// One compile-time piece of a format string.
enum FmtPart {
    Text(String),
    Spec(char),
}

/// Split a format string into text chunks and placeholders. `%%`
/// collapses into a literal percent inside the surrounding text.
fn parse_format(fmt: &str) -> Vec<FmtPart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = fmt.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => text.push('%'),
            Some(spec) if "dboxXcsqv".contains(spec) => {
                if !text.is_empty() {
                    parts.push(FmtPart::Text(std::mem::take(&mut text)));
                }
                parts.push(FmtPart::Spec(spec));
            }
            Some(other) => {
                // Unknown placeholder passes through literally.
                text.push('%');
                text.push(other);
            }
            None => text.push('%'),
        }
    }
    if !text.is_empty() {
        parts.push(FmtPart::Text(text));
    }
    parts
}

/// Base and hex-letter start for an integer placeholder.
fn spec_base(spec: char) -> (i64, i64) {
    match spec {
        'b' => (2, 'a' as i64),
        'o' => (8, 'a' as i64),
        'x' => (16, 'a' as i64),
        'X' => (16, 'A' as i64),
        _ => (10, 'a' as i64),
    }
}

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_io(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "print" => self.lower_print(Out::Fd(1), args, false),
            "println" => self.lower_print(Out::Fd(1), args, true),
            "printf" => self.lower_printf(Out::Fd(1), args, false),
            "fprintf" => {
                if args.is_empty() {
                    self.unknown("fprintf requires a file descriptor argument");
                    return true;
                }
                self.emit("pushq %r12");
                self.gen_expr(&args[0]);
                self.emit("movq %rax, %r12");
                self.lower_printf(Out::DynFd, &args[1..], false);
                self.emit("popq %r12");
            }
            "fatalf" => self.lower_printf(Out::Fd(2), args, true),
            "fatalln" => {
                self.lower_print(Out::Fd(2), args, true);
                self.emit("movq $1, %rdi");
                self.emit("movq $60, %rax");
                self.emit("syscall");
            }
            "logf" => self.lower_printf(Out::Fd(2), args, false),
            "logln" => self.lower_print(Out::Fd(2), args, true),
            "sprint" => self.lower_sprint(args, false, false),
            "sprintf" => self.lower_sprint(args, true, false),
            "sprintln" => self.lower_sprint(args, true, true),
            _ => return false,
        }
        true
    }

    /// `print`/`println`: one argument written by its kind, plus the
    /// trailing newline for `println`.
    fn lower_print(&mut self, out: Out, args: &[Expr], newline: bool) {
        if let Some(arg) = args.first() {
            self.emit_value(out, arg, 'v');
        }
        if newline {
            let label = self.newline_label();
            self.write_label(out, &label, 1);
        }
    }

    /// `printf`-family core: compile-time format split, one write or
    /// helper call per piece. `then_exit` appends `exit(1)` (fatalf).
    fn lower_printf(&mut self, out: Out, args: &[Expr], then_exit: bool) {
        let Some(Expr::StrLit { value: fmt, .. }) = args.first() else {
            self.unknown("printf requires a string literal format");
            return;
        };

        let parts = parse_format(fmt);
        let mut next_arg = args.iter().skip(1);

        for part in parts {
            match part {
                FmtPart::Text(text) => {
                    let (label, len) = self.intern_string(&text);
                    self.write_label(out, &label, len);
                }
                FmtPart::Spec(spec) => match next_arg.next() {
                    Some(arg) => self.emit_value(out, arg, spec),
                    None => self.unknown(&format!("missing argument for %{}", spec)),
                },
            }
        }

        if then_exit {
            self.emit("movq $1, %rdi");
            self.emit("movq $60, %rax");
            self.emit("syscall");
        }
    }

    /// The `sprint` family: format into an mmap-allocated buffer and
    /// return its base pointer in `%rax`.
    fn lower_sprint(&mut self, args: &[Expr], formatted: bool, newline: bool) {
        self.require_helper(".lotus_sbuf_new", helper_sbuf_new);
        self.emit("pushq %r12");
        self.emit("pushq %r13");
        self.emit("call .lotus_sbuf_new");
        self.emit("movq %rax, %r12");
        self.emit("movq %rax, %r13");

        if formatted {
            if let Some(Expr::StrLit { value: fmt, .. }) = args.first() {
                let parts = parse_format(fmt);
                let mut next_arg = args.iter().skip(1);
                for part in parts {
                    match part {
                        FmtPart::Text(text) => {
                            let (label, _) = self.intern_string(&text);
                            self.require_helper(".lotus_sbuf_write_str", helper_sbuf_write_str);
                            self.emit(&format!("leaq {}(%rip), %rsi", label));
                            self.emit("movq %r13, %rdi");
                            self.emit("call .lotus_sbuf_write_str");
                            self.emit("movq %rax, %r13");
                        }
                        FmtPart::Spec(spec) => match next_arg.next() {
                            Some(arg) => self.emit_value(Out::Buffer, arg, spec),
                            None => self.unknown(&format!("missing argument for %{}", spec)),
                        },
                    }
                }
            } else {
                self.unknown("sprintf requires a string literal format");
            }
        } else if let Some(arg) = args.first() {
            self.emit_value(Out::Buffer, arg, 'v');
        }

        if newline {
            self.emit("movb $10, (%r13)");
            self.emit("incq %r13");
        }

        self.emit("movb $0, (%r13)");
        self.emit("movq %r12, %rax");
        self.emit("popq %r13");
        self.emit("popq %r12");
    }

    /// Emit one value to `out` according to a placeholder spec. `'v'`
    /// prints strings as strings and everything else as decimal.
    fn emit_value(&mut self, out: Out, arg: &Expr, spec: char) {
        match spec {
            's' | 'q' | 'v' if self.expr_is_string(arg) => {
                if spec == 'q' {
                    let (quote, _) = self.intern_string("\"");
                    self.write_label(out, &quote, 1);
                }
                // A literal with a known length gets a direct bounded
                // write; anything else goes through the string writer.
                if let Expr::StrLit { value, .. } = arg {
                    let (label, len) = self.intern_string(value);
                    self.write_label(out, &label, len);
                } else {
                    self.gen_expr(arg);
                    self.write_string_value(out);
                }
                if spec == 'q' {
                    let (quote, _) = self.intern_string("\"");
                    self.write_label(out, &quote, 1);
                }
            }
            'c' => {
                self.gen_expr(arg);
                match out {
                    Out::Buffer => {
                        self.emit("movb %al, (%r13)");
                        self.emit("incq %r13");
                    }
                    _ => {
                        self.require_helper(".lotus_print_char", helper_print_char);
                        self.emit("movq %rax, %rsi");
                        self.load_fd(out);
                        self.emit("call .lotus_print_char");
                    }
                }
            }
            spec => {
                let (base, letter) = spec_base(spec);
                self.gen_expr(arg);
                match out {
                    Out::Buffer => {
                        self.require_helper(".lotus_sbuf_write_int", helper_sbuf_write_int);
                        self.emit("movq %rax, %rsi");
                        self.emit("movq %r13, %rdi");
                        self.emit(&format!("movq ${}, %rdx", base));
                        self.emit(&format!("movq ${}, %rcx", letter));
                        self.emit("call .lotus_sbuf_write_int");
                        self.emit("movq %rax, %r13");
                    }
                    _ => {
                        self.require_helper(".lotus_print_int", helper_print_int);
                        self.emit("movq %rax, %rsi");
                        self.load_fd(out);
                        self.emit(&format!("movq ${}, %rdx", base));
                        self.emit(&format!("movq ${}, %rcx", letter));
                        self.emit("call .lotus_print_int");
                    }
                }
            }
        }
    }

    /// Write an interned label of known length to `out`.
    fn write_label(&mut self, out: Out, label: &str, len: usize) {
        match out {
            Out::Buffer => {
                self.require_helper(".lotus_sbuf_write_str", helper_sbuf_write_str);
                self.emit(&format!("leaq {}(%rip), %rsi", label));
                self.emit("movq %r13, %rdi");
                self.emit("call .lotus_sbuf_write_str");
                self.emit("movq %rax, %r13");
            }
            _ => {
                self.load_fd(out);
                self.emit(&format!("leaq {}(%rip), %rsi", label));
                self.emit(&format!("movq ${}, %rdx", len));
                self.emit("movq $1, %rax");
                self.emit("syscall");
            }
        }
    }

    /// Write the NUL-terminated string whose pointer is in `%rax`.
    fn write_string_value(&mut self, out: Out) {
        match out {
            Out::Buffer => {
                self.require_helper(".lotus_sbuf_write_str", helper_sbuf_write_str);
                self.emit("movq %rax, %rsi");
                self.emit("movq %r13, %rdi");
                self.emit("call .lotus_sbuf_write_str");
                self.emit("movq %rax, %r13");
            }
            _ => {
                self.require_helper(".lotus_print_str", helper_print_str);
                self.emit("movq %rax, %rsi");
                self.load_fd(out);
                self.emit("call .lotus_print_str");
            }
        }
    }

    fn load_fd(&mut self, out: Out) {
        match out {
            Out::Fd(fd) => self.emit(&format!("movq ${}, %rdi", fd)),
            Out::DynFd => self.emit("movq %r12, %rdi"),
            Out::Buffer => {}
        }
    }

    /// Is this expression a string at run time?
    pub(crate) fn expr_is_string(&self, expr: &Expr) -> bool {
        match expr {
            Expr::StrLit { .. } => true,
            Expr::Ident { name, .. } => self
                .frame
                .variable(name)
                .map(|v| v.ty == Type::Str)
                .or_else(|| self.frame.constant(name).map(|c| c.ty == Type::Str))
                .unwrap_or(false),
            Expr::Call { name, .. } => matches!(
                name.as_str(),
                "concat" | "copy" | "sprint" | "sprintf" | "sprintln"
                    | "str::concat" | "str::copy"
                    | "io::sprint" | "io::sprintf" | "io::sprintln"
            ),
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => self.expr_is_string(then_expr) && self.expr_is_string(else_expr),
            _ => false,
        }
    }
}

// =============================================================================
// Helper routines
// =============================================================================

/// Integer printer: fd in `%rdi`, value in `%rsi`, base in `%rdx`,
/// hex-letter start in `%rcx`. Divides into the scratch buffer, the
/// minus sign is appended after the digits and the whole run is
/// reversed in place, then written with one `write(2)`. Negation runs
/// through unsigned division so `LLONG_MIN` keeps its magnitude.
fn helper_print_int(gen: &mut CodeGen) -> String {
    let buf = gen.emit_intbuf();
    format!(
        "\
.lotus_print_int:
    pushq %rbp
    movq %rsp, %rbp
    pushq %rbx
    movq %rdi, %r9
    movq %rsi, %rax
    movq %rdx, %r8
    movq %rcx, %rbx
    leaq {buf}(%rip), %rsi
    xorq %r10, %r10
    xorq %rcx, %rcx
    testq %rax, %rax
    jns .lotus_print_int_loop
    movq $1, %rcx
    negq %rax
.lotus_print_int_loop:
    xorq %rdx, %rdx
    divq %r8
    cmpq $10, %rdx
    jl .lotus_print_int_digit
    leaq -10(%rdx,%rbx), %rdx
    jmp .lotus_print_int_store
.lotus_print_int_digit:
    addq $48, %rdx
.lotus_print_int_store:
    movb %dl, (%rsi,%r10)
    incq %r10
    testq %rax, %rax
    jnz .lotus_print_int_loop
    testq %rcx, %rcx
    jz .lotus_print_int_reverse
    movb $45, (%rsi,%r10)
    incq %r10
.lotus_print_int_reverse:
    xorq %rcx, %rcx
    movq %r10, %rdx
    decq %rdx
.lotus_print_int_swap:
    cmpq %rdx, %rcx
    jge .lotus_print_int_write
    movb (%rsi,%rcx), %al
    movb (%rsi,%rdx), %bl
    movb %bl, (%rsi,%rcx)
    movb %al, (%rsi,%rdx)
    incq %rcx
    decq %rdx
    jmp .lotus_print_int_swap
.lotus_print_int_write:
    movq $1, %rax
    movq %r9, %rdi
    movq %r10, %rdx
    syscall
    popq %rbx
    movq %rbp, %rsp
    popq %rbp
    ret
"
    )
}

/// String writer: fd in `%rdi`, pointer in `%rsi`; scans to NUL and
/// writes once.
fn helper_print_str(_gen: &mut CodeGen) -> String {
    "\
.lotus_print_str:
    pushq %rbp
    movq %rsp, %rbp
    movq %rsi, %r8
    xorq %rdx, %rdx
.lotus_print_str_scan:
    cmpb $0, (%r8,%rdx)
    je .lotus_print_str_write
    incq %rdx
    jmp .lotus_print_str_scan
.lotus_print_str_write:
    movq $1, %rax
    syscall
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Char writer: fd in `%rdi`, char in `%rsi`.
fn helper_print_char(gen: &mut CodeGen) -> String {
    let buf = gen.emit_charbuf();
    format!(
        "\
.lotus_print_char:
    pushq %rbp
    movq %rsp, %rbp
    leaq {buf}(%rip), %r8
    movb %sil, (%r8)
    movq %r8, %rsi
    movq $1, %rdx
    movq $1, %rax
    syscall
    movq %rbp, %rsp
    popq %rbp
    ret
"
    )
}

/// Allocate a 4096-byte string buffer with `mmap(2)`; base in `%rax`.
fn helper_sbuf_new(_gen: &mut CodeGen) -> String {
    "\
.lotus_sbuf_new:
    movq $9, %rax
    xorq %rdi, %rdi
    movq $4096, %rsi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    ret
"
    .to_string()
}

/// Copy a NUL-terminated string: dst in `%rdi`, src in `%rsi`;
/// returns the advanced dst cursor in `%rax`.
fn helper_sbuf_write_str(_gen: &mut CodeGen) -> String {
    "\
.lotus_sbuf_write_str:
    movq %rdi, %rax
.lotus_sbuf_write_str_loop:
    movb (%rsi), %cl
    testb %cl, %cl
    jz .lotus_sbuf_write_str_done
    movb %cl, (%rax)
    incq %rax
    incq %rsi
    jmp .lotus_sbuf_write_str_loop
.lotus_sbuf_write_str_done:
    ret
"
    .to_string()
}

/// Format an integer into a buffer: dst in `%rdi`, value in `%rsi`,
/// base in `%rdx`, hex-letter start in `%rcx`; returns the advanced
/// cursor in `%rax`.
fn helper_sbuf_write_int(_gen: &mut CodeGen) -> String {
    "\
.lotus_sbuf_write_int:
    pushq %rbx
    movq %rcx, %rbx
    movq %rsi, %rax
    movq %rdx, %r8
    movq %rdi, %r9
    testq %rax, %rax
    jns .lotus_sbuf_write_int_digits
    movb $45, (%r9)
    incq %r9
    negq %rax
.lotus_sbuf_write_int_digits:
    movq %r9, %r10
.lotus_sbuf_write_int_loop:
    xorq %rdx, %rdx
    divq %r8
    cmpq $10, %rdx
    jl .lotus_sbuf_write_int_digit
    leaq -10(%rdx,%rbx), %rdx
    jmp .lotus_sbuf_write_int_store
.lotus_sbuf_write_int_digit:
    addq $48, %rdx
.lotus_sbuf_write_int_store:
    movb %dl, (%r9)
    incq %r9
    testq %rax, %rax
    jnz .lotus_sbuf_write_int_loop
    movq %r9, %rdx
    decq %rdx
.lotus_sbuf_write_int_swap:
    cmpq %rdx, %r10
    jge .lotus_sbuf_write_int_done
    movb (%r10), %al
    movb (%rdx), %bl
    movb %bl, (%r10)
    movb %al, (%rdx)
    incq %r10
    decq %rdx
    jmp .lotus_sbuf_write_int_swap
.lotus_sbuf_write_int_done:
    movq %r9, %rax
    popq %rbx
    ret
"
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_lex::Lexer;
    use lotusc_par::Parser;
    use lotusc_util::Handler;

    fn gen(source: &str) -> String {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        CodeGen::new(&handler).generate(&ast)
    }

    #[test]
    fn test_parse_format_splits_text_and_specs() {
        let parts = parse_format("x=%d, s=%s, 100%%");
        let rendered: Vec<String> = parts
            .iter()
            .map(|p| match p {
                FmtPart::Text(t) => format!("T({})", t),
                FmtPart::Spec(c) => format!("S({})", c),
            })
            .collect();
        assert_eq!(rendered, vec!["T(x=)", "S(d)", "T(, s=)", "S(s)", "T(, 100%)"]);
    }

    #[test]
    fn test_parse_format_all_specs() {
        let parts = parse_format("%d%b%o%x%X%c%s%q%v");
        assert_eq!(parts.len(), 9);
        assert!(parts.iter().all(|p| matches!(p, FmtPart::Spec(_))));
    }

    #[test]
    fn test_println_literal_writes_bounded() {
        let asm = gen("use \"io\";\nfn int main() { println(\"Hello, World!\"); ret 0; }");
        assert!(asm.contains(".asciz \"Hello, World!\""));
        // length-bounded write of the 13 text bytes, then the newline
        assert!(asm.contains("movq $13, %rdx"));
        assert!(asm.contains(".newline0"));
        assert!(asm.contains("movq $1, %rax"));
    }

    #[test]
    fn test_println_int_variable_uses_int_printer() {
        let asm = gen("use \"io\";\nint x = 7;\nprintln(x);");
        assert!(asm.contains("call .lotus_print_int"));
        assert!(asm.contains(".lotus_print_int:"));
        assert!(asm.contains(".intbuf0:"));
        assert!(asm.contains("divq %r8"));
    }

    #[test]
    fn test_printf_placeholders() {
        let asm = gen("use \"io\";\nint x = 5;\nprintf(\"v=%d hex=%X\\n\", x, x);");
        assert!(asm.contains("movq $10, %rdx"));
        assert!(asm.contains("movq $16, %rdx"));
        assert!(asm.contains(&format!("movq ${}, %rcx", 'A' as i64)));
    }

    #[test]
    fn test_fatalf_appends_exit_one() {
        let asm = gen("use \"io\";\nfatalf(\"boom\\n\");");
        assert!(asm.contains("movq $2, %rdi"));
        let exit_pos = asm.find("movq $1, %rdi").expect("exit code 1");
        assert!(asm[exit_pos..].contains("movq $60, %rax"));
    }

    #[test]
    fn test_fprintf_uses_dynamic_fd() {
        let asm = gen("use \"io\";\nint fd = 2;\nfprintf(fd, \"x\");");
        assert!(asm.contains("movq %rax, %r12"));
        assert!(asm.contains("movq %r12, %rdi"));
    }

    #[test]
    fn test_sprint_allocates_and_returns_buffer() {
        let asm = gen("use \"io\";\nstr s = sprintf(\"n=%d\", 4);\nprintln(s);");
        assert!(asm.contains("call .lotus_sbuf_new"));
        assert!(asm.contains("call .lotus_sbuf_write_str"));
        assert!(asm.contains("call .lotus_sbuf_write_int"));
        assert!(asm.contains("movb $0, (%r13)"));
        // mmap syscall with PROT_READ|PROT_WRITE and
        // MAP_PRIVATE|MAP_ANONYMOUS
        assert!(asm.contains("movq $9, %rax"));
        assert!(asm.contains("movq $3, %rdx"));
        assert!(asm.contains("movq $34, %r10"));
    }

    #[test]
    fn test_qualified_io_name_is_alias() {
        let plain = gen("use \"io\";\nprintln(\"x\");");
        let qualified = gen("io::println(\"x\");");
        // Same lowering surface: both write the literal and a newline.
        assert!(plain.contains(".asciz \"x\""));
        assert!(qualified.contains(".asciz \"x\""));
        assert!(qualified.contains(".newline0"));
    }

    #[test]
    fn test_helper_emitted_once() {
        let asm = gen("use \"io\";\nint x = 1;\nprintln(x);\nprintln(x);\nprintln(x);");
        assert_eq!(asm.matches(".lotus_print_int:").count(), 1);
        assert_eq!(asm.matches("call .lotus_print_int").count(), 3);
    }
}
