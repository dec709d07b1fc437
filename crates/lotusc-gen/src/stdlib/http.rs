//! `http` module lowering.
//!
//! `get(fd, host_ptr, host_len, path_ptr, path_len, buf_ptr, buf_len)`
//! writes a complete HTTP/1.0 request over the already-connected
//! descriptor, performs a single `read(2)` into the caller's buffer
//! and returns the byte count.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_http(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "get" => {
                if args.len() < 7 {
                    self.unknown(
                        "http::get requires (fd, host, host_len, path, path_len, buf, buf_len)",
                    );
                    return true;
                }
                self.require_helper(".lotus_http_get", helper_http_get);
                self.gen_user_call(".lotus_http_get", args);
            }
            _ => return false,
        }
        true
    }
}

/// The request writer. Register plan after the prologue: fd `%r12`,
/// host `%r13`, host_len `%r14`, path `%r15`, path_len `%rbx`, buf on
/// the stack, buf_len at `16(%rbp)` (the seventh argument).
fn helper_http_get(gen: &mut CodeGen) -> String {
    let (get_label, get_len) = gen.intern_string("GET ");
    let (mid_label, mid_len) = gen.intern_string(" HTTP/1.0\r\nHost: ");
    let (tail_label, tail_len) = gen.intern_string("\r\nConnection: close\r\n\r\n");

    format!(
        "\
.lotus_http_get:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    pushq %r14
    pushq %r15
    pushq %rbx
    movq %rdi, %r12
    movq %rsi, %r13
    movq %rdx, %r14
    movq %rcx, %r15
    movq %r8, %rbx
    pushq %r9
    movq %r12, %rdi
    leaq {get_label}(%rip), %rsi
    movq ${get_len}, %rdx
    movq $1, %rax
    syscall
    movq %r12, %rdi
    movq %r15, %rsi
    movq %rbx, %rdx
    movq $1, %rax
    syscall
    movq %r12, %rdi
    leaq {mid_label}(%rip), %rsi
    movq ${mid_len}, %rdx
    movq $1, %rax
    syscall
    movq %r12, %rdi
    movq %r13, %rsi
    movq %r14, %rdx
    movq $1, %rax
    syscall
    movq %r12, %rdi
    leaq {tail_label}(%rip), %rsi
    movq ${tail_len}, %rdx
    movq $1, %rax
    syscall
    movq %r12, %rdi
    popq %rsi
    movq 16(%rbp), %rdx
    movq $0, %rax
    syscall
    popq %rbx
    popq %r15
    popq %r14
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    )
}
