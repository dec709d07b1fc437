//! `mem` module lowering: raw allocation and byte operations.
//!
//! `malloc`/`mmap` lower to the `mmap(2)` syscall with
//! `PROT_READ|PROT_WRITE` and `MAP_PRIVATE|MAP_ANONYMOUS`; `free` is a
//! no-op (only `munmap` returns pages); `memcpy`/`memset` are byte
//! loops returning the destination.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_mem(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "malloc" | "mmap" => {
                if let Some(size) = args.first() {
                    self.gen_expr(size);
                    self.emit("movq %rax, %rsi");
                } else {
                    self.emit("movq $4096, %rsi");
                }
                self.emit("movq $9, %rax");
                self.emit("xorq %rdi, %rdi");
                self.emit("movq $3, %rdx");
                self.emit("movq $34, %r10");
                self.emit("movq $-1, %r8");
                self.emit("xorq %r9, %r9");
                self.emit("syscall");
            }
            "free" => {
                // Pages are only returned through munmap.
                if let Some(ptr) = args.first() {
                    self.gen_expr(ptr);
                }
                self.emit_comment("mem::free is a no-op");
            }
            "munmap" => {
                if args.len() < 2 {
                    self.unknown("munmap requires a pointer and a size");
                    return true;
                }
                self.gen_expr(&args[0]);
                self.emit("pushq %rax");
                self.gen_expr(&args[1]);
                self.emit("movq %rax, %rsi");
                self.emit("popq %rdi");
                self.emit("movq $11, %rax");
                self.emit("syscall");
            }
            "memcpy" => {
                self.require_helper(".lotus_memcpy", helper_memcpy);
                self.gen_user_call(".lotus_memcpy", args);
            }
            "memset" => {
                self.require_helper(".lotus_memset", helper_memset);
                self.gen_user_call(".lotus_memset", args);
            }
            _ => return false,
        }
        true
    }
}

/// Byte copy: dst `%rdi`, src `%rsi`, count `%rdx`; returns dst.
fn helper_memcpy(_gen: &mut CodeGen) -> String {
    "\
.lotus_memcpy:
    movq %rdi, %rax
    xorq %rcx, %rcx
.lotus_memcpy_loop:
    cmpq %rdx, %rcx
    jge .lotus_memcpy_done
    movb (%rsi,%rcx), %r8b
    movb %r8b, (%rdi,%rcx)
    incq %rcx
    jmp .lotus_memcpy_loop
.lotus_memcpy_done:
    ret
"
    .to_string()
}

/// Byte fill: dst `%rdi`, value `%rsi`, count `%rdx`; returns dst.
fn helper_memset(_gen: &mut CodeGen) -> String {
    "\
.lotus_memset:
    movq %rdi, %rax
    xorq %rcx, %rcx
.lotus_memset_loop:
    cmpq %rdx, %rcx
    jge .lotus_memset_done
    movb %sil, (%rdi,%rcx)
    incq %rcx
    jmp .lotus_memset_loop
.lotus_memset_done:
    ret
"
    .to_string()
}
