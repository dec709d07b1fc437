//! `str` module lowering.
//!
//! `len` is a compile-time constant when the length table knows the
//! operand, a runtime NUL scan otherwise. `concat` and `copy` allocate
//! `len(a)+len(b)+1` bytes with `mmap(2)` and return NULL on
//! allocation failure without touching the would-be buffer. `indexOf`
//! picks the single-char or substring search at compile time from the
//! needle argument.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_str(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "len" => {
                match args.first() {
                    Some(arg) => {
                        if let Some(len) = self.literal_string_length(arg) {
                            self.emit(&format!("movq ${}, %rax", len));
                        } else {
                            self.require_helper(".lotus_strlen", helper_strlen);
                            self.gen_expr(arg);
                            self.emit("movq %rax, %rdi");
                            self.emit("call .lotus_strlen");
                        }
                    }
                    None => self.emit("movq $0, %rax"),
                }
            }
            "concat" => {
                self.require_helper(".lotus_str_concat", helper_concat);
                self.gen_str_pair(args);
                self.emit("call .lotus_str_concat");
            }
            "copy" => {
                self.require_helper(".lotus_str_copy", helper_copy);
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("call .lotus_str_copy");
            }
            "compare" => {
                self.require_helper(".lotus_str_compare", helper_compare);
                self.gen_str_pair(args);
                self.emit("call .lotus_str_compare");
            }
            "indexOf" => self.lower_index_of(args),
            "contains" => {
                self.lower_index_of(args);
                self.emit("cmpq $0, %rax");
                self.emit("setge %al");
                self.emit("movzbq %al, %rax");
            }
            "startsWith" => {
                self.require_helper(".lotus_str_startswith", helper_startswith);
                self.gen_str_pair(args);
                self.emit("call .lotus_str_startswith");
            }
            "endsWith" => {
                self.require_helper(".lotus_str_endswith", helper_endswith);
                self.gen_str_pair(args);
                self.emit("call .lotus_str_endswith");
            }
            _ => return false,
        }
        true
    }

    /// Evaluate two pointer arguments into `%rdi`/`%rsi`.
    fn gen_str_pair(&mut self, args: &[Expr]) {
        if args.len() < 2 {
            self.unknown("expected two string arguments");
            self.emit("movq $0, %rdi");
            self.emit("movq $0, %rsi");
            return;
        }
        self.gen_expr(&args[0]);
        self.emit("pushq %rax");
        self.gen_expr(&args[1]);
        self.emit("movq %rax, %rsi");
        self.emit("popq %rdi");
    }

    /// The needle decides the search at compile time: a single-char
    /// literal or an integer expression scans bytes, a longer string
    /// literal or string expression runs the naive substring search.
    fn lower_index_of(&mut self, args: &[Expr]) {
        if args.len() < 2 {
            self.unknown("indexOf requires a haystack and a needle");
            self.emit("movq $-1, %rax");
            return;
        }

        let needle_is_char = match &args[1] {
            Expr::StrLit { value, .. } => value.len() == 1,
            needle => !self.expr_is_string(needle),
        };

        if needle_is_char {
            self.require_helper(".lotus_str_indexof_char", helper_indexof_char);
            self.gen_expr(&args[0]);
            self.emit("pushq %rax");
            match &args[1] {
                Expr::StrLit { value, .. } => {
                    let byte = value.bytes().next().unwrap_or(0);
                    self.emit(&format!("movq ${}, %rsi", byte));
                }
                needle => {
                    self.gen_expr(needle);
                    self.emit("movq %rax, %rsi");
                }
            }
            self.emit("popq %rdi");
            self.emit("call .lotus_str_indexof_char");
        } else {
            self.require_helper(".lotus_str_indexof_str", helper_indexof_str);
            self.gen_str_pair(args);
            self.emit("call .lotus_str_indexof_str");
        }
    }
}

/// NUL scan: pointer in `%rdi`, length in `%rax`.
fn helper_strlen(_gen: &mut CodeGen) -> String {
    "\
.lotus_strlen:
    xorq %rax, %rax
.lotus_strlen_loop:
    cmpb $0, (%rdi,%rax)
    je .lotus_strlen_done
    incq %rax
    jmp .lotus_strlen_loop
.lotus_strlen_done:
    ret
"
    .to_string()
}

/// Concatenate: `a` in `%rdi`, `b` in `%rsi`; allocates
/// `len(a)+len(b)+1` via `mmap(2)`, copies both, NUL-terminates.
/// A failed map (sign bit set) returns NULL before any store.
fn helper_concat(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_concat:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    pushq %r13
    movq %rdi, %r12
    movq %rsi, %r13
    xorq %r8, %r8
.lotus_str_concat_len_a:
    cmpb $0, (%r12,%r8)
    je .lotus_str_concat_len_b_start
    incq %r8
    jmp .lotus_str_concat_len_a
.lotus_str_concat_len_b_start:
    xorq %r9, %r9
.lotus_str_concat_len_b:
    cmpb $0, (%r13,%r9)
    je .lotus_str_concat_alloc
    incq %r9
    jmp .lotus_str_concat_len_b
.lotus_str_concat_alloc:
    leaq 1(%r8,%r9), %rsi
    pushq %r8
    pushq %r9
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    popq %r9
    popq %r8
    testq %rax, %rax
    js .lotus_str_concat_fail
    xorq %rcx, %rcx
.lotus_str_concat_copy_a:
    cmpq %r8, %rcx
    jge .lotus_str_concat_copy_b_start
    movb (%r12,%rcx), %dl
    movb %dl, (%rax,%rcx)
    incq %rcx
    jmp .lotus_str_concat_copy_a
.lotus_str_concat_copy_b_start:
    xorq %rcx, %rcx
.lotus_str_concat_copy_b:
    cmpq %r9, %rcx
    jge .lotus_str_concat_nul
    movb (%r13,%rcx), %dl
    movq %r8, %rdi
    addq %rcx, %rdi
    movb %dl, (%rax,%rdi)
    incq %rcx
    jmp .lotus_str_concat_copy_b
.lotus_str_concat_nul:
    movq %r8, %rdi
    addq %r9, %rdi
    movb $0, (%rax,%rdi)
    jmp .lotus_str_concat_done
.lotus_str_concat_fail:
    movq $0, %rax
.lotus_str_concat_done:
    popq %r13
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Duplicate one string with the same allocate-and-copy strategy as
/// `concat`.
fn helper_copy(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_copy:
    pushq %rbp
    movq %rsp, %rbp
    pushq %r12
    movq %rdi, %r12
    xorq %r8, %r8
.lotus_str_copy_len:
    cmpb $0, (%r12,%r8)
    je .lotus_str_copy_alloc
    incq %r8
    jmp .lotus_str_copy_len
.lotus_str_copy_alloc:
    leaq 1(%r8), %rsi
    pushq %r8
    movq $9, %rax
    xorq %rdi, %rdi
    movq $3, %rdx
    movq $34, %r10
    movq $-1, %r8
    xorq %r9, %r9
    syscall
    popq %r8
    testq %rax, %rax
    js .lotus_str_copy_fail
    xorq %rcx, %rcx
.lotus_str_copy_loop:
    cmpq %r8, %rcx
    jge .lotus_str_copy_nul
    movb (%r12,%rcx), %dl
    movb %dl, (%rax,%rcx)
    incq %rcx
    jmp .lotus_str_copy_loop
.lotus_str_copy_nul:
    movb $0, (%rax,%r8)
    jmp .lotus_str_copy_done
.lotus_str_copy_fail:
    movq $0, %rax
.lotus_str_copy_done:
    popq %r12
    movq %rbp, %rsp
    popq %rbp
    ret
"
    .to_string()
}

/// Lexicographic compare: the signed difference of the first
/// mismatching bytes, 0 for equal strings.
fn helper_compare(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_compare:
    xorq %rcx, %rcx
.lotus_str_compare_loop:
    movzbq (%rdi,%rcx), %rax
    movzbq (%rsi,%rcx), %rdx
    cmpq %rdx, %rax
    jne .lotus_str_compare_diff
    testq %rax, %rax
    jz .lotus_str_compare_done
    incq %rcx
    jmp .lotus_str_compare_loop
.lotus_str_compare_diff:
    subq %rdx, %rax
    ret
.lotus_str_compare_done:
    movq $0, %rax
    ret
"
    .to_string()
}

/// Byte scan: haystack in `%rdi`, char in `%rsi`; index or -1.
fn helper_indexof_char(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_indexof_char:
    xorq %rax, %rax
.lotus_str_indexof_char_loop:
    movzbq (%rdi,%rax), %rdx
    testq %rdx, %rdx
    jz .lotus_str_indexof_char_missing
    cmpq %rsi, %rdx
    je .lotus_str_indexof_char_done
    incq %rax
    jmp .lotus_str_indexof_char_loop
.lotus_str_indexof_char_missing:
    movq $-1, %rax
.lotus_str_indexof_char_done:
    ret
"
    .to_string()
}

/// Naive substring search: haystack in `%rdi`, needle in `%rsi`;
/// first match index or -1.
fn helper_indexof_str(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_indexof_str:
    xorq %rax, %rax
.lotus_str_indexof_str_outer:
    xorq %rcx, %rcx
.lotus_str_indexof_str_inner:
    movzbq (%rsi,%rcx), %rdx
    testq %rdx, %rdx
    jz .lotus_str_indexof_str_found
    movq %rax, %r8
    addq %rcx, %r8
    movzbq (%rdi,%r8), %r9
    testq %r9, %r9
    jz .lotus_str_indexof_str_missing
    cmpq %rdx, %r9
    jne .lotus_str_indexof_str_next
    incq %rcx
    jmp .lotus_str_indexof_str_inner
.lotus_str_indexof_str_next:
    incq %rax
    jmp .lotus_str_indexof_str_outer
.lotus_str_indexof_str_missing:
    movq $-1, %rax
.lotus_str_indexof_str_found:
    ret
"
    .to_string()
}

/// Prefix check: string in `%rdi`, prefix in `%rsi`; 1 or 0.
fn helper_startswith(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_startswith:
    xorq %rcx, %rcx
.lotus_str_startswith_loop:
    movzbq (%rsi,%rcx), %rdx
    testq %rdx, %rdx
    jz .lotus_str_startswith_yes
    movzbq (%rdi,%rcx), %rax
    cmpq %rdx, %rax
    jne .lotus_str_startswith_no
    incq %rcx
    jmp .lotus_str_startswith_loop
.lotus_str_startswith_yes:
    movq $1, %rax
    ret
.lotus_str_startswith_no:
    movq $0, %rax
    ret
"
    .to_string()
}

/// Suffix check compared from the tails: string in `%rdi`, suffix in
/// `%rsi`; 1 or 0.
fn helper_endswith(_gen: &mut CodeGen) -> String {
    "\
.lotus_str_endswith:
    xorq %r8, %r8
.lotus_str_endswith_len_s:
    cmpb $0, (%rdi,%r8)
    je .lotus_str_endswith_len_suffix_start
    incq %r8
    jmp .lotus_str_endswith_len_s
.lotus_str_endswith_len_suffix_start:
    xorq %r9, %r9
.lotus_str_endswith_len_suffix:
    cmpb $0, (%rsi,%r9)
    je .lotus_str_endswith_check
    incq %r9
    jmp .lotus_str_endswith_len_suffix
.lotus_str_endswith_check:
    cmpq %r8, %r9
    jg .lotus_str_endswith_no
    movq %r8, %rcx
    subq %r9, %rcx
    addq %rcx, %rdi
    xorq %rdx, %rdx
.lotus_str_endswith_cmp:
    cmpq %r9, %rdx
    jge .lotus_str_endswith_yes
    movzbq (%rdi,%rdx), %rax
    movzbq (%rsi,%rdx), %rcx
    cmpq %rcx, %rax
    jne .lotus_str_endswith_no
    incq %rdx
    jmp .lotus_str_endswith_cmp
.lotus_str_endswith_yes:
    movq $1, %rax
    ret
.lotus_str_endswith_no:
    movq $0, %rax
    ret
"
    .to_string()
}
