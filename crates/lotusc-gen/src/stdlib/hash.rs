//! `hash` module lowering.
//!
//! Non-cryptographic hashes are real: `crc32` (IEEE 802.3 polynomial
//! over a lazily emitted 256-entry table), 64-bit `fnv1a`, `djb2` over
//! a NUL-terminated string, and the 32-bit MurmurHash3. `sha256` and
//! `md5` are placeholders that zero the digest buffer; callers must
//! not rely on them for security.

use crate::codegen::CodeGen;
use lotusc_par::Expr;
use std::fmt::Write as _;

/// IEEE 802.3 CRC-32 table.
fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let mut c = i as u32;
        for _ in 0..8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
        }
        *entry = c;
    }
    table
}

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_hash(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "crc32" => {
                self.require_helper(".lotus_crc32", helper_crc32);
                self.gen_ptr_len(args);
                self.emit("call .lotus_crc32");
            }
            "fnv1a" => {
                self.require_helper(".lotus_fnv1a", helper_fnv1a);
                self.gen_ptr_len(args);
                self.emit("call .lotus_fnv1a");
            }
            "djb2" => {
                self.require_helper(".lotus_djb2", helper_djb2);
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("call .lotus_djb2");
            }
            "murmur3" => {
                self.require_helper(".lotus_murmur3", helper_murmur3);
                self.gen_ptr_len(args);
                self.emit("call .lotus_murmur3");
            }
            "sha256" => {
                // Placeholder: the 32-byte digest is zeroed.
                self.emit_comment("hash::sha256 placeholder: digest is zeroed");
                self.zero_digest(args, 32);
            }
            "md5" => {
                self.emit_comment("hash::md5 placeholder: digest is zeroed");
                self.zero_digest(args, 16);
            }
            _ => return false,
        }
        true
    }

    /// Evaluate `(ptr, len)` arguments into `%rdi`/`%rsi`. A literal
    /// string argument gets its compile-time length when the call
    /// omits one.
    fn gen_ptr_len(&mut self, args: &[Expr]) {
        match args {
            [data] => {
                let len = self.literal_string_length(data).unwrap_or(0);
                self.gen_expr(data);
                self.emit("movq %rax, %rdi");
                self.emit(&format!("movq ${}, %rsi", len));
            }
            [data, len, ..] => {
                self.gen_expr(data);
                self.emit("pushq %rax");
                self.gen_expr(len);
                self.emit("movq %rax, %rsi");
                self.emit("popq %rdi");
            }
            [] => {
                self.unknown("hash function requires a data argument");
                self.emit("movq $0, %rdi");
                self.emit("movq $0, %rsi");
            }
        }
    }

    /// `(data, len, out)`: evaluate everything, zero `bytes` of the
    /// output buffer, return its pointer.
    fn zero_digest(&mut self, args: &[Expr], bytes: usize) {
        if args.len() < 3 {
            self.unknown("digest functions take (data, len, out)");
            self.emit("movq $0, %rax");
            return;
        }
        self.gen_expr(&args[0]);
        self.gen_expr(&args[1]);
        self.gen_expr(&args[2]);
        for offset in (0..bytes).step_by(8) {
            self.emit(&format!("movq $0, {}(%rax)", offset));
        }
    }
}

/// CRC-32: data in `%rdi`, length in `%rsi`; table-driven, bitwise
/// inverted in and out.
fn helper_crc32(gen: &mut CodeGen) -> String {
    let mut table_data = String::from(".lotus_crc32_table:\n");
    for chunk in crc32_table().chunks(8) {
        let row: Vec<String> = chunk.iter().map(|v| format!("{}", v)).collect();
        let _ = writeln!(table_data, "    .long {}", row.join(", "));
    }
    gen.append_data(&table_data);

    "\
.lotus_crc32:
    movl $4294967295, %eax
    xorq %rcx, %rcx
    leaq .lotus_crc32_table(%rip), %r8
.lotus_crc32_loop:
    cmpq %rsi, %rcx
    jge .lotus_crc32_done
    movzbl (%rdi,%rcx), %edx
    xorl %eax, %edx
    andl $255, %edx
    shrl $8, %eax
    xorl (%r8,%rdx,4), %eax
    incq %rcx
    jmp .lotus_crc32_loop
.lotus_crc32_done:
    notl %eax
    ret
"
    .to_string()
}

/// FNV-1a 64-bit: offset basis 0xcbf29ce484222325, prime
/// 0x100000001b3.
fn helper_fnv1a(_gen: &mut CodeGen) -> String {
    "\
.lotus_fnv1a:
    movabsq $0xcbf29ce484222325, %rax
    movabsq $0x100000001b3, %r8
    xorq %rcx, %rcx
.lotus_fnv1a_loop:
    cmpq %rsi, %rcx
    jge .lotus_fnv1a_done
    movzbq (%rdi,%rcx), %rdx
    xorq %rdx, %rax
    imulq %r8, %rax
    incq %rcx
    jmp .lotus_fnv1a_loop
.lotus_fnv1a_done:
    ret
"
    .to_string()
}

/// djb2 over a NUL-terminated string: `h = h*33 + c` from 5381.
fn helper_djb2(_gen: &mut CodeGen) -> String {
    "\
.lotus_djb2:
    movq $5381, %rax
.lotus_djb2_loop:
    movzbq (%rdi), %rdx
    testq %rdx, %rdx
    jz .lotus_djb2_done
    movq %rax, %rcx
    salq $5, %rax
    addq %rcx, %rax
    addq %rdx, %rax
    incq %rdi
    jmp .lotus_djb2_loop
.lotus_djb2_done:
    ret
"
    .to_string()
}

/// MurmurHash3 x86_32 with seed 0: 4-byte blocks, tail bytes, final
/// avalanche.
fn helper_murmur3(_gen: &mut CodeGen) -> String {
    "\
.lotus_murmur3:
    xorl %eax, %eax
    movq %rsi, %r10
    andq $-4, %r10
    xorq %rcx, %rcx
.lotus_murmur3_blocks:
    cmpq %r10, %rcx
    jge .lotus_murmur3_tail
    movl (%rdi,%rcx), %edx
    imull $0xcc9e2d51, %edx, %edx
    roll $15, %edx
    imull $0x1b873593, %edx, %edx
    xorl %edx, %eax
    roll $13, %eax
    imull $5, %eax, %eax
    addl $0xe6546b64, %eax
    addq $4, %rcx
    jmp .lotus_murmur3_blocks
.lotus_murmur3_tail:
    movq %rsi, %rdx
    subq %r10, %rdx
    xorl %r9d, %r9d
    cmpq $3, %rdx
    jl .lotus_murmur3_tail2
    movzbl 2(%rdi,%r10), %r9d
    sall $16, %r9d
.lotus_murmur3_tail2:
    cmpq $2, %rdx
    jl .lotus_murmur3_tail1
    movzbl 1(%rdi,%r10), %r8d
    sall $8, %r8d
    orl %r8d, %r9d
.lotus_murmur3_tail1:
    cmpq $1, %rdx
    jl .lotus_murmur3_fmix
    movzbl (%rdi,%r10), %r8d
    orl %r8d, %r9d
    imull $0xcc9e2d51, %r9d, %r9d
    roll $15, %r9d
    imull $0x1b873593, %r9d, %r9d
    xorl %r9d, %eax
.lotus_murmur3_fmix:
    xorl %esi, %eax
    movl %eax, %edx
    shrl $16, %edx
    xorl %edx, %eax
    imull $0x85ebca6b, %eax, %eax
    movl %eax, %edx
    shrl $13, %edx
    xorl %edx, %eax
    imull $0xc2b2ae35, %eax, %eax
    movl %eax, %edx
    shrl $16, %edx
    xorl %edx, %eax
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
    fn test_crc32_table_known_values() {
        let table = crc32_table();
        assert_eq!(table[0], 0);
        assert_eq!(table[1], 0x77073096);
        assert_eq!(table[255], 0x2D02EF8D);
    }

    #[test]
    fn test_crc32_emits_table_once() {
        let asm = gen("use \"hash\";\nint a = crc32(\"abc\");\nint b = crc32(\"def\");");
        assert_eq!(asm.matches(".lotus_crc32_table:").count(), 1);
        assert!(asm.contains(".long 0, 1996959894"));
        assert!(asm.contains("notl %eax"));
    }

    #[test]
    fn test_fnv1a_constants() {
        let asm = gen("use \"hash\";\nint h = fnv1a(\"abc\");");
        assert!(asm.contains("movabsq $0xcbf29ce484222325, %rax"));
        assert!(asm.contains("movabsq $0x100000001b3, %r8"));
    }

    #[test]
    fn test_djb2_shift_add() {
        let asm = gen("use \"hash\";\nint h = djb2(\"abc\");");
        assert!(asm.contains("movq $5381, %rax"));
        assert!(asm.contains("salq $5, %rax"));
    }

    #[test]
    fn test_murmur3_mixer_constants() {
        let asm = gen("use \"hash\";\nint h = murmur3(\"abcd\");");
        assert!(asm.contains("imull $0xcc9e2d51, %edx, %edx"));
        assert!(asm.contains("roll $15, %edx"));
        assert!(asm.contains("imull $0x85ebca6b, %eax, %eax"));
    }

    #[test]
    fn test_sha256_placeholder_zeroes() {
        let asm =
            gen("use \"hash\";\nuse \"mem\";\nint out = mem::mmap(32);\nsha256(\"x\", 1, out);");
        assert!(asm.contains("# hash::sha256 placeholder: digest is zeroed"));
        assert!(asm.contains("movq $0, 24(%rax)"));
    }

    #[test]
    fn test_md5_placeholder_zeroes() {
        let asm = gen("use \"hash\";\nuse \"mem\";\nint out = mem::mmap(16);\nmd5(\"x\", 1, out);");
        assert!(asm.contains("# hash::md5 placeholder: digest is zeroed"));
        assert!(asm.contains("movq $0, 8(%rax)"));
        assert!(!asm.contains("movq $0, 16(%rax)"));
    }
}
