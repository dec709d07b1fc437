//! `num` module lowering: width conversions.
//!
//! Signed targets sign-extend from the narrow register, unsigned
//! targets zero-extend (masking), and `toBool` collapses to 0/1.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_num(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "toInt8" => {
                self.gen_single(args);
                self.emit("movsbq %al, %rax");
            }
            "toUint8" => {
                self.gen_single(args);
                self.emit("movzbq %al, %rax");
            }
            "toInt16" => {
                self.gen_single(args);
                self.emit("movswq %ax, %rax");
            }
            "toUint16" => {
                self.gen_single(args);
                self.emit("movzwq %ax, %rax");
            }
            "toInt32" => {
                self.gen_single(args);
                self.emit("movslq %eax, %rax");
            }
            "toUint32" => {
                self.gen_single(args);
                // Writing the 32-bit register clears the upper half.
                self.emit("movl %eax, %eax");
            }
            "toInt64" | "toUint64" => {
                self.gen_single(args);
            }
            "toBool" => {
                self.gen_single(args);
                self.emit("testq %rax, %rax");
                self.emit("setne %al");
                self.emit("movzbq %al, %rax");
            }
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::CodeGen;
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
    fn test_signed_narrowing_sign_extends() {
        let asm = gen("use \"num\";\nint a = toInt8(300);\nint b = toInt16(a);\nint c = toInt32(b);");
        assert!(asm.contains("movsbq %al, %rax"));
        assert!(asm.contains("movswq %ax, %rax"));
        assert!(asm.contains("movslq %eax, %rax"));
    }

    #[test]
    fn test_unsigned_narrowing_masks() {
        let asm = gen("use \"num\";\nint a = toUint8(300);\nint b = toUint16(a);\nint c = toUint32(b);");
        assert!(asm.contains("movzbq %al, %rax"));
        assert!(asm.contains("movzwq %ax, %rax"));
        assert!(asm.contains("movl %eax, %eax"));
    }

    #[test]
    fn test_to_bool_collapses() {
        let asm = gen("use \"num\";\nbool b = toBool(7);");
        assert!(asm.contains("setne %al"));
        assert!(asm.contains("movzbq %al, %rax"));
    }
}
