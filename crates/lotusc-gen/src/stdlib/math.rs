//! `math` module lowering: inline integer arithmetic templates.
//!
//! `floor`/`ceil`/`round` are the identity on the integer value model;
//! `sqrt` truncates a hardware `sqrtsd` and yields -1 for negative
//! inputs; `pow` is binary fast exponentiation with negative exponents
//! yielding 0; `gcd` is the Euclidean loop returning `a` once `b`
//! reaches 0.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_math(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "abs" => {
                self.gen_single(args);
                // sign-extend, xor, subtract
                self.emit("movq %rax, %rcx");
                self.emit("sarq $63, %rcx");
                self.emit("xorq %rcx, %rax");
                self.emit("subq %rcx, %rax");
            }
            "min" => {
                self.gen_pair(args);
                self.emit("cmpq %rcx, %rax");
                self.emit("cmovgq %rcx, %rax");
            }
            "max" => {
                self.gen_pair(args);
                self.emit("cmpq %rcx, %rax");
                self.emit("cmovlq %rcx, %rax");
            }
            "sqrt" => {
                let neg = self.ctx.fresh_label("sqrt_neg");
                let end = self.ctx.fresh_label("sqrt_end");
                self.gen_single(args);
                self.emit("testq %rax, %rax");
                self.emit(&format!("js {}", neg));
                self.emit("cvtsi2sdq %rax, %xmm0");
                self.emit("sqrtsd %xmm0, %xmm0");
                self.emit("cvttsd2siq %xmm0, %rax");
                self.emit(&format!("jmp {}", end));
                self.emit_label(&neg);
                self.emit("movq $-1, %rax");
                self.emit_label(&end);
            }
            "pow" => {
                let zero = self.ctx.fresh_label("pow_zero");
                let even = self.ctx.fresh_label("pow_even");
                let top = self.ctx.fresh_label("pow_loop");
                let end = self.ctx.fresh_label("pow_end");
                self.gen_pair(args);
                self.emit("testq %rcx, %rcx");
                self.emit(&format!("js {}", zero));
                self.emit("movq %rax, %rdx");
                self.emit("movq $1, %rax");
                self.emit_label(&top);
                self.emit("testq %rcx, %rcx");
                self.emit(&format!("jz {}", end));
                self.emit("testq $1, %rcx");
                self.emit(&format!("jz {}", even));
                self.emit("imulq %rdx, %rax");
                self.emit_label(&even);
                self.emit("imulq %rdx, %rdx");
                self.emit("shrq $1, %rcx");
                self.emit(&format!("jmp {}", top));
                self.emit_label(&zero);
                self.emit("movq $0, %rax");
                self.emit_label(&end);
            }
            "floor" | "ceil" | "round" => {
                // Identity on the fixed integer value model.
                self.gen_single(args);
            }
            "gcd" => {
                self.gen_pair(args);
                self.emit_gcd_loop();
            }
            "lcm" => {
                // a*b / gcd(a, b)
                if args.len() < 2 {
                    self.unknown("lcm requires two arguments");
                    return true;
                }
                self.gen_expr(&args[0]);
                self.emit("pushq %rax");
                self.gen_expr(&args[1]);
                self.emit("pushq %rax");
                self.emit("movq 8(%rsp), %rax");
                self.emit("movq (%rsp), %rcx");
                self.emit_gcd_loop();
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.emit("popq %rdx");
                self.emit("imulq %rdx, %rax");
                self.emit("cqto");
                self.emit("idivq %rcx");
            }
            _ => return false,
        }
        true
    }

    /// Euclidean loop over `%rax` (a) and `%rcx` (b); result in `%rax`.
    fn emit_gcd_loop(&mut self) {
        let top = self.ctx.fresh_label("gcd_loop");
        let end = self.ctx.fresh_label("gcd_end");
        self.emit_label(&top);
        self.emit("testq %rcx, %rcx");
        self.emit(&format!("jz {}", end));
        self.emit("cqto");
        self.emit("idivq %rcx");
        self.emit("movq %rcx, %rax");
        self.emit("movq %rdx, %rcx");
        self.emit(&format!("jmp {}", top));
        self.emit_label(&end);
    }

    /// Evaluate a single argument into `%rax`.
    pub(crate) fn gen_single(&mut self, args: &[Expr]) {
        match args.first() {
            Some(arg) => self.gen_expr(arg),
            None => self.emit("movq $0, %rax"),
        }
    }

    /// Evaluate two arguments into `%rax` and `%rcx`.
    pub(crate) fn gen_pair(&mut self, args: &[Expr]) {
        if args.len() < 2 {
            self.unknown("expected two arguments");
            self.emit("movq $0, %rax");
            self.emit("movq $0, %rcx");
            return;
        }
        self.gen_expr(&args[0]);
        self.emit("pushq %rax");
        self.gen_expr(&args[1]);
        self.emit("movq %rax, %rcx");
        self.emit("popq %rax");
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
    fn test_abs_is_branchless() {
        let asm = gen("use \"math\";\nint x = 0 - 5;\nint y = abs(x);");
        assert!(asm.contains("sarq $63, %rcx"));
        assert!(asm.contains("xorq %rcx, %rax"));
        assert!(asm.contains("subq %rcx, %rax"));
    }

    #[test]
    fn test_min_max_use_cmov() {
        let asm = gen("use \"math\";\nint a = min(1, 2);\nint b = max(1, 2);");
        assert!(asm.contains("cmovgq %rcx, %rax"));
        assert!(asm.contains("cmovlq %rcx, %rax"));
    }

    #[test]
    fn test_sqrt_hardware_with_negative_guard() {
        let asm = gen("use \"math\";\nint r = sqrt(16);");
        assert!(asm.contains("sqrtsd %xmm0, %xmm0"));
        assert!(asm.contains("cvttsd2siq %xmm0, %rax"));
        assert!(asm.contains("movq $-1, %rax"));
    }

    #[test]
    fn test_pow_fast_exponentiation() {
        let asm = gen("use \"math\";\nint r = pow(2, 10);");
        assert!(asm.contains("shrq $1, %rcx"));
        assert!(asm.contains("imulq %rdx, %rdx"));
    }

    #[test]
    fn test_gcd_euclidean_loop() {
        let asm = gen("use \"math\";\nint g = gcd(12, 18);");
        assert!(asm.contains(".gcd_loop_"));
        assert!(asm.contains("idivq %rcx"));
        assert!(asm.contains("movq %rdx, %rcx"));
    }

    #[test]
    fn test_lcm_divides_product_by_gcd() {
        let asm = gen("use \"math\";\nint l = lcm(4, 6);");
        assert!(asm.contains(".gcd_loop_"));
        assert!(asm.contains("imulq %rdx, %rax"));
    }

    #[test]
    fn test_floor_is_identity() {
        let asm = gen("use \"math\";\nint f = floor(3);");
        // No extra instructions beyond evaluating the argument.
        assert!(!asm.contains("roundsd"));
    }
}
