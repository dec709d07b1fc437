//! `net` module lowering: Linux socket syscalls.
//!
//! `socket` is syscall 41 and `connect_ipv4` syscall 42 over a
//! stack-constructed `sockaddr_in` (AF_INET, port and address
//! byte-swapped to network order with `ror`/`bswap`). `send`/`recv`
//! alias `write(2)`/`read(2)`; `close` is syscall 3.

use crate::codegen::CodeGen;
use lotusc_par::Expr;

impl<'a> CodeGen<'a> {
    pub(crate) fn lower_net(&mut self, func: &str, args: &[Expr]) -> bool {
        match func {
            "socket" => {
                self.gen_syscall3(args);
                self.emit("movq $41, %rax");
                self.emit("syscall");
            }
            "connect_ipv4" => self.lower_connect_ipv4(args),
            "send" => {
                self.gen_syscall3(args);
                self.emit("movq $1, %rax");
                self.emit("syscall");
            }
            "recv" => {
                self.gen_syscall3(args);
                self.emit("movq $0, %rax");
                self.emit("syscall");
            }
            "close" => {
                self.gen_single(args);
                self.emit("movq %rax, %rdi");
                self.emit("movq $3, %rax");
                self.emit("syscall");
            }
            _ => return false,
        }
        true
    }

    /// Evaluate three arguments into `%rdi`/`%rsi`/`%rdx`.
    fn gen_syscall3(&mut self, args: &[Expr]) {
        if args.len() < 3 {
            self.unknown("expected three arguments");
            self.emit("movq $0, %rdi");
            self.emit("movq $0, %rsi");
            self.emit("movq $0, %rdx");
            return;
        }
        for arg in args[..3].iter().rev() {
            self.gen_expr(arg);
            self.emit("pushq %rax");
        }
        self.emit("popq %rdi");
        self.emit("popq %rsi");
        self.emit("popq %rdx");
    }

    /// `connect_ipv4(fd, ip_host_order, port_host_order)`: build the
    /// 16-byte `sockaddr_in` on the stack and connect.
    fn lower_connect_ipv4(&mut self, args: &[Expr]) {
        if args.len() < 3 {
            self.unknown("connect_ipv4 requires (fd, ip, port)");
            return;
        }
        self.gen_expr(&args[0]);
        self.emit("pushq %rax");
        self.gen_expr(&args[1]);
        self.emit("pushq %rax");
        self.gen_expr(&args[2]);

        self.emit("subq $16, %rsp");
        // sin_family = AF_INET
        self.emit("movw $2, (%rsp)");
        // sin_port, byte-swapped to network order
        self.emit("rorw $8, %ax");
        self.emit("movw %ax, 2(%rsp)");
        // sin_addr, byte-swapped to network order
        self.emit("movq 16(%rsp), %rax");
        self.emit("bswapl %eax");
        self.emit("movl %eax, 4(%rsp)");
        self.emit("movl $0, 8(%rsp)");
        self.emit("movl $0, 12(%rsp)");

        self.emit("movq %rsp, %rsi");
        self.emit("movq 24(%rsp), %rdi");
        self.emit("movq $16, %rdx");
        self.emit("movq $42, %rax");
        self.emit("syscall");
        self.emit("addq $32, %rsp");
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
    fn test_socket_syscall_number() {
        let asm = gen("use \"net\";\nint fd = socket(2, 1, 0);");
        assert!(asm.contains("movq $41, %rax"));
    }

    #[test]
    fn test_connect_builds_sockaddr_in() {
        let asm = gen("use \"net\";\nint fd = socket(2, 1, 0);\nconnect_ipv4(fd, 2130706433, 8080);");
        assert!(asm.contains("movw $2, (%rsp)"));
        assert!(asm.contains("rorw $8, %ax"));
        assert!(asm.contains("bswapl %eax"));
        assert!(asm.contains("movq $42, %rax"));
        assert!(asm.contains("movq $16, %rdx"));
    }

    #[test]
    fn test_send_recv_alias_write_read() {
        let asm = gen(
            "use \"net\";\nuse \"mem\";\nint fd = socket(2, 1, 0);\nint buf = mem::mmap(256);\nsend(fd, buf, 10);\nint n = recv(fd, buf, 256);",
        );
        assert!(asm.contains("movq $1, %rax"));
        assert!(asm.contains("movq $0, %rax"));
    }

    #[test]
    fn test_close_syscall() {
        let asm = gen("use \"net\";\nint fd = socket(2, 1, 0);\nclose(fd);");
        assert!(asm.contains("movq $3, %rax"));
    }
}
