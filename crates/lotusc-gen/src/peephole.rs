//! Peephole optimization over emitted assembly text.
//!
//! Regex-driven rewrites applied line by line until a fixed point:
//!
//! - remove `movq %r, %r` self-moves;
//! - remove the reload of a `movq %r, mem; movq mem, %r` pair;
//! - remove adjacent `pushq %r; popq %r` of the same register;
//! - rewrite `movq $0, %r` into `xorq %r, %r`;
//! - rewrite `addq $1, X` / `subq $1, X` into `incq X` / `decq X` for
//!   register and memory operands.
//!
//! Indentation is preserved exactly. Every pass either deletes a line
//! or shrinks one, so the fixed point terminates.

use regex::Regex;

/// The compiled rewrite rules.
pub struct Peephole {
    self_move: Regex,
    store: Regex,
    load: Regex,
    push: Regex,
    pop: Regex,
    mov_zero: Regex,
    add_one: Regex,
    sub_one: Regex,
}

impl Peephole {
    pub fn new() -> Self {
        let mem = r"(-?\d*\(%\w+(?:,%\w+(?:,\d+)?)?\))";
        Self {
            self_move: Regex::new(r"^(\s*)movq (%\w+), (%\w+)\s*$").unwrap(),
            store: Regex::new(&format!(r"^(\s*)movq (%\w+), {}\s*$", mem)).unwrap(),
            load: Regex::new(&format!(r"^(\s*)movq {}, (%\w+)\s*$", mem)).unwrap(),
            push: Regex::new(r"^(\s*)pushq (%\w+)\s*$").unwrap(),
            pop: Regex::new(r"^(\s*)popq (%\w+)\s*$").unwrap(),
            mov_zero: Regex::new(r"^(\s*)movq \$0, (%\w+)\s*$").unwrap(),
            add_one: Regex::new(r"^(\s*)addq \$1, (\S.*?)\s*$").unwrap(),
            sub_one: Regex::new(r"^(\s*)subq \$1, (\S.*?)\s*$").unwrap(),
        }
    }

    /// Run all rules to a fixed point.
    pub fn run(&self, asm: &str) -> String {
        let mut current = asm.to_string();
        loop {
            let next = self.pass(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// One pass over the lines.
    fn pass(&self, asm: &str) -> String {
        let lines: Vec<&str> = asm.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            // movq %r, %r
            if let Some(caps) = self.self_move.captures(line) {
                if caps[2] == caps[3] {
                    i += 1;
                    continue;
                }
            }

            // movq %r, mem; movq mem, %r  -> keep only the store
            if let (Some(store), Some(next)) = (
                self.store_parts(line),
                lines.get(i + 1).and_then(|l| self.load.captures(l)),
            ) {
                if store.0 == &next[2] && store.1 == &next[3] {
                    out.push(line.to_string());
                    i += 2;
                    continue;
                }
            }

            // pushq %r; popq %r (same register)
            if let (Some(push), Some(pop)) = (
                self.push.captures(line),
                lines.get(i + 1).and_then(|l| self.pop.captures(l)),
            ) {
                if push[2] == pop[2] {
                    i += 2;
                    continue;
                }
            }

            // movq $0, %r -> xorq %r, %r
            if let Some(caps) = self.mov_zero.captures(line) {
                out.push(format!("{}xorq {}, {}", &caps[1], &caps[2], &caps[2]));
                i += 1;
                continue;
            }

            // addq $1 / subq $1 -> incq / decq
            if let Some(caps) = self.add_one.captures(line) {
                out.push(format!("{}incq {}", &caps[1], &caps[2]));
                i += 1;
                continue;
            }
            if let Some(caps) = self.sub_one.captures(line) {
                out.push(format!("{}decq {}", &caps[1], &caps[2]));
                i += 1;
                continue;
            }

            out.push(line.to_string());
            i += 1;
        }

        let mut text = out.join("\n");
        if asm.ends_with('\n') {
            text.push('\n');
        }
        text
    }

    /// Capture `(mem, reg)` from a store line.
    fn store_parts<'t>(&self, line: &'t str) -> Option<(&'t str, &'t str)> {
        let caps = self.store.captures(line)?;
        Some((
            caps.get(3).map(|m| m.as_str())?,
            caps.get(2).map(|m| m.as_str())?,
        ))
    }
}

impl Default for Peephole {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience entry point: run the standard rule set.
pub fn optimize(asm: &str) -> String {
    Peephole::new().run(asm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_move_removed() {
        let asm = "    movq %rax, %rax\n    movq %rax, %rcx\n";
        let out = optimize(asm);
        assert!(!out.contains("movq %rax, %rax"));
        assert!(out.contains("movq %rax, %rcx"));
    }

    #[test]
    fn test_store_reload_pair_drops_reload() {
        let asm = "    movq %rax, -8(%rbp)\n    movq -8(%rbp), %rax\n";
        let out = optimize(asm);
        assert_eq!(out, "    movq %rax, -8(%rbp)\n");
    }

    #[test]
    fn test_store_reload_different_register_kept() {
        let asm = "    movq %rax, -8(%rbp)\n    movq -8(%rbp), %rcx\n";
        let out = optimize(asm);
        assert!(out.contains("movq -8(%rbp), %rcx"));
    }

    #[test]
    fn test_push_pop_pair_removed() {
        let asm = "    pushq %rbx\n    popq %rbx\n    pushq %rax\n    popq %rcx\n";
        let out = optimize(asm);
        assert!(!out.contains("%rbx"));
        assert!(out.contains("pushq %rax"));
        assert!(out.contains("popq %rcx"));
    }

    #[test]
    fn test_mov_zero_becomes_xor() {
        let asm = "    movq $0, %rax\n";
        assert_eq!(optimize(asm), "    xorq %rax, %rax\n");
    }

    #[test]
    fn test_inc_dec_rewrites_register_and_memory() {
        let asm = "    addq $1, %rax\n    subq $1, %rcx\n    addq $1, -16(%rbp)\n    subq $1, 0(%rdi)\n";
        let out = optimize(asm);
        assert_eq!(
            out,
            "    incq %rax\n    decq %rcx\n    incq -16(%rbp)\n    decq 0(%rdi)\n"
        );
    }

    #[test]
    fn test_spec_shrinkage_scenario() {
        let asm = "    movq $0, %rax\n    movq %rax, %rax\n    pushq %rbx\n    popq %rbx\n";
        assert_eq!(optimize(asm), "    xorq %rax, %rax\n");
    }

    #[test]
    fn test_idempotence() {
        let asm = "\
_start:
    movq %rsp, %rbp
    movq $0, %rax
    movq %rax, -8(%rbp)
    movq -8(%rbp), %rax
    pushq %rax
    popq %rax
    addq $1, %rax
    movq $60, %rax
    syscall
";
        let once = optimize(asm);
        let twice = optimize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_indentation_preserved() {
        let asm = "        movq $0, %r8\n";
        assert_eq!(optimize(asm), "        xorq %r8, %r8\n");
    }

    #[test]
    fn test_labels_and_comments_untouched() {
        let asm = ".while_0:\n    # a comment\n    jmp .while_0\n";
        assert_eq!(optimize(asm), asm);
    }

    #[test]
    fn test_larger_immediates_untouched() {
        let asm = "    addq $2, %rax\n    movq $1, %rax\n";
        assert_eq!(optimize(asm), asm);
    }
}
