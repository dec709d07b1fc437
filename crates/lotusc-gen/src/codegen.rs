//! AST to x86-64 assembly lowering.
//!
//! Straightforward stack-machine codegen: every expression leaves its
//! result in `%rax`; binary operators evaluate the left side, push it,
//! evaluate the right side into `%rcx` and pop the left back. Calls
//! follow the System V AMD64 convention. Unknown constructs become
//! assembly comments, never aborts.
//!
//! The generated document is `.data` first (string literals, constants,
//! scratch buffers), then `.text` with the global `_start` entry, the
//! top-level code, the user functions and class methods, and finally
//! the lazily emitted runtime helpers.

use lotusc_par::{
    BinOp, CmpOp, Expr, FunctionDef, LogicalOp, SizeofArg, Stmt, TryStmt, Type, UnOp,
};
use lotusc_util::{Diagnostic, DiagnosticCode, Handler};
use rustc_hash::FxHashSet;
use std::fmt::Write as _;

use crate::context::CompilationContext;
use crate::frame::Frame;

/// Integer/pointer argument registers, in order.
pub(crate) const ARG_REGS: [&str; 6] = ["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"];

/// The assembly generator for one compilation unit.
pub struct CodeGen<'a> {
    pub(crate) ctx: CompilationContext,
    pub(crate) handler: &'a Handler,

    /// `.data` section body.
    pub(crate) data: String,
    /// `.text` section body: entry, top-level code, then functions.
    pub(crate) text: String,
    /// Lazily emitted runtime helper routines, appended after the
    /// functions.
    pub(crate) helpers: String,
    emitted_helpers: FxHashSet<&'static str>,

    pub(crate) frame: Frame,
    /// Epilogue label of the function currently being generated.
    epilogue: Option<String>,
    /// Class whose method body is being generated, for field
    /// resolution through `this`.
    current_class: Option<String>,
    in_function: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(handler: &'a Handler) -> Self {
        Self {
            ctx: CompilationContext::new(),
            handler,
            data: String::new(),
            text: String::new(),
            helpers: String::new(),
            emitted_helpers: FxHashSet::default(),
            frame: Frame::new(),
            epilogue: None,
            current_class: None,
            in_function: false,
        }
    }

    /// Generate the complete assembly document for a program.
    pub fn generate(mut self, ast: &[Stmt]) -> String {
        // Pass 1: registries, so forward references resolve.
        for stmt in ast {
            match stmt {
                Stmt::Import(import) => self.ctx.imports.register(import),
                Stmt::FunctionDef(def) => {
                    self.ctx.functions.insert(def.name.clone(), def.clone());
                }
                Stmt::StructDef(def) => {
                    self.ctx.structs.insert(def.name.clone(), def.clone());
                }
                Stmt::EnumDef(def) => {
                    self.ctx.enums.insert(def.name.clone(), def.clone());
                }
                Stmt::ClassDef(def) => {
                    self.ctx.classes.insert(def.name.clone(), def.clone());
                }
                _ => {}
            }
        }

        // Pass 2: entry code from the top-level statements.
        self.emit_label("_start");
        self.emit("movq %rsp, %rbp");
        for stmt in ast {
            match stmt {
                Stmt::Import(_)
                | Stmt::FunctionDef(_)
                | Stmt::StructDef(_)
                | Stmt::EnumDef(_)
                | Stmt::ClassDef(_) => {}
                other => self.gen_stmt(other),
            }
        }

        // Exit: through main when defined, else status 0.
        if self.ctx.functions.contains_key("main") {
            self.emit("call .main");
            self.emit("movq %rax, %rdi");
        } else {
            self.emit("movq $0, %rdi");
        }
        self.emit("movq $60, %rax");
        self.emit("syscall");

        // Pass 3: function bodies, then class methods.
        let functions: Vec<FunctionDef> = self.ctx.functions.values().cloned().collect();
        for def in &functions {
            self.gen_function(def, None);
        }
        let classes: Vec<_> = self.ctx.classes.values().cloned().collect();
        for class in &classes {
            for method in &class.methods {
                self.gen_function(method, Some(&class.name));
            }
        }

        let mut doc = String::new();
        doc.push_str(".data\n");
        doc.push_str(&self.data);
        doc.push_str("\n.text\n.global _start\n");
        doc.push_str(&self.text);
        doc.push_str(&self.helpers);
        doc
    }

    // =========================================================================
    // Emission primitives
    // =========================================================================

    pub(crate) fn emit(&mut self, line: &str) {
        let _ = writeln!(self.text, "    {}", line);
    }

    pub(crate) fn emit_label(&mut self, label: &str) {
        let _ = writeln!(self.text, "{}:", label);
    }

    pub(crate) fn emit_comment(&mut self, text: &str) {
        let _ = writeln!(self.text, "    # {}", text);
    }

    /// Lazily append a runtime helper routine. The closure builds the
    /// helper's text exactly once per document.
    pub(crate) fn require_helper(&mut self, name: &'static str, build: fn(&mut Self) -> String) {
        if self.emitted_helpers.insert(name) {
            let body = build(self);
            self.helpers.push_str(&body);
        }
    }

    /// Intern a string literal in `.data`, returning its label and
    /// byte length.
    pub(crate) fn intern_string(&mut self, value: &str) -> (String, usize) {
        let label = self.ctx.fresh_str_label();
        let _ = writeln!(self.data, "{}:", label);
        let _ = writeln!(self.data, "    .asciz \"{}\"", escape_asm(value));
        (label, value.len())
    }

    /// Intern the shared newline byte.
    pub(crate) fn newline_label(&mut self) -> String {
        let label = self.ctx.fresh_newline_label();
        let _ = writeln!(self.data, "{}:", label);
        let _ = writeln!(self.data, "    .asciz \"\\n\"");
        label
    }

    /// Append raw lines to the `.data` section (lookup tables).
    pub(crate) fn append_data(&mut self, text: &str) {
        self.data.push_str(text);
    }

    /// Reserve an integer-format scratch buffer in `.data`.
    pub(crate) fn emit_intbuf(&mut self) -> String {
        let label = self.ctx.fresh_intbuf_label();
        let _ = writeln!(self.data, "{}:", label);
        let _ = writeln!(self.data, "    .space 32");
        label
    }

    /// Reserve a one-character scratch buffer in `.data`.
    pub(crate) fn emit_charbuf(&mut self) -> String {
        let label = self.ctx.fresh_charbuf_label();
        let _ = writeln!(self.data, "{}:", label);
        let _ = writeln!(self.data, "    .space 8");
        label
    }

    /// Report a non-fatal codegen problem: an assembly comment plus a
    /// stderr note.
    pub(crate) fn unknown(&mut self, what: &str) {
        log::warn!("codegen: {}", what);
        self.emit_comment(&format!("ERROR: {}", what));
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Function label: `.name` for free functions,
    /// `_class_Class_method` for methods.
    fn function_label(name: &str, class: Option<&str>) -> String {
        match class {
            Some(class_name) => format!("_class_{}_{}", class_name, name),
            None => format!(".{}", name),
        }
    }

    fn gen_function(&mut self, def: &FunctionDef, class: Option<&str>) {
        // Sibling functions see independent frames; constants carry
        // over because they live in the data section.
        let outer_frame = std::mem::replace(&mut self.frame, Frame::new());
        self.frame.adopt_constants(&outer_frame);
        let outer_epilogue = self.epilogue.take();
        let outer_class = self.current_class.take();
        let was_in_function = self.in_function;

        let label = Self::function_label(&def.name, class);
        let epilogue = self.ctx.fresh_label("epilogue");
        self.epilogue = Some(epilogue.clone());
        self.current_class = class.map(str::to_string);
        self.in_function = true;

        self.emit_label(&label);
        self.emit("pushq %rbp");
        self.emit("movq %rsp, %rbp");

        // `this` occupies the first slot of a method frame.
        let mut reg_index = 0;
        if class.is_some() {
            let offset = self.frame.alloc("this", Type::Ptr(Box::new(Type::Void)));
            self.emit("subq $8, %rsp");
            self.emit(&format!("movq {}, -{}(%rbp)", ARG_REGS[0], offset));
            reg_index = 1;
        }

        for (i, param) in def.params.iter().enumerate() {
            let offset = self.frame.alloc(&param.name, param.ty.clone());
            self.emit("subq $8, %rsp");
            let slot = i + reg_index;
            if slot < ARG_REGS.len() {
                self.emit(&format!("movq {}, -{}(%rbp)", ARG_REGS[slot], offset));
            } else {
                // Stack argument: above the saved %rbp and return
                // address.
                let arg_offset = 16 + 8 * (slot - ARG_REGS.len());
                self.emit(&format!("movq {}(%rbp), %rax", arg_offset));
                self.emit(&format!("movq %rax, -{}(%rbp)", offset));
            }
        }

        for stmt in &def.body {
            self.gen_stmt(stmt);
        }

        // Fallthrough return value.
        self.emit("movq $0, %rax");
        self.emit_label(&epilogue);
        self.emit("movq %rbp, %rsp");
        self.emit("popq %rbp");
        self.emit("ret");

        self.frame = outer_frame;
        self.epilogue = outer_epilogue;
        self.current_class = outer_class;
        self.in_function = was_in_function;
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub(crate) fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VariableDecl {
                name, ty, value, ..
            } => self.gen_variable_decl(name, ty, value.as_ref()),
            Stmt::ConstantDecl {
                name, ty, value, ..
            } => self.gen_constant_decl(name, ty, value),
            Stmt::ArrayDecl {
                name,
                elem_type,
                size,
                initial,
                ..
            } => self.gen_array_decl(name, elem_type, *size, initial),
            Stmt::Return { value, .. } => self.gen_return(value.as_ref()),
            Stmt::Assign { target, value, .. } => {
                self.gen_expr(value);
                self.track_assigned_string(target, value);
                self.store_to(target);
            }
            Stmt::CompoundAssign {
                target, op, value, ..
            } => {
                self.gen_expr(value);
                self.emit("pushq %rax");
                self.gen_expr(target);
                self.emit("popq %rcx");
                self.apply_binop(*op);
                self.store_to(target);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                let end = self.ctx.fresh_label("if_end");
                let else_label = if else_body.is_empty() {
                    end.clone()
                } else {
                    self.ctx.fresh_label("if_else")
                };

                self.gen_expr(cond);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", else_label));
                for stmt in then_body {
                    self.gen_stmt(stmt);
                }
                if !else_body.is_empty() {
                    self.emit(&format!("jmp {}", end));
                    self.emit_label(&else_label);
                    for stmt in else_body {
                        self.gen_stmt(stmt);
                    }
                }
                self.emit_label(&end);
            }
            Stmt::While { cond, body, .. } => {
                let top = self.ctx.fresh_label("while");
                let end = self.ctx.fresh_label("while_end");

                self.emit_label(&top);
                self.gen_expr(cond);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", end));
                for stmt in body {
                    self.gen_stmt(stmt);
                }
                self.emit(&format!("jmp {}", top));
                self.emit_label(&end);
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.gen_stmt(init);
                }
                let top = self.ctx.fresh_label("for");
                let end = self.ctx.fresh_label("for_end");

                self.emit_label(&top);
                match cond {
                    Some(cond) => self.gen_expr(cond),
                    None => self.emit("movq $1, %rax"),
                }
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", end));
                for stmt in body {
                    self.gen_stmt(stmt);
                }
                if let Some(update) = update {
                    self.gen_stmt(update);
                }
                self.emit(&format!("jmp {}", top));
                self.emit_label(&end);
            }
            Stmt::Try(TryStmt { .. }) => {
                self.handler.emit(
                    Diagnostic::error(
                        "try/catch is not supported by the code generator",
                        stmt.span(),
                    )
                    .with_code(DiagnosticCode::E0402),
                );
                self.unknown("try/catch is not supported");
            }
            Stmt::Throw { .. } => {
                self.handler.emit(
                    Diagnostic::error("throw is not supported by the code generator", stmt.span())
                        .with_code(DiagnosticCode::E0402),
                );
                self.unknown("throw is not supported");
            }
            Stmt::Expr { expr, .. } => self.gen_expr(expr),
            Stmt::Import(_)
            | Stmt::FunctionDef(_)
            | Stmt::StructDef(_)
            | Stmt::EnumDef(_)
            | Stmt::ClassDef(_) => {
                // Handled by the registration pass; nested definitions
                // inside bodies are registered late but still work for
                // calls that follow them.
                if let Stmt::FunctionDef(def) = stmt {
                    self.ctx.functions.insert(def.name.clone(), def.clone());
                }
            }
        }
    }

    fn gen_variable_decl(&mut self, name: &str, ty: &Type, value: Option<&Expr>) {
        match value {
            Some(value) => {
                self.gen_expr(value);
                if let Some(len) = self.literal_string_length(value) {
                    self.frame.set_string_length(name, len);
                }
            }
            None => self.emit("movq $0, %rax"),
        }

        let offset = self.frame.alloc(name, ty.clone());
        self.emit("subq $8, %rsp");
        self.emit(&format!("movq %rax, -{}(%rbp)", offset));
    }

    fn gen_constant_decl(&mut self, name: &str, ty: &Type, value: &Expr) {
        let label = self.ctx.fresh_label("const");
        match value {
            Expr::IntLit { value, .. } => {
                let _ = writeln!(self.data, "{}:", label);
                let _ = writeln!(self.data, "    .quad {}", value);
            }
            Expr::FloatLit { value, .. } => {
                let _ = writeln!(self.data, "{}:", label);
                let _ = writeln!(self.data, "    .quad {}", value);
            }
            Expr::BoolLit { value, .. } => {
                let _ = writeln!(self.data, "{}:", label);
                let _ = writeln!(self.data, "    .quad {}", *value as i64);
            }
            Expr::StrLit { value, .. } => {
                let _ = writeln!(self.data, "{}:", label);
                let _ = writeln!(self.data, "    .asciz \"{}\"", escape_asm(value));
                self.frame.set_string_length(name, value.len());
            }
            other => {
                self.unknown(&format!(
                    "constant `{}` must be initialized with a literal, found {:?}",
                    name,
                    variant_name(other)
                ));
                return;
            }
        }
        self.frame.define_constant(name, ty.clone(), label);
    }

    fn gen_array_decl(
        &mut self,
        name: &str,
        elem_type: &Type,
        size: Option<usize>,
        initial: &[Expr],
    ) {
        let count = size.unwrap_or(initial.len()).max(initial.len());
        let stride = elem_type.size().max(1);
        let bytes = round_up8(count * stride);

        let block = self.frame.alloc_block(bytes as i64);
        self.emit(&format!("subq ${}, %rsp", bytes));

        let offset = self.frame.alloc(name, Type::Array(Box::new(elem_type.clone()), size));
        self.emit("subq $8, %rsp");
        self.emit(&format!("leaq -{}(%rbp), %rax", block));
        self.emit(&format!("movq %rax, -{}(%rbp)", offset));

        for (i, init) in initial.iter().enumerate() {
            self.gen_expr(init);
            self.emit(&format!("movq -{}(%rbp), %rcx", offset));
            self.sized_store(elem_type, &format!("{}(%rcx)", i * stride));
        }
    }

    fn gen_return(&mut self, value: Option<&Expr>) {
        match value {
            Some(value) => self.gen_expr(value),
            None => self.emit("movq $0, %rax"),
        }

        if self.in_function {
            let epilogue = self.epilogue.clone().expect("function has an epilogue");
            self.emit(&format!("jmp {}", epilogue));
        } else {
            // Top level: the return value is the process exit status.
            self.emit("movq %rax, %rdi");
            self.emit("movq $60, %rax");
            self.emit("syscall");
        }
    }

    /// Record compile-time string lengths across assignments.
    fn track_assigned_string(&mut self, target: &Expr, value: &Expr) {
        if let Expr::Ident { name, .. } = target {
            match self.literal_string_length(value) {
                Some(len) => self.frame.set_string_length(name, len),
                None => self.frame.clear_string_length(name),
            }
        }
    }

    pub(crate) fn literal_string_length(&self, value: &Expr) -> Option<usize> {
        match value {
            Expr::StrLit { value, .. } => Some(value.len()),
            Expr::Ident { name, .. } => self.frame.string_length(name),
            _ => None,
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    /// Lower an expression; the result ends up in `%rax`.
    pub(crate) fn gen_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::IntLit { value, .. } => self.emit(&format!("movq ${}, %rax", value)),
            Expr::FloatLit { value, .. } => self.emit(&format!("movq ${}, %rax", value)),
            Expr::BoolLit { value, .. } => {
                self.emit(&format!("movq ${}, %rax", *value as i64))
            }
            Expr::Null { .. } => self.emit("movq $0, %rax"),
            Expr::StrLit { value, .. } => {
                let (label, _) = self.intern_string(value);
                self.emit(&format!("leaq {}(%rip), %rax", label));
            }
            Expr::Ident { name, .. } => self.gen_ident(name),
            Expr::Binary { op, lhs, rhs, .. } => {
                self.gen_expr(lhs);
                self.emit("pushq %rax");
                self.gen_expr(rhs);
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.apply_binop(*op);
            }
            Expr::Unary { op, operand, .. } => {
                self.gen_expr(operand);
                match op {
                    UnOp::Neg => self.emit("negq %rax"),
                    UnOp::BitNot => self.emit("notq %rax"),
                    UnOp::Not => {
                        self.emit("testq %rax, %rax");
                        self.emit("sete %al");
                        self.emit("movzbq %al, %rax");
                    }
                }
            }
            Expr::Comparison { op, lhs, rhs, .. } => {
                self.gen_expr(lhs);
                self.emit("pushq %rax");
                self.gen_expr(rhs);
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.emit("cmpq %rcx, %rax");
                let set = match op {
                    CmpOp::Eq => "sete",
                    CmpOp::Ne => "setne",
                    CmpOp::Lt => "setl",
                    CmpOp::Le => "setle",
                    CmpOp::Gt => "setg",
                    CmpOp::Ge => "setge",
                };
                self.emit(&format!("{} %al", set));
                self.emit("movzbq %al, %rax");
            }
            Expr::Logical { op, lhs, rhs, .. } => self.gen_logical(*op, lhs, rhs),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                let else_label = self.ctx.fresh_label("ternary_else");
                let end = self.ctx.fresh_label("ternary_end");

                self.gen_expr(cond);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", else_label));
                self.gen_expr(then_expr);
                self.emit(&format!("jmp {}", end));
                self.emit_label(&else_label);
                self.gen_expr(else_expr);
                self.emit_label(&end);
            }
            Expr::Call { name, args, .. } => self.gen_call(name, args),
            Expr::ArrayLit { elems, .. } => {
                let bytes = round_up8(elems.len().max(1) * 8);
                let block = self.frame.alloc_block(bytes as i64);
                self.emit(&format!("subq ${}, %rsp", bytes));
                for (i, elem) in elems.iter().enumerate() {
                    self.gen_expr(elem);
                    self.emit(&format!("movq %rax, -{}(%rbp)", block as usize - i * 8));
                }
                self.emit(&format!("leaq -{}(%rbp), %rax", block));
            }
            Expr::Index { array, index, .. } => {
                let (stride, elem_ty) = self.index_stride(array);
                self.gen_expr(array);
                self.emit("pushq %rax");
                self.gen_expr(index);
                self.emit("popq %rcx");
                self.sized_load(&elem_ty, &format!("(%rcx,%rax,{})", stride));
            }
            Expr::StructLit { name, fields, .. } | Expr::ClassLit { name, fields, .. } => {
                self.gen_composite_lit(name, fields)
            }
            Expr::MethodCall {
                object,
                method,
                args,
                ..
            } => self.gen_method_call(object, method, args),
            Expr::FieldAccess {
                object,
                field,
                ..
            } => {
                // `.` and `->` both traverse a pointer to the packed
                // field block.
                if let Some((offset, ty)) = self.field_of(object, field) {
                    self.gen_expr(object);
                    let addr = format!("{}(%rax)", offset);
                    self.sized_load(&ty, &addr);
                } else {
                    self.unknown(&format!("unknown field `{}`", field));
                    self.emit("movq $0, %rax");
                }
            }
            Expr::EnumLit {
                enum_name, variant, ..
            } => match self
                .ctx
                .enums
                .get(enum_name)
                .and_then(|def| def.value_of(variant))
            {
                Some(value) => self.emit(&format!("movq ${}, %rax", value)),
                None => {
                    self.unknown(&format!("unknown enum value `{}::{}`", enum_name, variant));
                    self.emit("movq $0, %rax");
                }
            },
            Expr::Ref { operand, .. } => match operand.as_ref() {
                Expr::Ident { name, .. } => {
                    if let Some(var) = self.frame.variable(name) {
                        let offset = var.offset;
                        self.emit(&format!("leaq -{}(%rbp), %rax", offset));
                    } else {
                        self.unknown(&format!("cannot take the address of `{}`", name));
                        self.emit("movq $0, %rax");
                    }
                }
                _ => {
                    self.unknown("can only take the address of a variable");
                    self.emit("movq $0, %rax");
                }
            },
            Expr::Deref { operand, .. } => {
                self.gen_expr(operand);
                self.emit("movq (%rax), %rax");
            }
            Expr::Malloc { size, .. } => {
                self.gen_expr(size);
                self.emit("movq %rax, %rdi");
                self.plt_call("malloc@PLT");
            }
            Expr::Free { ptr, .. } => {
                self.gen_expr(ptr);
                self.emit("movq %rax, %rdi");
                self.plt_call("free@PLT");
            }
            Expr::Sizeof { arg, .. } => {
                let size = match arg.as_ref() {
                    SizeofArg::Type(ty) => ty.size(),
                    SizeofArg::Expr(Expr::Ident { name, .. }) => self
                        .frame
                        .variable(name)
                        .map(|v| v.ty.size())
                        .or_else(|| self.ctx.structs.get(name).map(|s| s.size()))
                        .or_else(|| self.ctx.classes.get(name).map(|c| c.size()))
                        .unwrap_or(8),
                    SizeofArg::Expr(_) => 8,
                };
                self.emit(&format!("movq ${}, %rax", size));
            }
        }
    }

    fn gen_ident(&mut self, name: &str) {
        if let Some(var) = self.frame.variable(name) {
            let offset = var.offset;
            self.emit(&format!("movq -{}(%rbp), %rax", offset));
            return;
        }
        if let Some(constant) = self.frame.constant(name) {
            let label = constant.label.clone();
            if constant.ty.is_string() {
                self.emit(&format!("leaq {}(%rip), %rax", label));
            } else {
                self.emit(&format!("movq {}(%rip), %rax", label));
            }
            return;
        }
        // Inside a method body, bare names may be fields of `this`.
        if let Some((offset, ty)) = self.current_class_field(name) {
            self.emit("movq -8(%rbp), %rax");
            self.sized_load(&ty, &format!("{}(%rax)", offset));
            return;
        }

        self.unknown(&format!("unknown identifier `{}`", name));
        self.emit("movq $0, %rax");
    }

    fn gen_logical(&mut self, op: LogicalOp, lhs: &Expr, rhs: &Expr) {
        match op {
            LogicalOp::And => {
                let short = self.ctx.fresh_label("and_false");
                let end = self.ctx.fresh_label("and_end");

                self.gen_expr(lhs);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", short));
                self.gen_expr(rhs);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jz {}", short));
                self.emit("movq $1, %rax");
                self.emit(&format!("jmp {}", end));
                self.emit_label(&short);
                self.emit("movq $0, %rax");
                self.emit_label(&end);
            }
            LogicalOp::Or => {
                let short = self.ctx.fresh_label("or_true");
                let end = self.ctx.fresh_label("or_end");

                self.gen_expr(lhs);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jnz {}", short));
                self.gen_expr(rhs);
                self.emit("testq %rax, %rax");
                self.emit(&format!("jnz {}", short));
                self.emit("movq $0, %rax");
                self.emit(&format!("jmp {}", end));
                self.emit_label(&short);
                self.emit("movq $1, %rax");
                self.emit_label(&end);
            }
        }
    }

    /// Left operand in `%rax`, right in `%rcx`; result in `%rax`.
    pub(crate) fn apply_binop(&mut self, op: BinOp) {
        match op {
            BinOp::Add => self.emit("addq %rcx, %rax"),
            BinOp::Sub => self.emit("subq %rcx, %rax"),
            BinOp::Mul => self.emit("imulq %rcx, %rax"),
            BinOp::Div => {
                self.emit("cqto");
                self.emit("idivq %rcx");
            }
            BinOp::Mod => {
                self.emit("cqto");
                self.emit("idivq %rcx");
                self.emit("movq %rdx, %rax");
            }
            BinOp::BitAnd => self.emit("andq %rcx, %rax"),
            BinOp::BitOr => self.emit("orq %rcx, %rax"),
            BinOp::BitXor => self.emit("xorq %rcx, %rax"),
            BinOp::Shl => self.emit("salq %cl, %rax"),
            BinOp::Shr => self.emit("sarq %cl, %rax"),
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    fn gen_call(&mut self, name: &str, args: &[Expr]) {
        // Qualified: `module::function`, with alias resolution.
        if let Some((module, func)) = name.split_once("::") {
            let module = self.ctx.imports.resolve_module(module).to_string();
            if crate::stdlib::module_has(&module, func) {
                self.lower_stdlib(&module, func, args);
            } else {
                self.unknown(&format!("unknown function `{}`", name));
            }
            return;
        }

        // User-defined functions win over everything.
        if self.ctx.functions.contains_key(name) {
            self.gen_user_call(&Self::function_label(name, None), args);
            return;
        }

        // Imported stdlib names.
        if let Some((module, func)) = self.ctx.imports.resolve_bare(name) {
            self.lower_stdlib(&module, &func, args);
            return;
        }

        // Registered print functions resolve without an import.
        if crate::stdlib::is_print_function(name) {
            self.lower_stdlib("io", name, args);
            return;
        }

        self.unknown(&format!("unknown function `{}`", name));
    }

    /// Marshal arguments per the System V convention and call `label`.
    /// Arguments are evaluated right to left so stacked extras land in
    /// ascending order.
    pub(crate) fn gen_user_call(&mut self, label: &str, args: &[Expr]) {
        for arg in args.iter().rev() {
            self.gen_expr(arg);
            self.emit("pushq %rax");
        }
        for reg in ARG_REGS.iter().take(args.len()) {
            self.emit(&format!("popq {}", reg));
        }

        self.emit(&format!("call {}", label));

        if args.len() > ARG_REGS.len() {
            self.emit(&format!("addq ${}, %rsp", 8 * (args.len() - ARG_REGS.len())));
        }
    }

    fn gen_method_call(&mut self, object: &Expr, method: &str, args: &[Expr]) {
        let class_name = match self.class_of(object) {
            Some(name) => name,
            None => {
                self.unknown(&format!("cannot resolve method `{}`", method));
                self.emit("movq $0, %rax");
                return;
            }
        };
        if !self
            .ctx
            .classes
            .get(&class_name)
            .map(|c| c.methods.iter().any(|m| m.name == method))
            .unwrap_or(false)
        {
            self.unknown(&format!("unknown method `{}.{}`", class_name, method));
            self.emit("movq $0, %rax");
            return;
        }

        // `this` goes in %rdi, then the declared arguments.
        self.gen_expr(object);
        self.emit("pushq %rax");
        let label = Self::function_label(method, Some(&class_name));
        self.gen_user_call_with_this(&label, args);
    }

    fn gen_user_call_with_this(&mut self, label: &str, args: &[Expr]) {
        // `this` is already pushed; evaluate arguments, then load
        // registers: args fill %rsi.. and `this` pops last into %rdi.
        for arg in args.iter().rev() {
            self.gen_expr(arg);
            self.emit("pushq %rax");
        }
        for i in 0..args.len().min(ARG_REGS.len() - 1) {
            self.emit(&format!("popq {}", ARG_REGS[i + 1]));
        }
        self.emit("popq %rdi");
        self.emit(&format!("call {}", label));
    }

    /// Stack-align and call a PLT symbol.
    pub(crate) fn plt_call(&mut self, symbol: &str) {
        self.emit("pushq %rbp");
        self.emit("movq %rsp, %rbp");
        self.emit("andq $-16, %rsp");
        self.emit(&format!("call {}", symbol));
        self.emit("movq %rbp, %rsp");
        self.emit("popq %rbp");
    }

    // =========================================================================
    // Composite values
    // =========================================================================

    /// `new Name{...}` for structs and classes: a packed stack block,
    /// base pointer in `%rax`.
    fn gen_composite_lit(&mut self, name: &str, fields: &[(String, Expr)]) {
        let layout: Vec<(String, usize, Type)> = if let Some(def) = self.ctx.structs.get(name) {
            def.fields
                .iter()
                .map(|f| (f.name.clone(), f.offset, f.ty.clone()))
                .collect()
        } else if let Some(def) = self.ctx.classes.get(name) {
            def.fields
                .iter()
                .map(|f| (f.name.clone(), f.offset, f.ty.clone()))
                .collect()
        } else {
            self.unknown(&format!("unknown struct or class `{}`", name));
            self.emit("movq $0, %rax");
            return;
        };

        let size: usize = layout.iter().map(|(_, _, ty)| ty.size()).sum();
        let bytes = round_up8(size.max(8));
        let block = self.frame.alloc_block(bytes as i64);
        self.emit(&format!("subq ${}, %rsp", bytes));

        for (field_name, value) in fields {
            match layout.iter().find(|(n, _, _)| n == field_name) {
                Some((_, offset, ty)) => {
                    self.gen_expr(value);
                    self.emit(&format!("leaq -{}(%rbp), %rcx", block));
                    self.sized_store(&ty.clone(), &format!("{}(%rcx)", offset));
                }
                None => self.unknown(&format!("unknown field `{}.{}`", name, field_name)),
            }
        }

        self.emit(&format!("leaq -{}(%rbp), %rax", block));
    }

    // =========================================================================
    // Stores and sized memory access
    // =========================================================================

    /// Store `%rax` into the location named by an assignable
    /// expression.
    pub(crate) fn store_to(&mut self, target: &Expr) {
        match target {
            Expr::Ident { name, .. } => {
                if let Some(var) = self.frame.variable(name) {
                    let offset = var.offset;
                    self.emit(&format!("movq %rax, -{}(%rbp)", offset));
                    return;
                }
                if self.frame.constant(name).is_some() {
                    self.unknown(&format!("cannot assign to constant `{}`", name));
                    return;
                }
                if let Some((offset, ty)) = self.current_class_field(name) {
                    self.emit("movq -8(%rbp), %rcx");
                    self.sized_store(&ty, &format!("{}(%rcx)", offset));
                    return;
                }
                self.unknown(&format!("assignment to unknown variable `{}`", name));
            }
            Expr::Index { array, index, .. } => {
                let (stride, elem_ty) = self.index_stride(array);
                self.emit("pushq %rax");
                self.gen_expr(array);
                self.emit("pushq %rax");
                self.gen_expr(index);
                self.emit("popq %rcx");
                self.emit(&format!("leaq (%rcx,%rax,{}), %rcx", stride));
                self.emit("popq %rax");
                self.sized_store(&elem_ty, "(%rcx)");
            }
            Expr::FieldAccess { object, field, .. } => {
                if let Some((offset, ty)) = self.field_of(object, field) {
                    self.emit("pushq %rax");
                    self.gen_expr(object);
                    self.emit("movq %rax, %rcx");
                    self.emit("popq %rax");
                    self.sized_store(&ty, &format!("{}(%rcx)", offset));
                } else {
                    self.unknown(&format!("unknown field `{}`", field));
                }
            }
            Expr::Deref { operand, .. } => {
                self.emit("pushq %rax");
                self.gen_expr(operand);
                self.emit("movq %rax, %rcx");
                self.emit("popq %rax");
                self.emit("movq %rax, (%rcx)");
            }
            other => {
                self.unknown(&format!(
                    "invalid assignment target {:?}",
                    variant_name(other)
                ));
            }
        }
    }

    /// Width-correct load from `addr` into `%rax` (sign- or
    /// zero-extending by type).
    pub(crate) fn sized_load(&mut self, ty: &Type, addr: &str) {
        match ty {
            Type::Int8 => self.emit(&format!("movsbq {}, %rax", addr)),
            Type::UInt8 | Type::Bool => self.emit(&format!("movzbq {}, %rax", addr)),
            Type::Int16 => self.emit(&format!("movswq {}, %rax", addr)),
            Type::UInt16 => self.emit(&format!("movzwq {}, %rax", addr)),
            Type::Int32 => self.emit(&format!("movslq {}, %rax", addr)),
            Type::UInt32 => self.emit(&format!("movl {}, %eax", addr)),
            _ => self.emit(&format!("movq {}, %rax", addr)),
        }
    }

    /// Width-correct store of `%rax` to `addr`.
    pub(crate) fn sized_store(&mut self, ty: &Type, addr: &str) {
        match ty.size() {
            1 => self.emit(&format!("movb %al, {}", addr)),
            2 => self.emit(&format!("movw %ax, {}", addr)),
            4 => self.emit(&format!("movl %eax, {}", addr)),
            _ => self.emit(&format!("movq %rax, {}", addr)),
        }
    }

    // =========================================================================
    // Type lookups
    // =========================================================================

    /// Element stride and type for indexing into `array`.
    fn index_stride(&self, array: &Expr) -> (usize, Type) {
        if let Expr::Ident { name, .. } = array {
            if let Some(var) = self.frame.variable(name) {
                if let Type::Array(elem, _) = &var.ty {
                    return (elem.size().max(1), (**elem).clone());
                }
            }
        }
        (8, Type::Int)
    }

    /// The class of an object expression, for method dispatch.
    fn class_of(&self, object: &Expr) -> Option<String> {
        let named = match object {
            Expr::Ident { name, .. } => match &self.frame.variable(name)?.ty {
                Type::Named(class) => class.clone(),
                Type::Ptr(inner) => match inner.as_ref() {
                    Type::Named(class) => class.clone(),
                    _ => return None,
                },
                _ => return None,
            },
            Expr::StructLit { name, .. } | Expr::ClassLit { name, .. } => name.clone(),
            _ => return None,
        };
        self.ctx.classes.contains_key(&named).then_some(named)
    }

    /// Offset and type of `object.field` through the registries.
    fn field_of(&self, object: &Expr, field: &str) -> Option<(usize, Type)> {
        let type_name = match object {
            Expr::Ident { name, .. } => match &self.frame.variable(name)?.ty {
                Type::Named(n) => n.clone(),
                Type::Ptr(inner) => match inner.as_ref() {
                    Type::Named(n) => n.clone(),
                    _ => return None,
                },
                _ => return None,
            },
            Expr::StructLit { name, .. } | Expr::ClassLit { name, .. } => name.clone(),
            Expr::FieldAccess {
                object: inner,
                field: inner_field,
                ..
            } => {
                // Nested access: resolve the inner field's type.
                let (_, ty) = self.field_of(inner, inner_field)?;
                match ty {
                    Type::Named(n) => n,
                    _ => return None,
                }
            }
            _ => return None,
        };

        if let Some(def) = self.ctx.structs.get(&type_name) {
            return def.field(field).map(|f| (f.offset, f.ty.clone()));
        }
        if let Some(def) = self.ctx.classes.get(&type_name) {
            return def.field(field).map(|f| (f.offset, f.ty.clone()));
        }
        None
    }

    /// Field of the class whose method is being generated.
    fn current_class_field(&self, name: &str) -> Option<(usize, Type)> {
        let class = self.current_class.as_ref()?;
        let def = self.ctx.classes.get(class)?;
        def.field(name).map(|f| (f.offset, f.ty.clone()))
    }
}

/// Escape a string for a `.asciz` directive.
pub(crate) fn escape_asm(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

pub(crate) fn round_up8(n: usize) -> usize {
    (n + 7) & !7
}

fn variant_name(expr: &Expr) -> &'static str {
    match expr {
        Expr::IntLit { .. } => "IntLit",
        Expr::FloatLit { .. } => "FloatLit",
        Expr::StrLit { .. } => "StrLit",
        Expr::BoolLit { .. } => "BoolLit",
        Expr::Ident { .. } => "Ident",
        Expr::Binary { .. } => "Binary",
        Expr::Unary { .. } => "Unary",
        Expr::Comparison { .. } => "Comparison",
        Expr::Logical { .. } => "Logical",
        Expr::Ternary { .. } => "Ternary",
        Expr::Call { .. } => "Call",
        Expr::ArrayLit { .. } => "ArrayLit",
        Expr::Index { .. } => "Index",
        Expr::StructLit { .. } => "StructLit",
        Expr::ClassLit { .. } => "ClassLit",
        Expr::MethodCall { .. } => "MethodCall",
        Expr::FieldAccess { .. } => "FieldAccess",
        Expr::EnumLit { .. } => "EnumLit",
        Expr::Ref { .. } => "Ref",
        Expr::Deref { .. } => "Deref",
        Expr::Malloc { .. } => "Malloc",
        Expr::Free { .. } => "Free",
        Expr::Sizeof { .. } => "Sizeof",
        Expr::Null { .. } => "Null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_lex::Lexer;
    use lotusc_par::Parser;

    fn gen(source: &str) -> String {
        let handler = Handler::new();
        let tokens = Lexer::new(source, &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        CodeGen::new(&handler).generate(&ast)
    }

    #[test]
    fn test_empty_source_emits_exit_zero() {
        let asm = gen("");
        assert!(asm.starts_with(".data\n"));
        assert!(asm.contains(".text\n.global _start\n_start:"));
        assert!(asm.contains("movq $0, %rdi"));
        assert!(asm.contains("movq $60, %rax"));
        assert!(asm.contains("syscall"));
    }

    #[test]
    fn test_top_level_return_is_exit_status() {
        let asm = gen("ret 14;");
        assert!(asm.contains("movq $14, %rax"));
        assert!(asm.contains("movq %rax, %rdi"));
        assert!(asm.contains("movq $60, %rax"));
    }

    #[test]
    fn test_main_is_called_from_entry() {
        let asm = gen("fn int main() { ret 0; }");
        assert!(asm.contains("call .main"));
        assert!(asm.contains(".main:"));
        assert!(asm.contains("movq %rax, %rdi"));
    }

    #[test]
    fn test_binary_op_shape() {
        let asm = gen("int x = 1; int y = 2; int z = x + y;");
        assert!(asm.contains("pushq %rax"));
        assert!(asm.contains("movq %rax, %rcx"));
        assert!(asm.contains("popq %rax"));
        assert!(asm.contains("addq %rcx, %rax"));
    }

    #[test]
    fn test_division_uses_cqto_idiv() {
        let asm = gen("int x = 7; int y = x / 2;");
        assert!(asm.contains("cqto"));
        assert!(asm.contains("idivq %rcx"));
    }

    #[test]
    fn test_comparison_sets_boolean() {
        let asm = gen("int x = 1; bool b = x < 2;");
        assert!(asm.contains("cmpq %rcx, %rax"));
        assert!(asm.contains("setl %al"));
        assert!(asm.contains("movzbq %al, %rax"));
    }

    #[test]
    fn test_string_literal_in_data_section() {
        let asm = gen("str s = \"hi\\n\";");
        assert!(asm.contains(".str0:"));
        assert!(asm.contains(".asciz \"hi\\n\""));
        assert!(asm.contains("leaq .str0(%rip), %rax"));
    }

    #[test]
    fn test_constant_uses_data_quad() {
        let asm = gen("const int MAX = 42;\nret MAX;");
        assert!(asm.contains(".quad 42"));
        assert!(asm.contains("(%rip), %rax"));
    }

    #[test]
    fn test_label_uniqueness() {
        let source = "fn int main() {\n    int x = 1;\n    if x > 0 { x = 2; } else { x = 3; }\n    while x > 0 { x -= 1; }\n    if x == 0 { x = 5; }\n    ret x;\n}";
        let asm = gen(source);

        let mut labels = std::collections::HashSet::new();
        for line in asm.lines() {
            if let Some(label) = line.strip_suffix(':') {
                if !line.starts_with(' ') {
                    assert!(labels.insert(label.to_string()), "duplicate label {}", label);
                }
            }
        }
    }

    #[test]
    fn test_if_else_branch_shape() {
        let asm = gen("int x = 1;\nif x > 0 { x = 2; } else { x = 3; }");
        assert!(asm.contains("testq %rax, %rax"));
        assert!(asm.contains("jz .if_else_"));
        assert!(asm.contains("jmp .if_end_"));
    }

    #[test]
    fn test_while_loop_shape() {
        let asm = gen("int i = 0;\nwhile i < 3 { i += 1; }");
        assert!(asm.contains(".while_"));
        assert!(asm.contains("jz .while_end_"));
        assert!(asm.contains("jmp .while_"));
    }

    #[test]
    fn test_function_prologue_epilogue() {
        let asm = gen("fn int add(int a, int b) { ret a + b; }");
        assert!(asm.contains(".add:"));
        assert!(asm.contains("pushq %rbp"));
        assert!(asm.contains("movq %rsp, %rbp"));
        assert!(asm.contains("movq %rdi, -8(%rbp)"));
        assert!(asm.contains("movq %rsi, -16(%rbp)"));
        assert!(asm.contains("jmp .epilogue_"));
        assert!(asm.contains("movq %rbp, %rsp"));
        assert!(asm.contains("popq %rbp"));
        assert!(asm.contains("    ret"));
    }

    #[test]
    fn test_enum_lowers_to_immediate() {
        let asm = gen("enum Color { Red, Green, Blue }\nint c = Color::Green;");
        assert!(asm.contains("movq $1, %rax"));
    }

    #[test]
    fn test_struct_field_store_and_load() {
        let source =
            "struct Point { int x; int y; }\nPoint p = new Point{x: 3, y: 4};\nint y = p.y;";
        let asm = gen(source);
        // y lives at packed offset 8
        assert!(asm.contains("movq %rax, 8(%rcx)"));
        assert!(asm.contains("movq 8(%rax), %rax"));
    }

    #[test]
    fn test_method_label_and_this() {
        let source = "class Counter { int value; fn void inc() { value += 1; } }\nCounter c = new Counter{value: 0};\nc.inc();";
        let asm = gen(source);
        assert!(asm.contains("_class_Counter_inc:"));
        assert!(asm.contains("call _class_Counter_inc"));
    }

    #[test]
    fn test_malloc_goes_through_plt() {
        let asm = gen("int p = malloc(64);\nfree(p);");
        assert!(asm.contains("call malloc@PLT"));
        assert!(asm.contains("call free@PLT"));
        assert!(asm.contains("andq $-16, %rsp"));
    }

    #[test]
    fn test_sizeof_resolves_types() {
        let asm = gen("int a = sizeof(int16);\nint8 b = 0;\nint c = sizeof(b);");
        assert!(asm.contains("movq $2, %rax"));
        assert!(asm.contains("movq $1, %rax"));
    }

    #[test]
    fn test_unknown_function_becomes_comment() {
        let asm = gen("nonexistent();");
        assert!(asm.contains("# ERROR: unknown function `nonexistent`"));
    }

    #[test]
    fn test_try_throw_rejected_with_diagnostic() {
        let handler = Handler::new();
        let tokens = Lexer::new("try { ret 1; } catch { ret 2; }", &handler).tokenize();
        let ast = Parser::new(tokens, &handler).parse().expect("parse");
        let _ = CodeGen::new(&handler).generate(&ast);
        assert!(handler.has_errors());
        assert_eq!(
            handler.diagnostics()[0].code,
            Some(DiagnosticCode::E0402)
        );
    }

    #[test]
    fn test_array_decl_packed_stride() {
        let asm = gen("int8[4] xs = [1, 2, 3, 4];\nint v = xs[2];");
        // int8 elements: 1-byte stores, scaled-by-1 indexed load
        assert!(asm.contains("movb %al, 2(%rcx)"));
        assert!(asm.contains("movsbq (%rcx,%rax,1), %rax"));
    }

    #[test]
    fn test_logical_and_short_circuits() {
        let asm = gen("int x = 1;\nbool b = x > 0 && x < 10;");
        assert!(asm.contains("jz .and_false_"));
        assert!(asm.contains(".and_end_"));
    }

    #[test]
    fn test_shift_uses_cl() {
        let asm = gen("int x = 1; int y = x << 3; int z = y >> 1;");
        assert!(asm.contains("salq %cl, %rax"));
        assert!(asm.contains("sarq %cl, %rax"));
    }

    #[test]
    fn test_deterministic_output() {
        let source = "use \"io\";\nfn int main() { println(\"x\"); ret 0; }";
        assert_eq!(gen(source), gen(source));
    }
}
