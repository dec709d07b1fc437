//! AST node definitions for the Lotus language.
//!
//! Two closed sum types carry the whole surface: [`Stmt`] for
//! declarations and statements, [`Expr`] for expressions. Every node
//! embeds the [`Span`] of the first token of its production.

use lotusc_util::Span;
use std::fmt;

/// A parsed source file: the ordered top-level statements.
pub type Ast = Vec<Stmt>;

/// A Lotus type.
///
/// All scalar values occupy one 8-byte stack slot at runtime; the
/// per-type size below is the packed element size used for struct
/// field offsets, array strides and `sizeof`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Type {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Bool,
    Str,
    Void,
    /// A struct, enum or class type by name.
    Named(String),
    /// Array of an element type, with a fixed size when declared.
    Array(Box<Type>, Option<usize>),
    /// Pointer to a value of the inner type.
    Ptr(Box<Type>),
}

impl Type {
    /// Packed element size in bytes.
    pub fn size(&self) -> usize {
        match self {
            Type::Int8 | Type::UInt8 | Type::Bool => 1,
            Type::Int16 | Type::UInt16 => 2,
            Type::Int32 | Type::UInt32 => 4,
            Type::Array(elem, Some(n)) => elem.size() * n,
            _ => 8,
        }
    }

    /// True for the string type (tracked in the length table).
    pub fn is_string(&self) -> bool {
        matches!(self, Type::Str)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Int8 => write!(f, "int8"),
            Type::Int16 => write!(f, "int16"),
            Type::Int32 => write!(f, "int32"),
            Type::Int64 => write!(f, "int64"),
            Type::UInt => write!(f, "uint"),
            Type::UInt8 => write!(f, "uint8"),
            Type::UInt16 => write!(f, "uint16"),
            Type::UInt32 => write!(f, "uint32"),
            Type::UInt64 => write!(f, "uint64"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "str"),
            Type::Void => write!(f, "void"),
            Type::Named(name) => write!(f, "{}", name),
            Type::Array(elem, Some(n)) => write!(f, "{}[{}]", elem, n),
            Type::Array(elem, None) => write!(f, "{}[]", elem),
            Type::Ptr(inner) => write!(f, "*{}", inner),
        }
    }
}

/// Arithmetic and bitwise binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
        };
        f.write_str(s)
    }
}

/// Prefix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

/// Comparison operators; the result is a 0/1 boolean.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// Short-circuiting logical operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Function parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

/// Struct or class field with its packed offset.
///
/// Offsets are the running sum of the element sizes of the preceding
/// fields in declaration order (packed, no padding).
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    pub offset: usize,
}

/// Function definition (also used for class methods).
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub span: Span,
}

impl StructDef {
    /// Total packed size of all fields.
    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One enum constant; unassigned values auto-increment from the
/// previous value, starting at 0.
#[derive(Clone, Debug, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<EnumValue>,
    pub span: Span,
}

impl EnumDef {
    pub fn value_of(&self, variant: &str) -> Option<i64> {
        self.values.iter().find(|v| v.name == variant).map(|v| v.value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub methods: Vec<FunctionDef>,
    pub span: Span,
}

impl ClassDef {
    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.ty.size()).sum()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// `use "module"` / `use "module::name"` / `use "module::*"` with an
/// optional `as alias`.
#[derive(Clone, Debug, PartialEq)]
pub struct Import {
    pub module: String,
    /// The single imported item, when not a whole-module import.
    pub item: Option<String>,
    pub alias: Option<String>,
    pub wildcard: bool,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TryStmt {
    pub body: Vec<Stmt>,
    pub catch_body: Vec<Stmt>,
    pub finally_body: Vec<Stmt>,
    pub span: Span,
}

/// Statements and declarations.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    VariableDecl {
        name: String,
        ty: Type,
        value: Option<Expr>,
        span: Span,
    },
    ConstantDecl {
        name: String,
        ty: Type,
        value: Expr,
        span: Span,
    },
    FunctionDef(FunctionDef),
    StructDef(StructDef),
    EnumDef(EnumDef),
    ClassDef(ClassDef),
    ArrayDecl {
        name: String,
        elem_type: Type,
        size: Option<usize>,
        initial: Vec<Expr>,
        span: Span,
    },
    Import(Import),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    CompoundAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
        span: Span,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        span: Span,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Vec<Stmt>,
        span: Span,
    },
    Try(TryStmt),
    Throw {
        value: Expr,
        span: Span,
    },
    /// Bare expression statement (a call, `i++`, ...).
    Expr {
        expr: Expr,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::VariableDecl { span, .. }
            | Stmt::ConstantDecl { span, .. }
            | Stmt::ArrayDecl { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::CompoundAssign { span, .. }
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Throw { span, .. }
            | Stmt::Expr { span, .. } => *span,
            Stmt::FunctionDef(def) => def.span,
            Stmt::StructDef(def) => def.span,
            Stmt::EnumDef(def) => def.span,
            Stmt::ClassDef(def) => def.span,
            Stmt::Import(import) => import.span,
            Stmt::Try(t) => t.span,
        }
    }
}

/// The argument of `sizeof`: either a type keyword or an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum SizeofArg {
    Type(Type),
    Expr(Expr),
}

/// Expressions.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    IntLit {
        value: i64,
        span: Span,
    },
    /// Fixed-point float: the written value scaled by 1000.
    FloatLit {
        value: i64,
        span: Span,
    },
    StrLit {
        value: String,
        span: Span,
    },
    BoolLit {
        value: bool,
        span: Span,
    },
    Ident {
        name: String,
        span: Span,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },
    Comparison {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    Ternary {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        span: Span,
    },
    /// A call by bare or `module::qualified` name.
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    ArrayLit {
        elems: Vec<Expr>,
        span: Span,
    },
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    /// `new Name{field: value, ...}` where `Name` is a struct. The
    /// parser cannot see the registries, so class instantiations also
    /// arrive as this variant and the code generator re-dispatches by
    /// registry lookup.
    StructLit {
        name: String,
        fields: Vec<(String, Expr)>,
        span: Span,
    },
    ClassLit {
        name: String,
        fields: Vec<(String, Expr)>,
        span: Span,
    },
    MethodCall {
        object: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        span: Span,
    },
    FieldAccess {
        object: Box<Expr>,
        field: String,
        /// True for `->` access through a pointer.
        is_pointer: bool,
        span: Span,
    },
    /// `Enum::Variant` not followed by an argument list.
    EnumLit {
        enum_name: String,
        variant: String,
        span: Span,
    },
    Ref {
        operand: Box<Expr>,
        span: Span,
    },
    Deref {
        operand: Box<Expr>,
        span: Span,
    },
    Malloc {
        size: Box<Expr>,
        span: Span,
    },
    Free {
        ptr: Box<Expr>,
        span: Span,
    },
    Sizeof {
        arg: Box<SizeofArg>,
        span: Span,
    },
    /// `null` literal.
    Null {
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::IntLit { span, .. }
            | Expr::FloatLit { span, .. }
            | Expr::StrLit { span, .. }
            | Expr::BoolLit { span, .. }
            | Expr::Ident { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Comparison { span, .. }
            | Expr::Logical { span, .. }
            | Expr::Ternary { span, .. }
            | Expr::Call { span, .. }
            | Expr::ArrayLit { span, .. }
            | Expr::Index { span, .. }
            | Expr::StructLit { span, .. }
            | Expr::ClassLit { span, .. }
            | Expr::MethodCall { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::EnumLit { span, .. }
            | Expr::Ref { span, .. }
            | Expr::Deref { span, .. }
            | Expr::Malloc { span, .. }
            | Expr::Free { span, .. }
            | Expr::Sizeof { span, .. }
            | Expr::Null { span } => *span,
        }
    }

    /// True for literal leaves, which the optimizer may fold.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            Expr::IntLit { .. } | Expr::FloatLit { .. } | Expr::StrLit { .. } | Expr::BoolLit { .. }
        )
    }
}
