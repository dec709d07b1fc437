//! Standard-library lowering.
//!
//! Every stdlib function has a dedicated assembly template keyed by
//! name: either an inline sequence at the call site or a lazily
//! emitted runtime helper routine that call sites invoke with the
//! System V convention. One file per module, each extending
//! [`CodeGen`](crate::CodeGen) the way the parser splits its impl
//! across files.

mod collections;
mod hash;
mod http;
mod io;
mod math;
mod mem;
mod net;
mod num;
mod strings;

use crate::codegen::CodeGen;
use lotusc_par::Expr;

/// The io print surface, resolvable without an import.
pub const PRINT_FUNCTIONS: &[&str] = &[
    "print", "println", "printf", "fprintf", "sprint", "sprintf", "sprintln", "fatalf",
    "fatalln", "logf", "logln",
];

/// Every stdlib module and its function surface, in documentation
/// order.
pub const MODULES: &[(&str, &[&str])] = &[
    ("io", PRINT_FUNCTIONS),
    ("mem", &["malloc", "mmap", "free", "munmap", "memcpy", "memset"]),
    (
        "math",
        &[
            "abs", "min", "max", "sqrt", "pow", "floor", "ceil", "round", "gcd", "lcm",
        ],
    ),
    (
        "str",
        &[
            "len",
            "concat",
            "copy",
            "compare",
            "indexOf",
            "contains",
            "startsWith",
            "endsWith",
        ],
    ),
    (
        "num",
        &[
            "toInt8", "toInt16", "toInt32", "toInt64", "toUint8", "toUint16", "toUint32",
            "toUint64", "toBool",
        ],
    ),
    (
        "hash",
        &["crc32", "fnv1a", "djb2", "murmur3", "sha256", "md5"],
    ),
    (
        "collections",
        &[
            "array_new",
            "array_push",
            "array_pop",
            "array_get",
            "array_set",
            "array_len",
            "stack_new",
            "stack_push",
            "stack_pop",
            "stack_peek",
            "stack_len",
            "queue_new",
            "queue_push",
            "queue_pop",
            "queue_len",
            "deque_new",
            "deque_push_front",
            "deque_push_back",
            "deque_pop_front",
            "deque_pop_back",
            "deque_len",
            "heap_new",
            "heap_push",
            "heap_pop",
            "heap_peek",
            "heap_len",
            "map_new",
            "map_put",
            "map_get",
            "map_remove",
            "map_len",
            "set_new",
            "set_add",
            "set_contains",
            "set_remove",
            "set_len",
            "binary_search",
        ],
    ),
    ("net", &["socket", "connect_ipv4", "send", "recv", "close"]),
    ("http", &["get"]),
];

/// Does `module` export `name`?
pub fn module_has(module: &str, name: &str) -> bool {
    MODULES
        .iter()
        .find(|(m, _)| *m == module)
        .map(|(_, funcs)| funcs.contains(&name))
        .unwrap_or(false)
}

/// Is `name` a registered print function?
pub fn is_print_function(name: &str) -> bool {
    PRINT_FUNCTIONS.contains(&name)
}

impl<'a> CodeGen<'a> {
    /// Dispatch a resolved stdlib call to its module's lowering.
    pub(crate) fn lower_stdlib(&mut self, module: &str, func: &str, args: &[Expr]) {
        let known = match module {
            "io" => self.lower_io(func, args),
            "mem" => self.lower_mem(func, args),
            "math" => self.lower_math(func, args),
            "str" => self.lower_str(func, args),
            "num" => self.lower_num(func, args),
            "hash" => self.lower_hash(func, args),
            "collections" => self.lower_collections(func, args),
            "net" => self.lower_net(func, args),
            "http" => self.lower_http(func, args),
            _ => false,
        };
        if !known {
            self.unknown(&format!("unknown function `{}::{}`", module, func));
        }
    }
}
