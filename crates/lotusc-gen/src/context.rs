//! Compilation context: type registries, import table, label counters.
//!
//! Everything the code generator needs to share across functions lives
//! here and is threaded explicitly, with no process-global state.
//! The registries are insertion-ordered so the emitted `.data` section
//! is deterministic for a given input.

use indexmap::IndexMap;
use lotusc_par::{ClassDef, EnumDef, FunctionDef, Import, StructDef};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::stdlib;

/// Registries and counters for one compilation unit.
#[derive(Default)]
pub struct CompilationContext {
    /// User-defined functions by name.
    pub functions: IndexMap<String, FunctionDef>,
    /// Struct definitions by name.
    pub structs: IndexMap<String, StructDef>,
    /// Enum definitions by name.
    pub enums: IndexMap<String, EnumDef>,
    /// Class definitions by name.
    pub classes: IndexMap<String, ClassDef>,
    /// Imported stdlib surface.
    pub imports: ImportTable,

    label_counter: u64,
    str_counter: u64,
    newline_counter: u64,
    intbuf_counter: u64,
    charbuf_counter: u64,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh local label `.{prefix}_{N}`. The counter is shared by
    /// every prefix, so no two labels in a document collide.
    pub fn fresh_label(&mut self, prefix: &str) -> String {
        let n = self.label_counter;
        self.label_counter += 1;
        format!(".{}_{}", prefix, n)
    }

    /// A fresh string-literal label `.strN`.
    pub fn fresh_str_label(&mut self) -> String {
        let n = self.str_counter;
        self.str_counter += 1;
        format!(".str{}", n)
    }

    /// A fresh newline-literal label `.newlineN`.
    pub fn fresh_newline_label(&mut self) -> String {
        let n = self.newline_counter;
        self.newline_counter += 1;
        format!(".newline{}", n)
    }

    /// A fresh integer-format buffer label `.intbufN`.
    pub fn fresh_intbuf_label(&mut self) -> String {
        let n = self.intbuf_counter;
        self.intbuf_counter += 1;
        format!(".intbuf{}", n)
    }

    /// A fresh char buffer label `.charbufN`.
    pub fn fresh_charbuf_label(&mut self) -> String {
        let n = self.charbuf_counter;
        self.charbuf_counter += 1;
        format!(".charbuf{}", n)
    }
}

/// Which stdlib names are reachable, and under which spellings.
#[derive(Default)]
pub struct ImportTable {
    /// Whole-module imports (`use "io"`), including wildcards.
    modules: FxHashSet<String>,
    /// Module aliases (`use "collections" as c` makes `c::map_new`
    /// resolve).
    aliases: FxHashMap<String, String>,
    /// Single-item imports: visible name -> (module, function).
    items: FxHashMap<String, (String, String)>,
}

impl ImportTable {
    /// Register one `use` statement.
    pub fn register(&mut self, import: &Import) {
        match (&import.item, import.wildcard) {
            // `use "module::*"` and `use "module"` both expose every
            // function of the module by bare name.
            (None, _) | (_, true) => {
                self.modules.insert(import.module.clone());
                if let Some(alias) = &import.alias {
                    self.aliases.insert(alias.clone(), import.module.clone());
                }
            }
            (Some(item), false) => {
                let visible = import.alias.clone().unwrap_or_else(|| item.clone());
                self.items
                    .insert(visible, (import.module.clone(), item.clone()));
            }
        }
    }

    /// Resolve a bare name against single-item imports, then against
    /// whole-module imports.
    pub fn resolve_bare(&self, name: &str) -> Option<(String, String)> {
        if let Some((module, func)) = self.items.get(name) {
            return Some((module.clone(), func.clone()));
        }
        self.modules
            .iter()
            .find(|module| stdlib::module_has(module, name))
            .map(|module| (module.clone(), name.to_string()))
    }

    /// Resolve the module part of a qualified call, following aliases.
    pub fn resolve_module<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lotusc_util::Span;

    fn import(module: &str, item: Option<&str>, alias: Option<&str>, wildcard: bool) -> Import {
        Import {
            module: module.into(),
            item: item.map(str::to_string),
            alias: alias.map(str::to_string),
            wildcard,
            span: Span::DUMMY,
        }
    }

    #[test]
    fn test_labels_are_unique_across_prefixes() {
        let mut ctx = CompilationContext::new();
        let a = ctx.fresh_label("if_end");
        let b = ctx.fresh_label("while");
        let c = ctx.fresh_label("if_end");
        assert_eq!(a, ".if_end_0");
        assert_eq!(b, ".while_1");
        assert_eq!(c, ".if_end_2");
    }

    #[test]
    fn test_data_label_counters() {
        let mut ctx = CompilationContext::new();
        assert_eq!(ctx.fresh_str_label(), ".str0");
        assert_eq!(ctx.fresh_str_label(), ".str1");
        assert_eq!(ctx.fresh_newline_label(), ".newline0");
        assert_eq!(ctx.fresh_intbuf_label(), ".intbuf0");
        assert_eq!(ctx.fresh_charbuf_label(), ".charbuf0");
    }

    #[test]
    fn test_whole_module_import_resolves_bare_names() {
        let mut table = ImportTable::default();
        table.register(&import("math", None, None, false));
        assert_eq!(
            table.resolve_bare("gcd"),
            Some(("math".into(), "gcd".into()))
        );
        assert_eq!(table.resolve_bare("concat"), None);
    }

    #[test]
    fn test_single_item_import_with_alias() {
        let mut table = ImportTable::default();
        table.register(&import("str", Some("concat"), Some("join"), false));
        assert_eq!(
            table.resolve_bare("join"),
            Some(("str".into(), "concat".into()))
        );
        assert_eq!(table.resolve_bare("concat"), None);
    }

    #[test]
    fn test_wildcard_import() {
        let mut table = ImportTable::default();
        table.register(&import("collections", None, None, true));
        assert_eq!(
            table.resolve_bare("map_put"),
            Some(("collections".into(), "map_put".into()))
        );
    }

    #[test]
    fn test_module_alias() {
        let mut table = ImportTable::default();
        table.register(&import("collections", None, Some("c"), false));
        assert_eq!(table.resolve_module("c"), "collections");
        assert_eq!(table.resolve_module("io"), "io");
    }
}
