//! Per-function frame state: local variables, constants, string
//! lengths, the running stack offset.
//!
//! Locals live below the frame base pointer; each declaration claims
//! one 8-byte slot and records its distance from `%rbp`. On entry to a
//! nested function body the generator swaps the whole frame out with
//! `std::mem::replace` and restores it afterwards, so sibling
//! functions see independent frames.

use lotusc_par::Type;
use rustc_hash::FxHashMap;

/// Stack-offset sentinel marking a constant that lives in `.data`
/// rather than on the frame.
pub const DATA_SECTION_OFFSET: i64 = -1;

/// One local variable.
#[derive(Clone, Debug)]
pub struct Variable {
    pub ty: Type,
    /// Distance below the frame base pointer; the value lives at
    /// `-offset(%rbp)`.
    pub offset: i64,
}

/// One named constant: its data-section label and the sentinel offset.
#[derive(Clone, Debug)]
pub struct Constant {
    pub ty: Type,
    pub label: String,
    pub offset: i64,
}

/// Frame state for the function body currently being generated.
#[derive(Default)]
pub struct Frame {
    variables: FxHashMap<String, Variable>,
    constants: FxHashMap<String, Constant>,
    /// Compile-time byte lengths of string variables, enabling
    /// length-bounded `write(2)` calls without a runtime scan.
    string_lengths: FxHashMap<String, usize>,
    /// Running allocation below `%rbp`.
    stack_offset: i64,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an 8-byte slot for `name` and return its offset below the
    /// frame pointer.
    pub fn alloc(&mut self, name: &str, ty: Type) -> i64 {
        self.stack_offset += 8;
        let offset = self.stack_offset;
        self.variables.insert(name.to_string(), Variable { ty, offset });
        offset
    }

    /// Claim a raw block of `bytes` below the frame pointer (array and
    /// struct storage). Returns the offset of the block base, its
    /// lowest address.
    pub fn alloc_block(&mut self, bytes: i64) -> i64 {
        self.stack_offset += bytes;
        self.stack_offset
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    pub fn define_constant(&mut self, name: &str, ty: Type, label: String) {
        self.constants.insert(
            name.to_string(),
            Constant {
                ty,
                label,
                offset: DATA_SECTION_OFFSET,
            },
        );
    }

    pub fn constant(&self, name: &str) -> Option<&Constant> {
        self.constants.get(name)
    }

    /// Constants are data-section labels, so a nested function frame
    /// inherits them from its enclosing frame.
    pub fn adopt_constants(&mut self, outer: &Frame) {
        for (name, constant) in &outer.constants {
            self.constants.insert(name.clone(), constant.clone());
        }
        for (name, len) in &outer.string_lengths {
            if outer.constants.contains_key(name) {
                self.string_lengths.insert(name.clone(), *len);
            }
        }
    }

    pub fn set_string_length(&mut self, name: &str, len: usize) {
        self.string_lengths.insert(name.to_string(), len);
    }

    pub fn clear_string_length(&mut self, name: &str) {
        self.string_lengths.remove(name);
    }

    pub fn string_length(&self, name: &str) -> Option<usize> {
        self.string_lengths.get(name).copied()
    }

    /// Total bytes currently allocated for locals.
    pub fn allocated(&self) -> i64 {
        self.stack_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_assigns_descending_slots() {
        let mut frame = Frame::new();
        assert_eq!(frame.alloc("a", Type::Int), 8);
        assert_eq!(frame.alloc("b", Type::Int), 16);
        assert_eq!(frame.alloc("c", Type::Str), 24);
        assert_eq!(frame.allocated(), 24);
        assert_eq!(frame.variable("b").map(|v| v.offset), Some(16));
    }

    #[test]
    fn test_constants_use_sentinel_offset() {
        let mut frame = Frame::new();
        frame.define_constant("MAX", Type::Int, ".const_0".into());
        let constant = frame.constant("MAX").unwrap();
        assert_eq!(constant.offset, DATA_SECTION_OFFSET);
        assert_eq!(constant.label, ".const_0");
    }

    #[test]
    fn test_string_length_tracking() {
        let mut frame = Frame::new();
        frame.alloc("s", Type::Str);
        frame.set_string_length("s", 13);
        assert_eq!(frame.string_length("s"), Some(13));
        frame.clear_string_length("s");
        assert_eq!(frame.string_length("s"), None);
    }
}
