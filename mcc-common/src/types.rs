//! Common types used throughout the engine
//!
//! Shared identifier types and generators used by the resolver and the
//! code generator.

use serde::{Deserialize, Serialize};

/// The one integer width of MicroC: the native machine word.
/// Both values and addresses (word indices into the runtime stack)
/// are represented as `Word`s.
pub type Word = i64;

/// Symbol identifier: the stable binding reference attached to each
/// resolved use-site during semantic analysis
pub type SymbolId = u32;

/// Label identifier for code generation
pub type LabelId = u32;

/// Index of a compiled function in the program's function table.
/// Also the runtime representation of a function-pointer handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Label generator for code generation
#[derive(Debug, Clone, Default)]
pub struct LabelGenerator {
    next_id: LabelId,
}

impl LabelGenerator {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Generate a new unique label
    pub fn new_label(&mut self) -> LabelId {
        let label = self.next_id;
        self.next_id += 1;
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_generator() {
        let mut gen = LabelGenerator::new();

        assert_eq!(gen.new_label(), 0);
        assert_eq!(gen.new_label(), 1);
        assert_eq!(gen.new_label(), 2);
    }

    #[test]
    fn test_function_id_index() {
        assert_eq!(FunctionId(3).index(), 3);
    }
}
