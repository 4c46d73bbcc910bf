//! Class heap type (§3.2): "identical layout to array, distinguished by tag; `size` fixed at
//! compile time per class definition." We keep a separate type rather than reusing `LpcArray`
//! so `Value::Array` vs `Value::Class` stay distinguishable at the type level the way the
//! spec's tag byte distinguishes them at runtime, and so a class can carry its definition index
//! for `F_NEW_CLASS`'s member-name diagnostics.

use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ClassInstance {
    /// Index into the defining program's class-definition table.
    pub class_index: u32,
    pub members: Vec<Value>,
}

impl ClassInstance {
    pub fn new(class_index: u32, members: Vec<Value>) -> Self {
        Self { class_index, members }
    }
}
