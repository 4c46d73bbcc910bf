//! The tagged `Value` (svalue) type and the heap types it can point at.
//!
//! Rust's ownership model does most of the work §3.1's manual refcounting invariants describe
//! for us: every heap type here is `Rc`-backed (`Rc<RefCell<_>>` where in-place mutation is
//! needed), so "ref count reaches zero" and "deallocate" collapse into an ordinary `Drop`. What
//! remains to model explicitly is the *destructed-object* rule (§3.1, §3.4, §8): a live `Rc`
//! to an object does not mean the object is still usable, and every read through such a
//! reference must observe `0` once the object is destructed. See [`resolve`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::array::LpcArray;
use crate::buffer::LpcBuffer;
use crate::class::ClassInstance;
use crate::function_pointer::FunctionPointer;
use crate::mapping::LpcMapping;
use crate::object::ObjectRef;

/// A string in one of the three storage modes described in §3.1/§3.2.
#[derive(Debug, Clone)]
pub enum LpcString {
    /// Interned in the process-wide shared-string table; cheap to compare and clone.
    Shared(Rc<str>),
    /// A unique, independently mutable buffer (the result of string-building efuns).
    Owned(Rc<RefCell<String>>),
    /// Baked into a program's string pool; never released through the string table.
    Constant(Rc<str>),
}

impl LpcString {
    /// Runs `f` with a `&str` view regardless of storage mode.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        match self {
            Self::Shared(s) | Self::Constant(s) => f(s),
            Self::Owned(s) => f(&s.borrow()),
        }
    }

    pub fn len(&self) -> usize {
        self.with_str(str::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_string(&self) -> String {
        self.with_str(str::to_owned)
    }

    /// Makes a private, mutable copy — used before taking a char-lvalue into a string, since a
    /// shared or constant string must never be mutated in place (§4.2 indexing).
    pub fn uniquify(&mut self) {
        if let Self::Owned(rc) = self {
            if Rc::strong_count(rc) == 1 {
                return;
            }
        }
        let copy = self.to_string();
        *self = Self::Owned(Rc::new(RefCell::new(copy)));
    }
}

impl PartialEq for LpcString {
    fn eq(&self, other: &Self) -> bool {
        self.with_str(|a| other.with_str(|b| a == b))
    }
}

/// The tagged runtime value. See §3.1.
#[derive(Debug, Clone)]
pub enum Value {
    /// Plain integer, including the result of every arithmetic/comparison opcode.
    Int(i64),
    /// The unique "undefined" zero (`0u`): behaves like `Int(0)` everywhere except
    /// `undefinedp()`. Produced automatically when a dereferenced object pointer is destructed.
    Undefined,
    Real(f64),
    String(LpcString),
    Array(Rc<RefCell<LpcArray>>),
    Class(Rc<RefCell<ClassInstance>>),
    Mapping(Rc<RefCell<LpcMapping>>),
    Buffer(Rc<RefCell<LpcBuffer>>),
    Object(ObjectRef),
    Function(Rc<FunctionPointer>),
    /// An lvalue cursor, produced by `F_LOCAL`/`F_GLOBAL`/indexing/range opcodes in lvalue
    /// position. Never observed by LPC code directly; `F_ASSIGN` consumes it.
    Lvalue(Rc<RefCell<crate::instruction_handlers::indexing::Lvalue>>),
}

impl Value {
    pub const ZERO: Value = Value::Int(0);

    pub fn undefined() -> Value {
        Value::Undefined
    }

    pub fn undefinedp(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) | Value::Undefined => "int",
            Value::Real(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Class(_) => "class",
            Value::Mapping(_) => "mapping",
            Value::Buffer(_) => "buffer",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Lvalue(_) => "lvalue",
        }
    }

    /// Truthiness as used by branch opcodes: everything is true except `0`, `0u`, and `0.0`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(0) | Value::Undefined => false,
            Value::Real(r) => *r != 0.0,
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Undefined => Some(0),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Int(i) => Some(*i as f64),
            Value::Undefined => Some(0.0),
            _ => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Undefined
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Undefined => write!(f, "0"),
            Value::Real(r) => write!(f, "{r}"),
            Value::String(s) => s.with_str(|s| write!(f, "{s}")),
            Value::Array(a) => write!(f, "({{ {} elements }})", a.borrow().items.len()),
            Value::Class(c) => write!(f, "(/ {} members /)", c.borrow().members.len()),
            Value::Mapping(m) => write!(f, "([ {} entries ])", m.borrow().len()),
            Value::Buffer(b) => write!(f, "(buffer of {} bytes)", b.borrow().bytes.len()),
            Value::Object(o) => write!(f, "{}", o.borrow().name),
            Value::Function(_) => write!(f, "<function>"),
            Value::Lvalue(_) => write!(f, "<lvalue>"),
        }
    }
}

/// Equality used by `==`, by mapping-key lookup, and by the save/restore round-trip law (§8).
///
/// Heap types compare by identity for object/function pointers (pointer-hash semantics, §4.3)
/// and by structural equality for arrays/mappings/classes/buffers/strings, matching the C
/// source's `same_object`-vs-`deep equality` split for `==`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(_) | Value::Undefined, Value::Int(_) | Value::Undefined) => {
                self.as_int() == other.as_int()
            }
            (Value::Real(a), Value::Real(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Mapping(a), Value::Mapping(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Buffer(a), Value::Buffer(b)) => {
                Rc::ptr_eq(a, b) || a.borrow().bytes == b.borrow().bytes
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// The destructed-object read barrier (§3.1, §9 "Destructed-object lazy cleanup").
///
/// Applied at every site a value is observed from a root: a local/global variable read, an
/// array/mapping index, or a value pushed from the evaluator stack. If `value` is an `Object`
/// whose target is destructed, the slot `value` was read from is rewritten to [`Value::Undefined`]
/// and `Value::Undefined` is returned; otherwise `value` is returned unchanged (cloned, since
/// `Value` is not `Copy`).
pub fn resolve(slot: &mut Value) -> Value {
    let replace = matches!(slot, Value::Object(o) if o.borrow().destructed);
    if replace {
        *slot = Value::Undefined;
    }
    slot.clone()
}

/// Same as [`resolve`] but for a value already detached from its root (e.g. about to be pushed
/// onto the evaluator stack from a temporary). Returns `Value::Undefined` if the object behind
/// `value` is destructed; the caller is responsible for not holding on to the original.
pub fn resolve_owned(value: Value) -> Value {
    match &value {
        Value::Object(o) if o.borrow().destructed => Value::Undefined,
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_is_falsy_and_equals_zero_but_is_flagged() {
        let zero = Value::Int(0);
        let undef = Value::Undefined;
        assert_eq!(zero, undef);
        assert!(!zero.undefinedp());
        assert!(undef.undefinedp());
        assert!(!zero.is_truthy());
        assert!(!undef.is_truthy());
    }

    #[test]
    fn shared_and_owned_strings_compare_by_content() {
        let a = Value::String(LpcString::Shared(Rc::from("hi")));
        let b = Value::String(LpcString::Owned(Rc::new(RefCell::new("hi".to_owned()))));
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_mappings_and_classes_with_equal_contents_compare_equal() {
        use crate::class::ClassInstance;
        use crate::mapping::LpcMapping;

        let mut a = LpcMapping::new();
        a.insert(Value::Int(1), Value::Int(2), 10).unwrap();
        let mut b = LpcMapping::new();
        b.insert(Value::Int(1), Value::Int(2), 10).unwrap();
        assert_eq!(
            Value::Mapping(Rc::new(RefCell::new(a))),
            Value::Mapping(Rc::new(RefCell::new(b)))
        );

        let class_a = ClassInstance::new(0, vec![Value::Int(1), Value::Int(2)]);
        let class_b = ClassInstance::new(0, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            Value::Class(Rc::new(RefCell::new(class_a))),
            Value::Class(Rc::new(RefCell::new(class_b)))
        );
    }
}
