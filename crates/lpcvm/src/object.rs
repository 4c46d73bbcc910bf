//! Object heap type, object table, and living-name index (§3.2, §4.5).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::program::Program;
use crate::sentence::Sentence;
use crate::value::Value;

pub type ObjectRef = Rc<RefCell<ObjectData>>;

bitflags::bitflags! {
    /// Object header flags (§3.2's "header (`ref`, flags, name, hash-next)").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ObjectFlags: u32 {
        const DESTRUCTED   = 1 << 0;
        const LIVING       = 1 << 1;
        const INTERACTIVE  = 1 << 2;
        const CLONE        = 1 << 3;
    }
}

#[derive(Debug)]
pub struct ObjectData {
    pub name: String,
    pub flags: ObjectFlags,
    pub program: Program,
    pub variables: Vec<Value>,
    /// The object this one is contained in ("environment"). `Weak` so that an environment
    /// holding an inventory of objects does not form an unbreakable `Rc` cycle with the
    /// objects it contains (§9: cycles are broken by the destructed-object rule, not a tracing
    /// collector — but an `Rc` cycle with no weak link anywhere would simply never collect).
    pub environment: Option<Weak<RefCell<ObjectData>>>,
    /// Objects directly contained in this one (`contains()`/`next_inv()` walk this in order).
    pub inventory: Vec<ObjectRef>,
    /// Shadow chain: the object shadowing this one, if any. At most one per object (§4.5);
    /// new shadows are appended by walking to the end of the chain before linking.
    pub shadowed_by: Option<ObjectRef>,
    /// Sentence chain: LIFO list of pending `input_to`/`get_char` callbacks.
    pub sentences: Vec<Sentence>,
    /// Declared living name, if any (`enable_commands` + `set_living_name`).
    pub living_name: Option<String>,
    /// Absolute tick/second at which `reset` should next fire.
    pub reset_time: u64,
    /// `destructed` is also mirrored in `flags` for the bitflag-consuming paths; this bool is
    /// kept as the single source of truth read by [`crate::value::resolve`] on every hot path.
    pub destructed: bool,
}

impl ObjectData {
    pub fn new(name: String, program: Program, num_variables: usize) -> Self {
        Self {
            name,
            flags: ObjectFlags::empty(),
            program,
            variables: vec![Value::Undefined; num_variables],
            environment: None,
            inventory: Vec::new(),
            shadowed_by: None,
            sentences: Vec::new(),
            living_name: None,
            reset_time: 0,
            destructed: false,
        }
    }

    /// Walks to the end of the shadow chain, respecting "first override wins" (§4.5): the
    /// *outermost* shadow is the one at the end of the chain, so command/apply dispatch should
    /// start there and walk back toward `self`.
    pub fn outermost_shadow(self_ref: &ObjectRef) -> ObjectRef {
        let mut current = self_ref.clone();
        loop {
            let next = current.borrow().shadowed_by.clone();
            match next {
                Some(n) => current = n,
                None => return current,
            }
        }
    }
}

/// Global object table: name hash, living-name hash, and the doubly-linked object list
/// (modeled here as ordered `Vec`s — Rust's allocator already gives us stable addresses, the
/// intrusive links in the C source exist only to avoid a second allocation).
#[derive(Debug, Default)]
pub struct ObjectTable {
    by_name: HashMap<String, ObjectRef>,
    living: HashMap<String, ObjectRef>,
    order: Vec<ObjectRef>,
}

impl ObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, obj: ObjectRef) {
        let name = obj.borrow().name.clone();
        self.order.push(obj.clone());
        self.by_name.insert(name, obj);
    }

    pub fn find(&self, name: &str) -> Option<ObjectRef> {
        self.by_name.get(name).cloned()
    }

    pub fn remove(&mut self, name: &str) -> Option<ObjectRef> {
        let obj = self.by_name.remove(name)?;
        self.order.retain(|o| !Rc::ptr_eq(o, &obj));
        if let Some(living_name) = obj.borrow().living_name.clone() {
            self.living.remove(&living_name);
        }
        Some(obj)
    }

    pub fn set_living(&mut self, name: String, obj: ObjectRef) {
        obj.borrow_mut().living_name = Some(name.clone());
        obj.borrow_mut().flags.insert(ObjectFlags::LIVING);
        self.living.insert(name, obj);
    }

    pub fn find_living(&self, name: &str) -> Option<ObjectRef> {
        self.living.get(name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    fn blank_program() -> Program {
        Program::empty("/test")
    }

    #[test]
    fn destructed_flag_is_observable_through_a_live_reference() {
        let obj: ObjectRef = Rc::new(RefCell::new(ObjectData::new(
            "/obj#1".into(),
            blank_program(),
            0,
        )));
        let alias = obj.clone();
        obj.borrow_mut().destructed = true;
        assert!(alias.borrow().destructed);
    }
}
