//! Function pointer heap type (§3.2, §4.2 "Call mechanics").

use std::rc::Rc;

use crate::object::ObjectRef;
use crate::program::Program;
use crate::value::Value;

/// Variant-specific payload of a function pointer, by `type` (§3.2).
#[derive(Debug, Clone)]
pub enum FunctionPointerKind {
    /// Calls a built-in efun by its registry index.
    Efun { efun_index: u32 },
    /// Calls a function on `owner` by its flattened runtime index.
    ///
    /// Resolved once, at capture time, via `make_lfun_funp_by_name` (§4.2): the index already
    /// includes the inheritance offset, so calling through this pointer never re-walks the
    /// inherit table.
    LocalLfun { runtime_index: u32 },
    /// Calls a registered simul-efun by its registry index.
    SimulEfun { simul_index: u32 },
    /// A `function` or anonymous-function literal: captures a specific program and entry
    /// offset plus the frame-setup parameters that entry point expects.
    Functional {
        program: Program,
        entry_offset: u32,
        num_arg: u16,
        num_local: u16,
        function_index_offset: u32,
        variable_index_offset: u32,
    },
}

/// A captured function pointer. `owner` is pinned by an `Rc`, matching §4.2: "the owner object
/// is pinned by a reference; calling through a destructed owner raises an error" — the pin
/// keeps the `ObjectData` allocation alive, but `owner.borrow().destructed` is still checked at
/// call time.
#[derive(Debug, Clone)]
pub struct FunctionPointer {
    pub kind: FunctionPointerKind,
    pub owner: ObjectRef,
    /// Arguments bound at capture time (`ob->fun_name(1, 2)`-style partial application), always
    /// supplied ahead of the call's own arguments.
    pub bound_args: Rc<Vec<Value>>,
}

impl FunctionPointer {
    pub fn is_callable(&self) -> bool {
        !self.owner.borrow().destructed
    }
}
