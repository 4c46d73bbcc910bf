//! Control stack frames (§4.1, §4.6).
//!
//! LPC's control stack holds two structurally different things — ordinary call frames and catch
//! frames, the latter existing purely to remember where to unwind to — so [`ControlFrame`] keeps
//! them as separate variants instead of cramming an `Option<CatchContext>` onto every frame.

use crate::object::ObjectRef;
use crate::program::Program;

/// What kind of call produced this frame (§4.1: "kind (function, functional, catch, fake, or
/// external sentinel)" — catch is split out as [`ControlFrame::Catch`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallFrameKind {
    /// An ordinary `F_CALL_FUNCTION_BY_ADDRESS`/inherited/simul-efun call.
    Call,
    /// A call through a function pointer (`call_other` on a closure, or `(: ... :)` literal).
    Functional,
    /// A frame with no caller to return to, used to bound a nested `eval_cost`-metered
    /// evaluation (e.g. a sort callback) without unwinding all the way to the driver.
    Fake,
    /// The outermost frame of one externally initiated execution ("one tick", §5). Popping this
    /// one is the sentinel the run loop checks to know the call has fully returned (§2).
    External,
}

/// One entry of the control stack representing an in-progress call: what to restore when this
/// call's frame is popped by `F_RETURN`/`F_RETURN_ZERO`, plus what the callee needs to run.
#[derive(Debug, Clone)]
pub struct CallFrame {
    pub kind: CallFrameKind,
    pub program: Program,
    pub object: ObjectRef,
    pub previous_object: Option<ObjectRef>,
    /// Runtime dispatch-table index of the function executing in this frame (diagnostics/trace
    /// only — dispatch itself never needs to look this back up).
    pub function_index: u32,
    /// Evaluator-stack index of this frame's first local variable.
    pub fp: usize,
    pub num_args: u16,
    pub num_locals: u16,
    /// Added to a called function's runtime index to resolve it in *this* frame's flattened
    /// dispatch table (nonzero only inside an inherited-program's own code, §4.2).
    pub function_index_offset: u32,
    pub variable_index_offset: u32,

    // --- What the caller needs restored on return ---
    pub caller_pc: u32,
    pub caller_fp: usize,
    pub caller_program: Program,
    pub caller_object: ObjectRef,
    pub caller_previous_object: Option<ObjectRef>,
}

/// A saved error context installed by `F_CATCH` (§4.6: "a saved snapshot of `(command_giver,
/// sp, csp, previous context)` plus a jump target").
#[derive(Debug, Clone)]
pub struct CatchFrame {
    /// Offset of the handler `F_CATCH` should jump to if an error unwinds to this frame.
    pub handler_offset: u32,
    /// Evaluator-stack top to restore before jumping to the handler.
    pub saved_sp: usize,
    /// Control-stack depth (`csp`) to restore — everything above this frame is discarded.
    pub saved_control_depth: usize,
    pub saved_command_giver: Option<ObjectRef>,
    pub program: Program,
    pub object: ObjectRef,
}

/// One entry of the control stack (§4.1).
#[derive(Debug, Clone)]
pub enum ControlFrame {
    Call(CallFrame),
    Catch(CatchFrame),
}

impl ControlFrame {
    pub fn as_call(&self) -> Option<&CallFrame> {
        match self {
            ControlFrame::Call(f) => Some(f),
            ControlFrame::Catch(_) => None,
        }
    }

    pub fn as_catch(&self) -> Option<&CatchFrame> {
        match self {
            ControlFrame::Catch(f) => Some(f),
            ControlFrame::Call(_) => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, ControlFrame::Call(f) if f.kind == CallFrameKind::External)
    }
}
