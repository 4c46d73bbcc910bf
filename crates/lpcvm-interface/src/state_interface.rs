/// A read-only snapshot of an svalue, shaped for tracer consumption.
///
/// This is deliberately not the core crate's `Value` type: the interface crate must not depend
/// on `lpcvm`, and a tracer should never be able to mutate the heap graph directly (arrays,
/// mappings, and classes are exposed only as an opaque id plus a length so a tracer can report
/// on them without aliasing the VM's `Rc<RefCell<_>>` storage).
#[derive(Debug, Clone, PartialEq)]
pub enum TracedValue {
    /// The undefined `0u` produced by a destructed-object read or a missing mapping key.
    Undefined,
    Int(i64),
    Real(f64),
    String(String),
    /// Opaque array id plus element count.
    Array(HeapRef, usize),
    /// Opaque class id plus member count.
    Class(HeapRef, usize),
    /// Opaque mapping id plus entry count.
    Mapping(HeapRef, usize),
    /// Opaque buffer id plus byte length.
    Buffer(HeapRef, usize),
    /// Object id and the object's current (possibly destructed) name.
    Object(HeapRef, String),
    /// A function pointer; no payload is exposed beyond its kind tag.
    Function(&'static str),
}

/// Opaque identifier for a heap allocation, stable for the allocation's lifetime.
///
/// Analogous to a `HeapId` in a register VM: it lets a tracer correlate two observations of
/// the same array/mapping/object without handing out a real pointer or `Rc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapRef(u64);

impl HeapRef {
    #[must_use]
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }
}

/// A single control-stack frame, as seen from a tracer.
///
/// Mirrors the fields a debugger would want from a call frame: which program is executing,
/// at what offset, how many locals are live, and whether this frame is a `catch` frame.
pub trait CallframeInterface {
    /// Name of the object whose code is executing in this frame.
    fn object_name(&self) -> &str;
    /// Name of the program (may differ from the object's own program under inheritance).
    fn program_name(&self) -> &str;
    /// Index of the function being executed, in the flattened dispatch table.
    fn function_index(&self) -> u32;
    /// Offset of the next instruction to execute within this frame's program.
    fn program_counter(&self) -> u32;
    /// Number of local variable slots reserved by this frame.
    fn local_count(&self) -> u16;
    /// `true` if this frame is a `catch` frame rather than an ordinary call frame.
    fn is_catch(&self) -> bool;
    /// `true` if this frame was installed by `setup_fake_frame` to attribute a function-pointer
    /// call back to its owner.
    fn is_fake(&self) -> bool;
}

/// Read access to interpreter-global state, independent of any particular callframe.
///
/// A tracer reaches this through [`crate::Tracer::before_instruction`] /
/// [`crate::Tracer::after_instruction`] and uses it the way a debugger inspects registers: to
/// read a value without affecting dispatch.
pub trait GlobalStateInterface {
    /// Number of live callframes, innermost first when indexed from `0`.
    fn number_of_callframes(&self) -> usize;

    /// Callframe at depth `0` (the one currently executing).
    fn current_frame(&mut self) -> impl CallframeInterface + '_;

    /// Callframe at the given depth, `0` being innermost.
    fn callframe(&mut self, depth: usize) -> impl CallframeInterface + '_;

    /// Depth of the evaluator stack (number of live svalues).
    fn evaluator_stack_depth(&self) -> usize;

    /// Reads a value from the evaluator stack, `0` being the top.
    fn read_stack(&self, index_from_top: usize) -> TracedValue;

    /// Reads a local variable slot of the current frame.
    fn read_local(&self, slot: u16) -> TracedValue;

    /// Reads a global variable slot of the current object.
    fn read_global(&self, slot: u16) -> TracedValue;

    /// Remaining per-tick instruction budget.
    fn eval_cost_remaining(&self) -> i64;

    /// Depth of the saved-context (catch) stack.
    fn catch_depth(&self) -> usize;
}

/// How an interpreter run came to a stop. Returned from `run` inside [`ExecutionStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEnd {
    /// The outermost frame returned normally with the carried value left on the stack.
    Returned,
    /// An uncatchable condition unwound all the way to the outermost saved context.
    Halted(HaltReason),
    /// A recoverable error propagated past every `catch` and every master-object handler.
    Unhandled(String),
}

/// Reason an [`ExecutionEnd::Halted`] occurred. Uncatchable by construction: no `catch` frame,
/// however deep, is offered the chance to intercept these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    EvaluatorStackOverflow,
    ControlStackOverflow,
    EvalCostExhausted,
}

/// Status returned after each opcode dispatch: either still running, or stopped for a reason
/// recorded as an [`ExecutionEnd`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Running,
    Stopped(ExecutionEnd),
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// A state that answers every [`GlobalStateInterface`] query with an inert placeholder.
///
/// Used in this crate's own doctests and unit tests where a tracer needs *some* state to be
/// handed but the test does not exercise a real interpreter.
#[derive(Debug)]
pub struct DummyState;

struct DummyFrame;

impl CallframeInterface for DummyFrame {
    fn object_name(&self) -> &str {
        "/dummy"
    }
    fn program_name(&self) -> &str {
        "/dummy"
    }
    fn function_index(&self) -> u32 {
        0
    }
    fn program_counter(&self) -> u32 {
        0
    }
    fn local_count(&self) -> u16 {
        0
    }
    fn is_catch(&self) -> bool {
        false
    }
    fn is_fake(&self) -> bool {
        false
    }
}

impl GlobalStateInterface for DummyState {
    fn number_of_callframes(&self) -> usize {
        1
    }
    fn current_frame(&mut self) -> impl CallframeInterface + '_ {
        DummyFrame
    }
    fn callframe(&mut self, _depth: usize) -> impl CallframeInterface + '_ {
        DummyFrame
    }
    fn evaluator_stack_depth(&self) -> usize {
        0
    }
    fn read_stack(&self, _index_from_top: usize) -> TracedValue {
        TracedValue::Undefined
    }
    fn read_local(&self, _slot: u16) -> TracedValue {
        TracedValue::Undefined
    }
    fn read_global(&self, _slot: u16) -> TracedValue {
        TracedValue::Undefined
    }
    fn eval_cost_remaining(&self) -> i64 {
        0
    }
    fn catch_depth(&self) -> usize {
        0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    pub(crate) use super::DummyState;
}
