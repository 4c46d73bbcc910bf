//! VM state (§4.1, §9: "group [stack, pc, frame bookkeeping] into a single `VmState`").
//!
//! `VmState` is the evaluator stack, the control stack, and the handful of "current call" scalars
//! (`pc`, `program`, `object`, `previous_object`, `command_giver`) that the interpreter loop reads
//! on every opcode.

use std::rc::Rc;

use lpcvm_interface::ExecutionEnd;

use crate::callframe::ControlFrame;
use crate::error::{VmHalt, VmResult};
use crate::object::ObjectRef;
use crate::program::Program;
use crate::value::Value;

#[derive(Debug)]
pub struct VmState {
    /// The evaluator stack (§4.1). Indices below `fp()` belong to enclosing frames.
    pub stack: Vec<Value>,
    /// The control stack (§4.1): one entry per in-progress call or installed catch handler.
    pub control: Vec<ControlFrame>,
    /// Index into `program.instructions()` of the next opcode to execute.
    pub pc: u32,
    pub program: Program,
    pub object: ObjectRef,
    pub previous_object: Option<ObjectRef>,
    /// The object `write()`/interactive commands are attributed to (distinct from `object`
    /// when a function pointer call crosses objects, §4.5).
    pub command_giver: Option<ObjectRef>,
    /// Remaining per-tick cost budget (§4.2 "Per-instruction cost"); refilled by the driver
    /// before each externally initiated call, never by the interpreter itself.
    pub eval_cost: i64,
    /// The well-known slot `F_CATCH`/`throw()` write into and `F_END_CATCH` reads (§4.6).
    pub catch_value: Value,
    /// Sticky flag for uncatchable conditions (§7: "even if a `catch` is active, rethrow
    /// occurs"). Cleared only when execution returns to the outermost external frame.
    pub uncatchable: bool,

    pub evaluator_stack_limit: usize,
    pub control_stack_limit: usize,

    /// Stack of active `foreach` loop cursors (§9 redesign: "the foreach protocol therefore
    /// captures a snapshot of keys for mappings"). Represented uniformly as `(key, value)`
    /// pairs: an array's key is its index, a mapping's key is its own key.
    pub foreach_stack: Vec<ForeachCursor>,

    /// Set by `F_RETURN`/`F_RETURN_ZERO` when the frame it just popped was the outermost
    /// (`external`) one (§2: "the loop runs until the outermost frame returns"). The run loop
    /// checks this after every opcode rather than threading a return value through every
    /// handler signature.
    pub finished: Option<ExecutionEnd>,
}

#[derive(Debug)]
pub struct ForeachCursor {
    pub items: Rc<Vec<(Value, Value)>>,
    pub index: usize,
}

impl VmState {
    pub fn new(
        program: Program,
        object: ObjectRef,
        eval_cost: i64,
        evaluator_stack_limit: usize,
        control_stack_limit: usize,
    ) -> Self {
        Self {
            stack: Vec::with_capacity(64),
            control: Vec::with_capacity(32),
            pc: 0,
            program,
            object,
            previous_object: None,
            command_giver: None,
            eval_cost,
            catch_value: Value::Int(0),
            uncatchable: false,
            evaluator_stack_limit,
            control_stack_limit,
            foreach_stack: Vec::new(),
            finished: None,
        }
    }

    /// Frame-pointer of the frame currently executing: the evaluator-stack index its locals
    /// start at, or `0` for the outermost frame.
    pub fn fp(&self) -> usize {
        self.control
            .iter()
            .rev()
            .find_map(|f| f.as_call())
            .map_or(0, |f| f.fp)
    }

    pub fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.evaluator_stack_limit {
            self.uncatchable = true;
            return Err(VmHalt::EvaluatorStackOverflow.into());
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops a value, defaulting to `0` on underflow rather than panicking — a bytecode stream
    /// that pops an opcode's own pushed operands can never underflow in practice, but a fuzzed
    /// or hand-assembled program can, and §7 treats bad bytecode as the driver's problem, not a
    /// crash.
    pub fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Int(0))
    }

    pub fn peek(&self) -> Value {
        self.stack.last().cloned().unwrap_or(Value::Int(0))
    }

    pub fn local(&self, slot: u16) -> Value {
        self.stack.get(self.fp() + slot as usize).cloned().unwrap_or(Value::Int(0))
    }

    pub fn set_local(&mut self, slot: u16, value: Value) {
        let idx = self.fp() + slot as usize;
        if idx >= self.stack.len() {
            self.stack.resize(idx + 1, Value::Int(0));
        }
        self.stack[idx] = value;
    }

    pub fn global(&self, slot: u32) -> Value {
        self.object.borrow().variables.get(slot as usize).cloned().unwrap_or(Value::Int(0))
    }

    /// Like [`Self::local`], but applies the destructed-object read barrier
    /// ([`crate::value::resolve`]) and writes the result back through the slot, so a second read
    /// of the same local observes `0u` directly rather than re-deciding it on every access (§3.1,
    /// §8 "the slot is overwritten to `0u` on the next read").
    pub fn resolve_local(&mut self, slot: u16) -> Value {
        let idx = self.fp() + slot as usize;
        match self.stack.get_mut(idx) {
            Some(value) => crate::value::resolve(value),
            None => Value::Int(0),
        }
    }

    /// Like [`Self::global`], but applies the destructed-object read barrier and writes the
    /// result back through the object's variable slot.
    pub fn resolve_global(&mut self, slot: u32) -> Value {
        let mut object = self.object.borrow_mut();
        match object.variables.get_mut(slot as usize) {
            Some(value) => crate::value::resolve(value),
            None => Value::Int(0),
        }
    }

    pub fn set_global(&mut self, slot: u32, value: Value) {
        let mut obj = self.object.borrow_mut();
        if (slot as usize) >= obj.variables.len() {
            obj.variables.resize(slot as usize + 1, Value::Int(0));
        }
        obj.variables[slot as usize] = value;
    }

    pub fn push_control(&mut self, frame: ControlFrame) -> VmResult<()> {
        if self.control.len() >= self.control_stack_limit {
            self.uncatchable = true;
            return Err(VmHalt::ControlStackOverflow.into());
        }
        self.control.push(frame);
        Ok(())
    }

    pub fn use_eval_cost(&mut self, amount: i64) -> VmResult<()> {
        self.eval_cost -= amount;
        if self.eval_cost <= 0 {
            self.uncatchable = true;
            return Err(VmHalt::EvalCostExhausted.into());
        }
        Ok(())
    }

    /// Refills `eval_cost` and clears the sticky uncatchable flag, called by the driver before
    /// each externally initiated call (§4.2, §7).
    pub fn refill(&mut self, eval_cost: i64) {
        self.eval_cost = eval_cost;
        self.uncatchable = false;
    }

    pub fn current_program_path(&self) -> Rc<str> {
        Rc::from(self.program.path())
    }
}
