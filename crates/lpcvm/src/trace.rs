//! [`GlobalStateInterface`]/[`CallframeInterface`] implementations exposing [`VmState`] to
//! tracers, keeping the tracer-facing surface (`lpcvm_interface`) decoupled from `Value`'s
//! `Rc<RefCell<_>>` internals.

use lpcvm_interface::{CallframeInterface, GlobalStateInterface, TracedValue};

use crate::callframe::CallFrameKind;
use crate::state::VmState;
use crate::value::Value;

/// An owned, point-in-time view of one control-stack frame, built on demand for a tracer query
/// (cheap: a handful of small fields, no `Rc` cloning of heap payloads).
pub struct TraceFrame {
    object_name: String,
    program_name: String,
    function_index: u32,
    program_counter: u32,
    local_count: u16,
    is_catch: bool,
    is_fake: bool,
}

impl CallframeInterface for TraceFrame {
    fn object_name(&self) -> &str {
        &self.object_name
    }

    fn program_name(&self) -> &str {
        &self.program_name
    }

    fn function_index(&self) -> u32 {
        self.function_index
    }

    fn program_counter(&self) -> u32 {
        self.program_counter
    }

    fn local_count(&self) -> u16 {
        self.local_count
    }

    fn is_catch(&self) -> bool {
        self.is_catch
    }

    fn is_fake(&self) -> bool {
        self.is_fake
    }
}

fn to_traced(value: &Value) -> TracedValue {
    match value {
        Value::Int(i) => TracedValue::Int(*i),
        Value::Undefined => TracedValue::Undefined,
        Value::Real(r) => TracedValue::Real(*r),
        Value::String(s) => TracedValue::String(s.to_string()),
        Value::Array(rc) => {
            TracedValue::Array(heap_ref(std::rc::Rc::as_ptr(rc) as usize), rc.borrow().len())
        }
        Value::Class(rc) => {
            TracedValue::Class(heap_ref(std::rc::Rc::as_ptr(rc) as usize), rc.borrow().members.len())
        }
        Value::Mapping(rc) => {
            TracedValue::Mapping(heap_ref(std::rc::Rc::as_ptr(rc) as usize), rc.borrow().len())
        }
        Value::Buffer(rc) => {
            TracedValue::Buffer(heap_ref(std::rc::Rc::as_ptr(rc) as usize), rc.borrow().len())
        }
        Value::Object(rc) => TracedValue::Object(
            heap_ref(std::rc::Rc::as_ptr(rc) as usize),
            rc.borrow().name.clone(),
        ),
        Value::Function(_) => TracedValue::Function("function"),
        Value::Lvalue(_) => TracedValue::Function("lvalue"),
    }
}

fn heap_ref(addr: usize) -> lpcvm_interface::HeapRef {
    lpcvm_interface::HeapRef::from_raw(addr as u64)
}

impl GlobalStateInterface for VmState {
    fn number_of_callframes(&self) -> usize {
        self.control.iter().filter(|f| f.as_call().is_some()).count().max(1)
    }

    fn current_frame(&mut self) -> impl CallframeInterface + '_ {
        self.callframe(0)
    }

    fn callframe(&mut self, depth: usize) -> impl CallframeInterface + '_ {
        let call_frames: Vec<_> = self.control.iter().filter_map(|f| f.as_call()).collect();
        let len = call_frames.len();

        if depth == 0 {
            let (function_index, local_count) = call_frames
                .last()
                .map_or((0, 0), |f| (f.function_index, f.num_locals));
            TraceFrame {
                object_name: self.object.borrow().name.clone(),
                program_name: self.program.path().to_string(),
                function_index,
                program_counter: self.pc,
                local_count,
                is_catch: matches!(self.control.last(), Some(crate::callframe::ControlFrame::Catch(_))),
                is_fake: call_frames
                    .last()
                    .is_some_and(|f| f.kind == CallFrameKind::Fake),
            }
        } else if depth < len {
            let frame = call_frames[len - 1 - depth];
            TraceFrame {
                object_name: frame.caller_object.borrow().name.clone(),
                program_name: frame.caller_program.path().to_string(),
                function_index: frame.function_index,
                program_counter: frame.caller_pc,
                local_count: frame.num_locals,
                is_catch: false,
                is_fake: frame.kind == CallFrameKind::Fake,
            }
        } else {
            TraceFrame {
                object_name: self.object.borrow().name.clone(),
                program_name: self.program.path().to_string(),
                function_index: 0,
                program_counter: self.pc,
                local_count: 0,
                is_catch: false,
                is_fake: false,
            }
        }
    }

    fn evaluator_stack_depth(&self) -> usize {
        self.stack.len()
    }

    fn read_stack(&self, index_from_top: usize) -> TracedValue {
        self.stack
            .len()
            .checked_sub(index_from_top + 1)
            .and_then(|idx| self.stack.get(idx))
            .map_or(TracedValue::Undefined, to_traced)
    }

    fn read_local(&self, slot: u16) -> TracedValue {
        to_traced(&self.local(slot))
    }

    fn read_global(&self, slot: u16) -> TracedValue {
        to_traced(&self.global(slot as u32))
    }

    fn eval_cost_remaining(&self) -> i64 {
        self.eval_cost
    }

    fn catch_depth(&self) -> usize {
        self.control.iter().filter(|f| f.as_catch().is_some()).count()
    }
}
