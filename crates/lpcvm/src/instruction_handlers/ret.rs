//! `F_RETURN`/`F_RETURN_ZERO`/`F_POP` (§4.2): "pop locals and arguments, restore pc/fp/program,
//! push the return value (or 0). When the popped frame's `external` flag is set, the
//! interpreter returns to its caller."

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::callframe::{CallFrame, CallFrameKind, ControlFrame};
use crate::error::VmResult;
use crate::state::VmState;
use crate::value::Value;
use lpcvm_interface::ExecutionEnd;

/// Discards any `catch` frames installed inside the returning call (abandoning their
/// protection, since the frame they protect is going away) and returns the call frame beneath
/// them.
fn pop_call_frame(state: &mut VmState) -> VmResult<CallFrame> {
    loop {
        match state.control.pop() {
            Some(ControlFrame::Call(frame)) => return Ok(frame),
            Some(ControlFrame::Catch(_)) => continue,
            None => {
                return Err(crate::error::VmError::Custom(
                    "Return with no call frame on the control stack".into(),
                )
                .into())
            }
        }
    }
}

fn finish_return(state: &mut VmState, value: Value) -> VmResult<()> {
    let frame = pop_call_frame(state)?;
    state.stack.truncate(frame.fp);
    state.pc = frame.caller_pc;
    state.program = frame.caller_program;
    state.object = frame.caller_object;
    state.previous_object = frame.caller_previous_object;
    let is_external = frame.kind == CallFrameKind::External;
    state.push(value)?;
    if is_external {
        state.finished = Some(ExecutionEnd::Returned);
    }
    Ok(())
}

pub(crate) fn return_value<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::Return, _>(state, tracer, |state| {
        let value = state.pop();
        finish_return(state, value)
    })
}

pub(crate) fn return_zero<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::Return, _>(state, tracer, |state| finish_return(state, Value::Int(0)))
}

pub(crate) fn pop<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::Return, _>(state, tracer, |state| {
        state.pop();
        Ok(())
    })
}
