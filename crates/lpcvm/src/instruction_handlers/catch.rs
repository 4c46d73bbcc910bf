//! `F_CATCH`/`F_END_CATCH` (§4.6).
//!
//! `F_CATCH` installs a saved context; `F_END_CATCH` is reached either by falling off the end of
//! the protected body (no error — it pops its own still-present catch frame and zeroes
//! `catch_value`) or by [`unwind`] jumping straight to it after an error (the catch frame and
//! excess stack are already gone by then, so it only has to push the message that's waiting in
//! `catch_value`).

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::callframe::{CatchFrame, ControlFrame};
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, Operand};
use crate::state::VmState;
use crate::value::Value;

pub(crate) fn catch_begin<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let handler_offset = match instr.operand {
        Operand::CatchTarget(offset) => offset,
        _ => return Err(VmError::Custom("Catch with no handler target".into()).into()),
    };
    boilerplate::<opcodes::Catch, _>(state, tracer, |state| {
        state.push_control(ControlFrame::Catch(CatchFrame {
            handler_offset,
            saved_sp: state.stack.len(),
            saved_control_depth: state.control.len(),
            saved_command_giver: state.command_giver.clone(),
            program: state.program.clone(),
            object: state.object.clone(),
        }))
    })
}

pub(crate) fn end_catch<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::EndCatch, _>(state, tracer, |state| {
        if matches!(state.control.last(), Some(ControlFrame::Catch(_))) {
            state.control.pop();
            state.catch_value = Value::Int(0);
        }
        let result = std::mem::replace(&mut state.catch_value, Value::Int(0));
        state.push(result)
    })
}

/// Looks for the innermost catch frame and, if found, unwinds the control and evaluator stacks
/// to the saved depths, restores `command_giver`/`program`/`object`, stores `message` in
/// `catch_value`, and retargets `pc` at the handler (§4.6 `restore_context`). Returns `false`
/// (leaving state untouched) when no catch frame is active, signaling the caller should treat
/// the error as unhandled.
pub(crate) fn unwind(state: &mut VmState, message: String) -> bool {
    let Some(depth) = state.control.iter().rposition(|f| f.as_catch().is_some()) else {
        return false;
    };
    let catch = state.control[depth].as_catch().cloned_fields();

    state.control.truncate(catch.saved_control_depth);
    state.stack.truncate(catch.saved_sp);
    state.command_giver = catch.saved_command_giver;
    state.program = catch.program;
    state.object = catch.object;
    state.catch_value = Value::String(crate::value::LpcString::Owned(std::rc::Rc::new(
        std::cell::RefCell::new(message),
    )));
    state.pc = catch.handler_offset;
    true
}

/// Small helper so [`unwind`] doesn't need to keep a borrow of `state.control` alive across the
/// mutation that follows.
trait ClonedCatch {
    fn cloned_fields(self) -> CatchFrame;
}

impl ClonedCatch for Option<&CatchFrame> {
    fn cloned_fields(self) -> CatchFrame {
        self.expect("depth was just found via rposition").clone()
    }
}
