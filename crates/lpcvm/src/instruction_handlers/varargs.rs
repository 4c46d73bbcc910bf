//! `F_EXPAND_VARARGS` (§4.2): splices an already-pushed array argument in place into positional
//! slots, for a call site passing `...args`.

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, Operand};
use crate::state::VmState;
use crate::value::Value;

pub(crate) fn expand_varargs<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let stack_offset = match instr.operand {
        Operand::ExpandVarargs { stack_offset } => stack_offset as usize,
        _ => return Err(VmError::Custom("ExpandVarargs with no operand".into()).into()),
    };
    boilerplate::<opcodes::ExpandVarargs, _>(state, tracer, |state| {
        let idx = state
            .stack
            .len()
            .checked_sub(stack_offset + 1)
            .ok_or_else(|| VmError::Custom("ExpandVarargs: stack underflow".into()))?;
        let array = state.stack.remove(idx);
        let items = match array {
            Value::Array(rc) => rc.borrow().items.clone(),
            Value::Undefined => Vec::new(),
            _ => {
                return Err(VmError::BadType { op: "...", expected: "array" }.into());
            }
        };
        for (offset, item) in items.into_iter().enumerate() {
            state.stack.insert(idx + offset, item);
        }
        Ok(())
    })
}
