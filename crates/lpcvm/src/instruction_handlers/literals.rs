//! `F_CONST0`/`F_CONST1`/`F_NUMBER`/`F_REAL`/`F_STRING` collapsed to one `PushLiteral` opcode
//! (§4.2 "Literal pushes").

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, Literal, Operand};
use crate::state::VmState;
use crate::value::{LpcString, Value};

pub(crate) fn push_literal<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let literal = match &instr.operand {
        Operand::Literal(l) => l,
        _ => return Err(VmError::Custom("PushLiteral with no literal operand".into()).into()),
    };
    let value = match literal {
        Literal::Int(i) => Value::Int(*i),
        Literal::Real(r) => Value::Real(*r),
        Literal::StringPoolIndex(idx) => {
            let pool = state.program.string_pool();
            let s = pool
                .get(*idx as usize)
                .cloned()
                .ok_or_else(|| VmError::Custom(format!("string pool index {idx} out of range")))?;
            Value::String(LpcString::Constant(s))
        }
    };
    boilerplate::<opcodes::PushLiteral, _>(state, tracer, |state| state.push(value))
}
