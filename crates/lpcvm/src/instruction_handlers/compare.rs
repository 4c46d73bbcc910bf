//! `F_EQ`/`F_NE`/`F_LT`/`F_LE`/`F_GT`/`F_GE` collapsed into one `Compare` opcode (§4.2).
//!
//! Equality uses [`Value`]'s own `PartialEq` (identity for heap types, structural for
//! arrays/mappings/classes/buffers/strings, §3.1). Ordering is numeric-only, matching the
//! source's restriction that `<`/`>`/`<=`/`>=` only accept int/float operands.

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::error::{VmError, VmResult};
use crate::instruction::{CompareOp, Instruction, Op};
use crate::state::VmState;
use crate::value::Value;

fn op_of(instr: &Instruction) -> CompareOp {
    match instr.op {
        Op::Compare(op) => op,
        _ => unreachable!("compare handler dispatched for non-Compare opcode"),
    }
}

pub(crate) fn compare<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let op = op_of(instr);
    boilerplate::<opcodes::Compare, _>(state, tracer, |state| {
        let b = state.pop();
        let a = state.pop();
        state.push(Value::Int(i64::from(evaluate(op, &a, &b)?)))
    })
}

/// Used directly (outside the `boilerplate` wrapper) by fused loop-branch opcodes that need the
/// boolean result without round-tripping it through the evaluator stack.
pub(crate) fn evaluate(op: CompareOp, a: &Value, b: &Value) -> VmResult<bool> {
    if let CompareOp::Eq | CompareOp::Ne = op {
        let eq = a == b;
        return Ok(if op == CompareOp::Eq { eq } else { !eq });
    }

    let af = a.as_real().ok_or(VmError::BadType { op: "comparison", expected: "int or float" })?;
    let bf = b.as_real().ok_or(VmError::BadType { op: "comparison", expected: "int or float" })?;
    Ok(match op {
        CompareOp::Lt => af < bf,
        CompareOp::Le => af <= bf,
        CompareOp::Gt => af > bf,
        CompareOp::Ge => af >= bf,
        CompareOp::Eq | CompareOp::Ne => unreachable!("handled above"),
    })
}
