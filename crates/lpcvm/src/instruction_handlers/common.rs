//! Per-opcode wrapper: cost accounting + tracer hooks + pc advance (§4.2 "Per-instruction cost").
//!
//! Every opcode runs through the same shape: charge `eval_cost`, let the tracer observe entry and
//! exit, advance `pc` past this opcode, then run the opcode's own logic (which can override `pc`
//! again for branches/calls/returns).

use lpcvm_interface::{OpcodeType, Tracer};

use crate::error::VmResult;
use crate::state::VmState;

/// Runs one opcode under `tracer`: charges one unit of `eval_cost`, notifies the tracer, then
/// advances `pc` past this opcode before running its own logic.
#[inline]
pub(crate) fn boilerplate<Opcode: OpcodeType, T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    business_logic: impl FnOnce(&mut VmState) -> VmResult<()>,
) -> VmResult<()> {
    state.use_eval_cost(1)?;
    tracer.before_instruction::<Opcode, _>(state);
    state.pc += 1;
    let result = business_logic(state);
    tracer.after_instruction::<Opcode, _>(state);
    result
}
