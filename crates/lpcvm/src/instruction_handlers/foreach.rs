//! `F_FOREACH`/`F_NEXT_FOREACH`/`F_EXIT_FOREACH` (§4.2, §9 redesign flag: "the foreach protocol
//! ... captures a snapshot of keys for mappings" to make iteration-during-mutation well-defined).
//!
//! `Setup` pops the container and pushes a cursor recording `(key, value)` pairs taken at that
//! instant; `Next` writes the current pair into the loop variable slot(s) and either branches
//! back into the loop body or falls through to `Exit`, which pops the cursor.

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::error::{VmError, VmResult};
use crate::instruction::{ForeachStage, Instruction, Op, Operand};
use crate::state::{ForeachCursor, VmState};
use crate::value::Value;
use std::rc::Rc;

fn stage_of(instr: &Instruction) -> ForeachStage {
    match instr.op {
        Op::Foreach(stage) => stage,
        _ => unreachable!("foreach handler dispatched for non-Foreach opcode"),
    }
}

pub(crate) fn foreach<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    match stage_of(instr) {
        ForeachStage::Setup => setup(state, tracer),
        ForeachStage::Next => next(state, tracer, instr),
        ForeachStage::Exit => exit(state, tracer),
    }
}

fn setup<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::Foreach, _>(state, tracer, |state| {
        let container = state.pop();
        let pairs = match container {
            Value::Array(rc) => rc
                .borrow()
                .items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::Int(i as i64), v.clone()))
                .collect(),
            Value::Mapping(rc) => {
                rc.borrow_mut().sweep_destructed_keys();
                rc.borrow().iter().cloned().collect()
            }
            Value::Undefined => Vec::new(),
            _ => {
                return Err(VmError::BadType { op: "foreach", expected: "array or mapping" }.into())
            }
        };
        state.foreach_stack.push(ForeachCursor { items: Rc::new(pairs), index: 0 });
        Ok(())
    })
}

fn next<T: Tracer>(state: &mut VmState, tracer: &mut T, instr: &Instruction) -> VmResult<()> {
    let (key_slot, value_slot, loop_target) = match instr.operand {
        Operand::Foreach { key_slot, value_slot, loop_target } => (key_slot, value_slot, loop_target),
        _ => return Err(VmError::Custom("Next foreach with no operand".into()).into()),
    };
    boilerplate::<opcodes::Foreach, _>(state, tracer, |state| {
        let Some(cursor) = state.foreach_stack.last_mut() else {
            return Err(VmError::Custom("foreach Next with no active loop".into()).into());
        };
        let Some((k, v)) = cursor.items.get(cursor.index).cloned() else {
            return Ok(());
        };
        cursor.index += 1;

        match value_slot {
            Some(value_slot) => {
                state.set_local(key_slot, k);
                state.set_local(value_slot, v);
            }
            None => state.set_local(key_slot, v),
        }
        state.pc = loop_target;
        Ok(())
    })
}

fn exit<T: Tracer>(state: &mut VmState, tracer: &mut T) -> VmResult<()> {
    boilerplate::<opcodes::Foreach, _>(state, tracer, |state| {
        state.foreach_stack.pop();
        Ok(())
    })
}
