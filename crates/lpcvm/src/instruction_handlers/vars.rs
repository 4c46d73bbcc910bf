//! `F_LOCAL`/`F_GLOBAL` and their lvalue-producing counterparts (§4.2).

use std::cell::RefCell;
use std::rc::Rc;

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use super::indexing::Lvalue;
use crate::error::{VmError, VmResult};
use crate::instruction::{Instruction, Operand, SlotKind};
use crate::state::VmState;
use crate::value::Value;

fn slot(instr: &Instruction) -> VmResult<u16> {
    match instr.operand {
        Operand::Slot(s) => Ok(s),
        _ => Err(VmError::Custom("variable opcode with no slot operand".into()).into()),
    }
}

pub(crate) fn local_var<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let idx = slot(instr)?;
    boilerplate::<opcodes::LocalVar, _>(state, tracer, |state| {
        let value = match instr.slot_kind {
            SlotKind::Value => state.resolve_local(idx),
            SlotKind::Lvalue => Value::Lvalue(Rc::new(RefCell::new(Lvalue::Local(idx)))),
        };
        state.push(value)
    })
}

pub(crate) fn global_var<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    let idx = slot(instr)? as u32;
    boilerplate::<opcodes::GlobalVar, _>(state, tracer, |state| {
        let value = match instr.slot_kind {
            SlotKind::Value => state.resolve_global(idx),
            SlotKind::Lvalue => Value::Lvalue(Rc::new(RefCell::new(Lvalue::Global(idx)))),
        };
        state.push(value)
    })
}
