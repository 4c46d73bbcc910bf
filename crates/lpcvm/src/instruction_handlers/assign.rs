//! `F_ASSIGN`/`F_VOID_ASSIGN` and `F_PRE_INC`/`F_PRE_DEC`/`F_POST_INC`/`F_POST_DEC` (§4.2).
//!
//! Both consume an lvalue cursor ([`super::indexing::Lvalue`]) produced by a variable-access or
//! indexing opcode run in lvalue position.

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use super::indexing::{read_lvalue, write_lvalue, Lvalue};
use crate::error::{VmError, VmResult};
use crate::instruction::{IncDecKind, Instruction, Op};
use crate::state::VmState;
use crate::value::Value;

fn take_lvalue(v: Value) -> VmResult<std::rc::Rc<std::cell::RefCell<Lvalue>>> {
    match v {
        Value::Lvalue(l) => Ok(l),
        _ => Err(VmError::Custom("expected an lvalue on the evaluator stack".into()).into()),
    }
}

pub(crate) fn assign<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    max_mapping_size: usize,
) -> VmResult<()> {
    boilerplate::<opcodes::Assign, _>(state, tracer, |state| {
        let value = state.pop();
        let lvalue = take_lvalue(state.pop())?;
        write_lvalue(&lvalue.borrow(), state, value.clone(), max_mapping_size)?;
        state.push(value)
    })
}

pub(crate) fn void_assign<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    max_mapping_size: usize,
) -> VmResult<()> {
    boilerplate::<opcodes::Assign, _>(state, tracer, |state| {
        let value = state.pop();
        let lvalue = take_lvalue(state.pop())?;
        write_lvalue(&lvalue.borrow(), state, value, max_mapping_size)
    })
}

pub(crate) fn inc_dec<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
    max_mapping_size: usize,
) -> VmResult<()> {
    let kind = match instr.op {
        Op::IncDec(k) => k,
        _ => unreachable!("inc_dec handler dispatched for non-IncDec opcode"),
    };
    boilerplate::<opcodes::IncDec, _>(state, tracer, |state| {
        let lvalue = take_lvalue(state.pop())?;
        let old = read_lvalue(&lvalue.borrow(), state);
        let delta = match kind {
            IncDecKind::PreIncrement | IncDecKind::PostIncrement => 1,
            IncDecKind::PreDecrement | IncDecKind::PostDecrement => -1,
        };
        let new = match old {
            Value::Real(r) => Value::Real(r + delta as f64),
            _ => {
                let old_i = old.as_int().ok_or(VmError::BadType { op: "++/--", expected: "int" })?;
                Value::Int(old_i + delta)
            }
        };
        write_lvalue(&lvalue.borrow(), state, new.clone(), max_mapping_size)?;
        let result = match kind {
            IncDecKind::PreIncrement | IncDecKind::PreDecrement => new,
            IncDecKind::PostIncrement | IncDecKind::PostDecrement => old,
        };
        state.push(result)
    })
}
