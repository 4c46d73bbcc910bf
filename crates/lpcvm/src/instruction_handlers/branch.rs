//! Unconditional/conditional branches, plus the `LOOP_COND_*`/`LOOP_INCR`/`WHILE_DEC` fused
//! loop opcodes (§4.2 "Branches"): since the compiler that would emit these is out of scope
//! (§1), their exact operand shape is this crate's own design choice rather than a literal port
//! — see `DESIGN.md`. `Jump`/`BranchIfZero`/`BranchIfNonZero` consume a popped condition and an
//! [`Operand::BranchTarget`]; the fused loop opcodes instead read and update a local slot
//! directly via [`Operand::Loop`], saving the compiled loop body a separate compare/increment
//! opcode.

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use super::compare;
use crate::error::{VmError, VmResult};
use crate::instruction::{BranchKind, Instruction, Op, Operand};
use crate::state::VmState;
use crate::value::Value;

fn kind_of(instr: &Instruction) -> BranchKind {
    match instr.op {
        Op::Branch(kind) => kind,
        _ => unreachable!("branch handler dispatched for non-Branch opcode"),
    }
}

fn target(instr: &Instruction) -> VmResult<u32> {
    match instr.operand {
        Operand::BranchTarget(t) => Ok(t),
        _ => Err(VmError::Custom("branch with no target operand".into()).into()),
    }
}

fn loop_slot_target(instr: &Instruction) -> VmResult<(u16, u32)> {
    match instr.operand {
        Operand::Loop { slot, target } => Ok((slot, target)),
        _ => Err(VmError::Custom("loop branch with no slot/target operand".into()).into()),
    }
}

pub(crate) fn branch<T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    instr: &Instruction,
) -> VmResult<()> {
    match kind_of(instr) {
        BranchKind::Jump => {
            let t = target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                state.pc = t;
                Ok(())
            })
        }
        BranchKind::BranchIfZero => {
            let t = target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                let cond = state.pop();
                if !cond.is_truthy() {
                    state.pc = t;
                }
                Ok(())
            })
        }
        BranchKind::BranchIfNonZero => {
            let t = target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                let cond = state.pop();
                if cond.is_truthy() {
                    state.pc = t;
                }
                Ok(())
            })
        }
        BranchKind::LoopCond(op) => {
            let (slot, t) = loop_slot_target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                let bound = state.pop();
                let current = state.local(slot);
                if compare::evaluate(op, &current, &bound)? {
                    state.pc = t;
                }
                Ok(())
            })
        }
        BranchKind::LoopIncr => {
            let (slot, t) = loop_slot_target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                let bound = state.pop();
                let bound = bound.as_int().ok_or(VmError::BadType { op: "for", expected: "int" })?;
                let current = state.local(slot).as_int().unwrap_or(0) + 1;
                state.set_local(slot, Value::Int(current));
                if current < bound {
                    state.pc = t;
                }
                Ok(())
            })
        }
        BranchKind::WhileDec => {
            let (slot, t) = loop_slot_target(instr)?;
            boilerplate::<opcodes::Branch, _>(state, tracer, |state| {
                let current = state.local(slot).as_int().unwrap_or(0) - 1;
                state.set_local(slot, Value::Int(current));
                if current > 0 {
                    state.pc = t;
                }
                Ok(())
            })
        }
    }
}
