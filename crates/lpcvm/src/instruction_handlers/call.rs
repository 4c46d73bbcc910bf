//! `F_CALL_FUNCTION_BY_ADDRESS`/`F_CALL_INHERITED`/`F_SIMUL_EFUN`/`F_EFUN0..F_EFUN3`/`F_EFUNV`
//! (§4.2 "Calls"). The first three push a new [`ControlFrame::Call`] and retarget `pc`/`program`
//! via [`crate::dispatch::setup_new_frame`]; efuns are native operations that run to completion
//! inside this opcode and push their own result (§2).

use lpcvm_interface::{opcodes, Tracer};

use super::common::boilerplate;
use crate::callframe::{CallFrameKind, ControlFrame};
use crate::dispatch::setup_new_frame;
use crate::driver::Driver;
use crate::error::{VmError, VmResult};
use crate::instruction::{CallKind, Instruction, Operand};
use crate::program::FunctionFlags;
use crate::state::VmState;
use crate::value::{resolve_owned, Value};

fn call_kind(instr: &Instruction) -> VmResult<CallKind> {
    match &instr.operand {
        Operand::Call(kind) => Ok(kind.clone()),
        _ => Err(VmError::Custom("Call with no call-kind operand".into()).into()),
    }
}

/// Pops exactly `num_args` already-pushed argument values, left-to-right.
fn pop_args(state: &mut VmState, num_args: u16) -> Vec<Value> {
    let start = state.stack.len().saturating_sub(num_args as usize);
    state.stack.split_off(start)
}

pub(crate) fn call<D: Driver, T: Tracer>(
    state: &mut VmState,
    tracer: &mut T,
    driver: &mut D,
    instr: &Instruction,
    max_array_size: usize,
) -> VmResult<()> {
    match call_kind(instr)? {
        CallKind::ByAddress { function_index, num_args } => {
            boilerplate::<opcodes::CallLocal, _>(state, tracer, |state| {
                by_address(state, function_index, num_args, max_array_size)
            })
        }
        CallKind::Inherited { inherit_index, function_index, num_args } => {
            boilerplate::<opcodes::CallInherited, _>(state, tracer, |state| {
                inherited(state, inherit_index, function_index, num_args, max_array_size)
            })
        }
        CallKind::SimulEfun { simul_index, num_args } => {
            boilerplate::<opcodes::CallSimulEfun, _>(state, tracer, |state| {
                simul_efun(state, driver, simul_index, num_args, max_array_size)
            })
        }
        CallKind::Efun { efun_index, num_args } => {
            boilerplate::<opcodes::CallEfun, _>(state, tracer, |state| {
                efun(state, driver, efun_index, num_args)
            })
        }
    }
}

fn by_address(
    state: &mut VmState,
    function_index: u32,
    num_args: u16,
    max_array_size: usize,
) -> VmResult<()> {
    let entry = state
        .program
        .function_at(function_index)
        .ok_or_else(|| VmError::UndefinedFunction(format!("#{function_index}")))?
        .clone();
    if entry.flags.contains(FunctionFlags::UNDEFINED) {
        return Err(VmError::UndefinedFunction(entry.name.to_string()).into());
    }
    let args = pop_args(state, num_args);
    let object = state.object.clone();
    let previous_object = state.previous_object.clone();
    let frame = setup_new_frame(
        state,
        CallFrameKind::Call,
        object,
        previous_object,
        function_index,
        &entry,
        args,
        max_array_size,
    )?;
    state.push_control(ControlFrame::Call(frame))
}

/// `::fun(...)`: resolves directly against one named inherit's own dispatch table rather than
/// the caller's flattened one, so a child that overrides `fun` can still reach the parent's
/// original definition (§4.2).
fn inherited(
    state: &mut VmState,
    inherit_index: u32,
    function_index: u32,
    num_args: u16,
    max_array_size: usize,
) -> VmResult<()> {
    let inherit = state
        .program
        .inherits()
        .get(inherit_index as usize)
        .ok_or_else(|| VmError::Custom("bad inherit index".into()))?
        .clone();
    let entry = inherit
        .program
        .function_at(function_index)
        .ok_or_else(|| VmError::UndefinedFunction(format!("#{function_index}")))?
        .clone();
    let runtime_index = inherit.function_index_offset + function_index;
    let args = pop_args(state, num_args);
    let object = state.object.clone();
    let previous_object = state.previous_object.clone();
    let frame = setup_new_frame(
        state,
        CallFrameKind::Call,
        object,
        previous_object,
        runtime_index,
        &entry,
        args,
        max_array_size,
    )?;
    state.push_control(ControlFrame::Call(frame))
}

fn simul_efun<D: Driver>(
    state: &mut VmState,
    driver: &mut D,
    simul_index: u32,
    num_args: u16,
    max_array_size: usize,
) -> VmResult<()> {
    let simul_object = driver
        .simul_efun_object()
        .ok_or_else(|| VmError::UndefinedFunction("no simul_efun object configured".into()))?;
    if simul_object.borrow().destructed {
        return Err(VmError::DestructedObject.into());
    }
    let program = simul_object.borrow().program.clone();
    let entry = program
        .function_at(simul_index)
        .ok_or_else(|| VmError::UndefinedFunction(format!("simul_efun #{simul_index}")))?
        .clone();
    let args = pop_args(state, num_args);
    let previous_object = Some(state.object.clone());
    let frame = setup_new_frame(
        state,
        CallFrameKind::Call,
        simul_object,
        previous_object,
        simul_index,
        &entry,
        args,
        max_array_size,
    )?;
    state.push_control(ControlFrame::Call(frame))
}

/// Efuns run to completion here rather than pushing a frame: they're native operations, not LPC
/// bytecode to dispatch into (§2).
fn efun<D: Driver>(state: &mut VmState, driver: &mut D, efun_index: u32, num_args: u16) -> VmResult<()> {
    let args = pop_args(state, num_args);
    let caller = state.object.clone();
    let result = driver.call_efun(efun_index, args, &caller, state)?;
    state.push(resolve_owned(result))
}
