//! Callee frame construction (§4.2 "Call mechanics").
//!
//! `setup_new_frame` mirrors `setup_new_frame(index)`: given a resolved [`DispatchEntry`] and
//! the arguments already pushed by the caller, it reserves locals, packs excess arguments into a
//! trailing array under `TRUE_VARARGS`, pads missing arguments with `0u`, and returns the
//! [`CallFrame`] the callee should run under. `setup_fake_frame` is the function-pointer variant:
//! it attributes the call to the pointer's owner while the defining program's own code runs it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::array::LpcArray;
use crate::callframe::{CallFrame, CallFrameKind};
use crate::error::{VmError, VmResult};
use crate::object::ObjectRef;
use crate::program::{DispatchEntry, FunctionFlags};
use crate::state::VmState;
use crate::value::Value;

/// Packs `args` to `entry`'s declared arity: excess arguments collapse into a trailing array
/// when `TRUE_VARARGS` is set, and missing ones are padded with `Value::Undefined` (§4.2).
///
/// `TRUE_VARARGS` always materializes the last declared parameter as an array, even an empty
/// one, regardless of how many arguments the caller actually supplied.
fn pack_args(entry: &DispatchEntry, mut args: Vec<Value>, max_array_size: usize) -> VmResult<Vec<Value>> {
    let num_arg = entry.num_arg as usize;
    if entry.flags.contains(FunctionFlags::TRUE_VARARGS) && num_arg > 0 {
        let fixed = num_arg - 1;
        let trailing = if args.len() > fixed { args.split_off(fixed) } else { Vec::new() };
        while args.len() < fixed {
            args.push(Value::Undefined);
        }
        if trailing.len() > max_array_size {
            return Err(VmError::Custom("array too large".into()).into());
        }
        args.push(Value::Array(Rc::new(RefCell::new(LpcArray::new(trailing)))));
        return Ok(args);
    }
    while args.len() < num_arg {
        args.push(Value::Undefined);
    }
    args.truncate(num_arg);
    Ok(args)
}

/// Builds the callee's [`CallFrame`], leaving `state.program`/`state.pc` already retargeted at
/// the entry point so the run loop can dispatch the next opcode without special-casing a call.
pub(crate) fn setup_new_frame(
    state: &mut VmState,
    kind: CallFrameKind,
    object: ObjectRef,
    previous_object: Option<ObjectRef>,
    function_index: u32,
    entry: &DispatchEntry,
    args: Vec<Value>,
    max_array_size: usize,
) -> VmResult<CallFrame> {
    let caller_pc = state.pc;
    let caller_fp = state.fp();
    let caller_program = state.program.clone();
    let caller_object = state.object.clone();
    let caller_previous_object = state.previous_object.clone();

    let args = pack_args(entry, args, max_array_size)?;
    let fp = state.stack.len();
    for arg in args {
        state.push(arg)?;
    }
    for _ in 0..entry.num_local {
        state.push(Value::Int(0))?;
    }

    let program = entry.defining_program();
    state.program = program.clone();
    state.object = object.clone();
    state.previous_object = previous_object.clone();
    state.pc = entry.entry_offset;

    Ok(CallFrame {
        kind,
        program,
        object,
        previous_object,
        function_index,
        fp,
        num_args: entry.num_arg,
        num_locals: entry.num_local,
        function_index_offset: 0,
        variable_index_offset: entry.variable_index_offset,
        caller_pc,
        caller_fp,
        caller_program,
        caller_object,
        caller_previous_object,
    })
}

/// Inserts a marker frame so call-stack/origin reporting attributes a function-pointer call to
/// `owner`, even though `entry`'s own defining program is what actually runs (§4.2
/// `setup_fake_frame`). The fake frame carries no locals of its own; it exists purely as a
/// `CallFrameKind::Fake` breadcrumb between the real caller frame and the callee frame pushed
/// immediately afterward by [`setup_new_frame`].
pub(crate) fn setup_fake_frame(state: &mut VmState, owner: ObjectRef) -> CallFrame {
    CallFrame {
        kind: CallFrameKind::Fake,
        program: state.program.clone(),
        object: owner.clone(),
        previous_object: state.previous_object.clone(),
        function_index: u32::MAX,
        fp: state.stack.len(),
        num_args: 0,
        num_locals: 0,
        function_index_offset: 0,
        variable_index_offset: 0,
        caller_pc: state.pc,
        caller_fp: state.fp(),
        caller_program: state.program.clone(),
        caller_object: owner,
        caller_previous_object: state.previous_object.clone(),
    }
}
