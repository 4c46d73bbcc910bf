//! Object creation, resets, destruction, and the host-initiated call entry points `apply`/
//! `call_function_pointer` (§3.4, §4.5, §6.2).
//!
//! `apply`/`call_function_pointer` are "outermost tick" entry points: each builds a fresh
//! [`VirtualMachine`], pushes one [`CallFrameKind::External`] frame, and runs it to completion —
//! distinct from a bytecode-level call (`F_CALL_FUNCTION_BY_ADDRESS` and friends, handled by
//! [`crate::instruction_handlers::call`]), which pushes a frame into an *already-running*
//! interpreter loop. [`call_function_pointer`] additionally pushes a [`CallFrameKind::Fake`]
//! marker ahead of the real callee frame via [`crate::dispatch::setup_fake_frame`], so that trace
//! output attributes the call to the function pointer's owner (§4.2) even though the callee's own
//! frame does the work.

use std::cell::RefCell;
use std::rc::Rc;

use lpcvm_interface::{CallframeInterface, ExecutionEnd, GlobalStateInterface, HaltReason, Tracer};
use rand::Rng;
use tracing::{debug, error, warn};

use crate::array::LpcArray;
use crate::callframe::{CallFrameKind, ControlFrame};
use crate::dispatch::{setup_fake_frame, setup_new_frame};
use crate::driver::Driver;
use crate::error::{VmError, VmResult};
use crate::function_pointer::{FunctionPointer, FunctionPointerKind};
use crate::mapping::LpcMapping;
use crate::object::{ObjectData, ObjectFlags, ObjectRef, ObjectTable};
use crate::program::{DispatchEntry, FunctionFlags, Program};
use crate::sentence::{Sentence, SentenceCallback, SentenceFlags};
use crate::settings::Settings;
use crate::state::VmState;
use crate::value::{LpcString, Value};
use crate::vm::VirtualMachine;

fn halt_to_error(halt: HaltReason) -> VmError {
    let message = match halt {
        HaltReason::EvaluatorStackOverflow => "evaluator stack overflow",
        HaltReason::ControlStackOverflow => "control stack overflow (too deep recursion)",
        HaltReason::EvalCostExhausted => "eval cost exhausted",
    };
    VmError::Custom(message.to_string())
}

/// `apply(name, object, nargs, origin)` (§6.2): resolves `name` against `object`'s flattened
/// dispatch table, pushes one external frame, and runs to completion. Returns `Value::Undefined`
/// (rather than an error) if `name` isn't defined or is only a prototype — applies are expected
/// to silently no-op when the target doesn't implement the hook (`create`/`reset`/`init` are all
/// optional).
pub fn apply<D: Driver, T: Tracer>(
    object: &ObjectRef,
    name: &str,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    if object.borrow().destructed {
        return Err(VmError::DestructedObject.into());
    }
    let program = object.borrow().program.clone();
    let Some((index, entry)) = program.find_function(name) else {
        return Ok(Value::Undefined);
    };
    if entry.flags.contains(FunctionFlags::UNDEFINED) {
        return Ok(Value::Undefined);
    }
    let entry = entry.clone();
    run_external(program, object.clone(), index, &entry, args, driver, tracer, settings)
}

/// `apply_master_ob(name, nargs)` (§6.2).
pub fn apply_master_ob<D: Driver, T: Tracer>(
    name: &str,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    let master = driver
        .master_object()
        .ok_or_else(|| VmError::Custom("no master object configured".into()))?;
    apply(&master, name, args, driver, tracer, settings)
}

/// `safe_apply(...)` (§6.2): same as [`apply`], but a recoverable error is swallowed and reported
/// as `Value::Undefined` rather than propagated — the way the driver shields `reset`/`catch`
/// handler applies from taking down the caller.
pub fn safe_apply<D: Driver, T: Tracer>(
    object: &ObjectRef,
    name: &str,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> Value {
    apply(object, name, args, driver, tracer, settings).unwrap_or(Value::Undefined)
}

/// `call_function_pointer(funp, nargs)` (§6.2).
pub fn call_function_pointer<D: Driver, T: Tracer>(
    funp: &FunctionPointer,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    if !funp.is_callable() {
        return Err(VmError::DestructedObject.into());
    }
    let mut full_args = funp.bound_args.as_ref().clone();
    full_args.extend(args);

    match &funp.kind {
        FunctionPointerKind::Efun { efun_index } => {
            let mut scratch = crate::state::VmState::new(
                Program::empty("<efun>"),
                funp.owner.clone(),
                settings.max_eval_cost,
                settings.evaluator_stack_size,
                settings.max_call_depth,
            );
            driver.call_efun(*efun_index, full_args, &funp.owner, &mut scratch)
        }
        FunctionPointerKind::LocalLfun { runtime_index } => {
            let program = funp.owner.borrow().program.clone();
            let entry = program
                .function_at(*runtime_index)
                .ok_or_else(|| VmError::UndefinedFunction(format!("#{runtime_index}")))?
                .clone();
            run_external_with_origin(
                program,
                funp.owner.clone(),
                *runtime_index,
                &entry,
                full_args,
                driver,
                tracer,
                settings,
            )
        }
        FunctionPointerKind::SimulEfun { simul_index } => {
            let simul_object = driver
                .simul_efun_object()
                .ok_or_else(|| VmError::UndefinedFunction("no simul_efun object configured".into()))?;
            let program = simul_object.borrow().program.clone();
            let entry = program
                .function_at(*simul_index)
                .ok_or_else(|| VmError::UndefinedFunction(format!("simul_efun #{simul_index}")))?
                .clone();
            run_external_with_origin(
                program,
                simul_object,
                *simul_index,
                &entry,
                full_args,
                driver,
                tracer,
                settings,
            )
        }
        FunctionPointerKind::Functional {
            program,
            entry_offset,
            num_arg,
            num_local,
            function_index_offset: _,
            variable_index_offset,
        } => {
            let entry = DispatchEntry::synthetic(
                program.clone(),
                *entry_offset,
                *num_arg,
                *num_local,
                *variable_index_offset,
            );
            run_external_with_origin(
                program.clone(),
                funp.owner.clone(),
                u32::MAX,
                &entry,
                full_args,
                driver,
                tracer,
                settings,
            )
        }
    }
}

/// `safe_call_function_pointer(...)` (§6.2).
pub fn safe_call_function_pointer<D: Driver, T: Tracer>(
    funp: &FunctionPointer,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> Value {
    call_function_pointer(funp, args, driver, tracer, settings).unwrap_or(Value::Undefined)
}

#[allow(clippy::too_many_arguments)]
fn run_external<D: Driver, T: Tracer>(
    program: Program,
    object: ObjectRef,
    function_index: u32,
    entry: &DispatchEntry,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    let mut vm = VirtualMachine::new(program, object.clone(), *settings);
    let frame = setup_new_frame(
        vm.state_mut(),
        CallFrameKind::External,
        object,
        None,
        function_index,
        entry,
        args,
        settings.max_array_size,
    )?;
    vm.state_mut().push_control(ControlFrame::Call(frame))?;
    finish(vm, driver, tracer, settings)
}

/// Same as [`run_external`] but attributes the call to the function pointer's owner via a
/// [`CallFrameKind::Fake`] marker frame underneath the real callee frame (§4.2).
#[allow(clippy::too_many_arguments)]
fn run_external_with_origin<D: Driver, T: Tracer>(
    program: Program,
    object: ObjectRef,
    function_index: u32,
    entry: &DispatchEntry,
    args: Vec<Value>,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    let mut vm = VirtualMachine::new(program, object.clone(), *settings);
    let fake = setup_fake_frame(vm.state_mut(), object.clone());
    vm.state_mut().push_control(ControlFrame::Call(fake))?;
    let frame = setup_new_frame(
        vm.state_mut(),
        CallFrameKind::External,
        object,
        None,
        function_index,
        entry,
        args,
        settings.max_array_size,
    )?;
    vm.state_mut().push_control(ControlFrame::Call(frame))?;
    finish(vm, driver, tracer, settings)
}

fn finish<D: Driver, T: Tracer>(
    mut vm: VirtualMachine,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<Value> {
    match vm.run(driver, tracer) {
        ExecutionEnd::Returned => Ok(vm.state_mut().pop()),
        ExecutionEnd::Halted(halt) => Err(halt_to_error(halt).into()),
        ExecutionEnd::Unhandled(message) => {
            dispatch_error_handler(vm.state_mut(), &message, driver, tracer, settings);
            Err(VmError::Custom(message).into())
        }
    }
}

fn string_value(s: &str) -> Value {
    Value::String(LpcString::Owned(Rc::new(RefCell::new(s.to_string()))))
}

fn shared_key(s: &str) -> Value {
    Value::String(LpcString::Shared(Rc::from(s)))
}

/// Builds the `{error, program, object, trace, file, line}` mapping §4.6 passes to
/// `error_handler`. There is no separate line-number table in this implementation, so `line`
/// reuses the program counter at the point of failure.
fn build_error_report(state: &mut VmState, error_message: &str) -> Value {
    let object_name = state.object.borrow().name.clone();
    let program_name = state.program.path().to_string();
    let pc = state.pc;

    let depth = state.number_of_callframes();
    let mut trace_items = Vec::with_capacity(depth);
    for d in 0..depth {
        let frame = state.callframe(d);
        trace_items.push(string_value(&format!(
            "{}::{} #{} pc={}",
            frame.object_name(),
            frame.program_name(),
            frame.function_index(),
            frame.program_counter(),
        )));
    }

    let mut mapping = LpcMapping::new();
    let entries = [
        ("error", string_value(error_message)),
        ("program", string_value(&program_name)),
        ("object", string_value(&object_name)),
        ("trace", Value::Array(Rc::new(RefCell::new(LpcArray::new(trace_items))))),
        ("file", string_value(&program_name)),
        ("line", Value::Int(pc as i64)),
    ];
    for (key, value) in entries {
        let _ = mapping.insert(shared_key(key), value, usize::MAX);
    }
    Value::Mapping(Rc::new(RefCell::new(mapping)))
}

/// Invokes the master object's `error_handler` on an uncaught error (§4.6). If no master object
/// is configured, or `error_handler` is absent or returns a falsy value ("declines"), logs the
/// error and dumps the call trace instead.
fn dispatch_error_handler<D: Driver, T: Tracer>(
    state: &mut VmState,
    error_message: &str,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) {
    let report = build_error_report(state, error_message);
    let handled = match driver.master_object() {
        Some(master) => safe_apply(&master, "error_handler", vec![report], driver, tracer, settings).is_truthy(),
        None => false,
    };
    if !handled {
        error!(
            object = %state.object.borrow().name,
            program = %state.program.path(),
            pc = state.pc,
            error = %error_message,
            "uncaught error with no error_handler to absorb it"
        );
    }
}

/// Loads a fresh object for `program`, inserts it into `table`, runs `__INIT` (the
/// compiler-generated global initializer, if the program defines one), then calls `create`
/// exactly once (§3.4).
pub fn load_object<D: Driver, T: Tracer>(
    name: String,
    program: Program,
    table: &mut ObjectTable,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> VmResult<ObjectRef> {
    let num_variables = program.total_variable_count() as usize;
    let object = Rc::new(RefCell::new(ObjectData::new(name, program, num_variables)));
    table.insert(object.clone());
    apply(&object, "__INIT", Vec::new(), driver, tracer, settings)?;
    apply(&object, "create", Vec::new(), driver, tracer, settings)?;
    schedule_reset(&object, settings, 0);
    Ok(object)
}

/// Schedules the next reset to a random point in `[now + T/2, now + T]` for configured `T`
/// (`Settings::time_to_reset`, §3.4).
pub fn schedule_reset(object: &ObjectRef, settings: &Settings, now: u64) {
    let half = u64::from(settings.time_to_reset) / 2;
    let jitter = rand::thread_rng().gen_range(0..=half.max(1));
    object.borrow_mut().reset_time = now + half + jitter;
}

/// Calls `reset` via apply if `now` has reached the object's scheduled reset time (§4.5).
/// Returns `true` if a reset fired. A reset that errors silently disables further resets for this
/// object (`reset_time` is pushed to "never") rather than propagating the error — matching "failure
/// silently disables resets for that object" (§3.4).
pub fn reset_if_due<D: Driver, T: Tracer>(
    object: &ObjectRef,
    now: u64,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> bool {
    if now < object.borrow().reset_time {
        return false;
    }
    match apply(object, "reset", Vec::new(), driver, tracer, settings) {
        Ok(_) => {
            debug!(object = %object.borrow().name, "reset fired");
            schedule_reset(object, settings, now);
            true
        }
        Err(err) => {
            warn!(object = %object.borrow().name, %err, "reset errored, disabling further resets");
            object.borrow_mut().reset_time = u64::MAX;
            false
        }
    }
}

/// Destructs `object` (§4.5): removes it from `table`'s name/living indices, severs its shadow
/// link, and drops its sentence chain. The allocation itself survives until every `Rc` to it
/// drops; `crate::value::resolve` is what makes a live reference see `0` from this point on.
pub fn destruct_object(object: &ObjectRef, table: &mut ObjectTable) {
    let name = object.borrow().name.clone();
    debug!(object = %name, "destructing");
    table.remove(&name);
    let mut data = object.borrow_mut();
    data.destructed = true;
    data.flags.insert(ObjectFlags::DESTRUCTED);
    data.shadowed_by = None;
    data.sentences.clear();
}

/// `input_to(fun, flags, nargs, args)` (§6.2): installs a single-shot callback on `object`'s
/// sentence chain. Only one sentence may be pending at a time — "further calls before the line
/// arrives fail and return 0" (§4.5) — so this returns `false` if one is already installed.
pub fn input_to(
    object: &ObjectRef,
    callback: SentenceCallback,
    carryover: Vec<Value>,
    flags: SentenceFlags,
) -> bool {
    let mut data = object.borrow_mut();
    if !data.sentences.is_empty() {
        return false;
    }
    data.sentences.push(Sentence::new(callback, carryover, flags));
    true
}

/// Delivers one interactive line to `object`'s pending sentence, if any (the comm layer's
/// `call_function_interactive`, §6.1). Consumes the sentence; returns `None` if none was pending.
pub fn deliver_interactive_line<D: Driver, T: Tracer>(
    object: &ObjectRef,
    line: &str,
    driver: &mut D,
    tracer: &mut T,
    settings: &Settings,
) -> Option<VmResult<Value>> {
    let sentence = object.borrow_mut().sentences.pop()?;
    let args = sentence.call_args(Value::String(crate::value::LpcString::Owned(Rc::new(
        RefCell::new(line.to_string()),
    ))));
    Some(match sentence.callback {
        SentenceCallback::FunctionName(name) => apply(object, &name, args, driver, tracer, settings),
        SentenceCallback::FunctionPointer(funp) => {
            call_function_pointer(&funp, args, driver, tracer, settings)
        }
    })
}
