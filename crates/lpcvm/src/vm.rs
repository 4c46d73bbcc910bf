//! The interpreter run loop (§2, §4.2).
//!
//! `VirtualMachine::run` is `loop { dispatch one opcode until ExecutionEnd::Some(_) }`. LPC
//! opcodes are a closed, fixed set, so dispatch here is a plain `match` on [`Op`] — fetch at
//! `pc`, run, loop.

use lpcvm_interface::{ExecutionEnd, HaltReason, Tracer};

use crate::driver::Driver;
use crate::error::{Unwind, VmError, VmHalt, VmResult};
use crate::instruction::Op;
use crate::instruction_handlers::{
    aggregate, arith, assign, branch, call, catch, compare, foreach, indexing, literals, ret,
    varargs, vars,
};
use crate::object::ObjectRef;
use crate::program::Program;
use crate::settings::Settings;
use crate::state::VmState;

/// The LPC bytecode interpreter (§2 "System overview"): one evaluator/control stack pair and the
/// resource limits configured for it.
#[derive(Debug)]
pub struct VirtualMachine {
    pub(crate) state: VmState,
    pub(crate) settings: Settings,
}

impl VirtualMachine {
    /// Sets up a fresh outermost ("external", §4.1) execution of `program` on `object`; the
    /// caller is responsible for having pushed the entry function's arguments onto `state.stack`
    /// before the first call to [`Self::run`].
    pub fn new(program: Program, object: ObjectRef, settings: Settings) -> Self {
        let state = VmState::new(
            program,
            object,
            settings.max_eval_cost,
            settings.evaluator_stack_size,
            settings.max_call_depth,
        );
        Self { state, settings }
    }

    pub fn state(&self) -> &VmState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut VmState {
        &mut self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs until the outermost frame returns, a recoverable error propagates past every catch
    /// frame, or an uncatchable condition halts execution (§2, §5 "one tick").
    pub fn run<D: Driver, T: Tracer>(&mut self, driver: &mut D, tracer: &mut T) -> ExecutionEnd {
        loop {
            match self.step(driver, tracer) {
                Ok(()) => {
                    if let Some(end) = self.state.finished.take() {
                        return end;
                    }
                }
                Err(Unwind::Halt(halt)) => return ExecutionEnd::Halted(halt_reason(halt)),
                Err(Unwind::Error(err)) => {
                    if !catch::unwind(&mut self.state, err.to_string()) {
                        return ExecutionEnd::Unhandled(err.to_string());
                    }
                }
            }
        }
    }

    fn step<D: Driver, T: Tracer>(&mut self, driver: &mut D, tracer: &mut T) -> VmResult<()> {
        let instr = self
            .state
            .program
            .instructions()
            .get(self.state.pc as usize)
            .cloned()
            .ok_or_else(|| VmError::Custom("pc ran off the end of the program".into()))?;

        let settings = &self.settings;
        match instr.op {
            Op::PushLiteral => literals::push_literal(&mut self.state, tracer, &instr),
            Op::LocalVar => vars::local_var(&mut self.state, tracer, &instr),
            Op::GlobalVar => vars::global_var(&mut self.state, tracer, &instr),
            Op::Arith(_) => arith::arith(
                &mut self.state,
                tracer,
                &instr,
                settings.max_string_length,
                settings.max_array_size,
                settings.max_mapping_size,
            ),
            Op::Compare(_) => compare::compare(&mut self.state, tracer, &instr),
            Op::Index => indexing::index(&mut self.state, tracer, &instr, settings.max_mapping_size),
            Op::RIndex => indexing::rindex(&mut self.state, tracer, &instr, settings.max_mapping_size),
            Op::Range => indexing::range(&mut self.state, tracer, &instr),
            Op::Branch(_) => branch::branch(&mut self.state, tracer, &instr),
            Op::Aggregate => aggregate::aggregate(
                &mut self.state,
                tracer,
                &instr,
                settings.max_array_size,
                settings.max_mapping_size,
            ),
            Op::Foreach(_) => foreach::foreach(&mut self.state, tracer, &instr),
            Op::Call => call::call(&mut self.state, tracer, driver, &instr, settings.max_array_size),
            Op::Assign => assign::assign(&mut self.state, tracer, settings.max_mapping_size),
            Op::VoidAssign => assign::void_assign(&mut self.state, tracer, settings.max_mapping_size),
            Op::IncDec(_) => assign::inc_dec(&mut self.state, tracer, &instr, settings.max_mapping_size),
            Op::Catch => catch::catch_begin(&mut self.state, tracer, &instr),
            Op::EndCatch => catch::end_catch(&mut self.state, tracer),
            Op::ExpandVarargs => varargs::expand_varargs(&mut self.state, tracer, &instr),
            Op::Return => ret::return_value(&mut self.state, tracer),
            Op::ReturnZero => ret::return_zero(&mut self.state, tracer),
            Op::Pop => ret::pop(&mut self.state, tracer),
        }
    }
}

fn halt_reason(halt: VmHalt) -> HaltReason {
    match halt {
        VmHalt::EvaluatorStackOverflow => HaltReason::EvaluatorStackOverflow,
        VmHalt::ControlStackOverflow => HaltReason::ControlStackOverflow,
        VmHalt::EvalCostExhausted => HaltReason::EvalCostExhausted,
    }
}
