//! # lpcvm
//!
//! A bytecode interpreter for the LPC driver core: the tagged value model, the evaluator/control
//! stack machine, inheritance-flattened function dispatch, catch/throw, the textual save/restore
//! codec, and object lifecycle (§2 "System overview").
//!
//! The crate does not include a compiler — it consumes a [`Program`] built however the embedder
//! likes (by hand, as the tests here do, or from a real LPC compiler) and runs it. Everything the
//! embedder must supply — path sandboxing, efun dispatch, comm I/O — is the [`Driver`] trait.

pub use lpcvm_interface as interface;
pub use lpcvm_interface::{ExecutionEnd, HaltReason, Tracer};

pub use self::array::LpcArray;
pub use self::buffer::LpcBuffer;
pub use self::callframe::{CallFrame, CallFrameKind, CatchFrame, ControlFrame};
pub use self::class::ClassInstance;
pub use self::driver::{Driver, PathOp};
pub use self::error::{Unwind, VmError, VmHalt, VmResult};
pub use self::function_pointer::{FunctionPointer, FunctionPointerKind};
pub use self::instruction::{
    AggregateKind, ArithOp, BranchKind, CallKind, CompareOp, ForeachStage, IncDecKind, Instruction,
    Literal, Op, Operand, SlotKind,
};
pub use self::mapping::LpcMapping;
pub use self::object::{ObjectData, ObjectFlags, ObjectRef, ObjectTable};
pub use self::program::{ClassDef, DispatchEntry, FunctionDef, FunctionFlags, Inherit, Program, ProgramBuilder};
pub use self::sentence::{Sentence, SentenceCallback, SentenceFlags};
pub use self::settings::Settings;
pub use self::state::VmState;
pub use self::value::{LpcString, Value};
pub use self::vm::VirtualMachine;

mod array;
mod buffer;
mod callframe;
mod class;
mod dispatch;
mod driver;
mod error;
mod function_pointer;
mod instruction;
mod instruction_handlers;
pub mod lifecycle;
mod mapping;
mod object;
mod program;
pub mod save_restore;
mod sentence;
mod settings;
mod state;
pub mod testonly;
mod trace;
mod value;
mod vm;
