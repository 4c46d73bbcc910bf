//! Error taxonomy for the interpreter.
//!
//! Three tiers, matching §7/§4.8: recoverable [`VmError`]s unwind to the innermost `catch` (or
//! the outermost saved context); uncatchable [`VmHalt`]s are a distinct type so the unwinding
//! code cannot hand one to an inner `catch` by accident; genuine invariant violations use
//! `assert!`/`debug_assert!` and abort.

use thiserror::Error;

/// A recoverable runtime error: the kind `catch(...)` can intercept.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VmError {
    #[error("Bad argument {arg} to {efun}")]
    BadArgument { efun: &'static str, arg: usize },

    #[error("Index out of bounds: {index} not in 0..{size}")]
    IndexOutOfBounds { index: i64, size: usize },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Illegal modulus by zero")]
    ModulusByZero,

    #[error("Mapping too large")]
    MappingTooLarge,

    #[error("String too large")]
    StringTooLarge,

    #[error("Invalid save data: {0}")]
    InvalidSaveData(String),

    #[error("Undefined function: {0}")]
    UndefinedFunction(String),

    #[error("Called through a destructed object")]
    DestructedObject,

    #[error("Illegal NUL byte in char-lvalue assignment")]
    NulByteAssignment,

    #[error("Bad type for {op}: expected {expected}")]
    BadType { op: &'static str, expected: &'static str },

    #[error("{0}")]
    Thrown(String),

    #[error("{0}")]
    Custom(String),
}

/// An uncatchable condition. A `catch` frame sees this type unwind straight through it —
/// `VmHalt` never gets converted to a `VmError` mid-unwind.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmHalt {
    #[error("Evaluator stack overflow")]
    EvaluatorStackOverflow,
    #[error("Control stack overflow (too deep recursion)")]
    ControlStackOverflow,
    #[error("Eval cost exhausted")]
    EvalCostExhausted,
}

/// Either tier of error a running opcode handler can produce.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unwind {
    #[error(transparent)]
    Error(#[from] VmError),
    #[error(transparent)]
    Halt(#[from] VmHalt),
}

pub type VmResult<T> = Result<T, Unwind>;
