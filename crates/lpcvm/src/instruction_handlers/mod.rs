//! One module per opcode group of §4.2, each built around the shared [`common::boilerplate`]
//! wrapper every opcode runs through. `crate::vm` dispatches `Instruction::op` straight into
//! these functions.

pub(crate) mod aggregate;
pub(crate) mod arith;
pub(crate) mod assign;
pub(crate) mod branch;
pub(crate) mod call;
pub(crate) mod catch;
pub(crate) mod common;
pub(crate) mod compare;
pub(crate) mod foreach;
pub mod indexing;
pub(crate) mod literals;
pub(crate) mod ret;
pub(crate) mod varargs;
pub(crate) mod vars;
