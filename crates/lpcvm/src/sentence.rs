//! Sentences: queued interactive-input callbacks attached to objects (§4.5, §6.2).

use crate::value::Value;

bitflags::bitflags! {
    /// Flags recognized by `input_to`/`get_char` (§6.2).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SentenceFlags: u32 {
        const NOECHO      = 1 << 0;
        const NOESC       = 1 << 1;
        const SINGLE_CHAR = 1 << 2;
        /// Internal: the callback is a function pointer rather than a function name string.
        const V_FUNCTION  = 1 << 3;
    }
}

/// The callback a sentence invokes once a line (or character) arrives.
#[derive(Debug, Clone)]
pub enum SentenceCallback {
    FunctionName(String),
    FunctionPointer(std::rc::Rc<crate::function_pointer::FunctionPointer>),
}

/// A single queued `input_to`/`get_char` registration.
///
/// The callback is invoked with `(input, *carryover)` — input first, then the arguments
/// captured at registration, in that order (§4.5, end-to-end scenario 4).
#[derive(Debug, Clone)]
pub struct Sentence {
    pub callback: SentenceCallback,
    pub carryover: Vec<Value>,
    pub flags: SentenceFlags,
}

impl Sentence {
    pub fn new(callback: SentenceCallback, carryover: Vec<Value>, flags: SentenceFlags) -> Self {
        Self { callback, carryover, flags }
    }

    /// Builds the full argument list a delivered line produces: input first, then carryover,
    /// matching the ordering invariant verified by end-to-end scenario 4.
    pub fn call_args(&self, input: Value) -> Vec<Value> {
        let mut args = Vec::with_capacity(self.carryover.len() + 1);
        args.push(input);
        args.extend(self.carryover.iter().cloned());
        args
    }
}
