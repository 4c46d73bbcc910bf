//! The `Driver` trait (§6.1): everything the interpreter consumes from its embedder.
//!
//! A host-facing trait this small is usually a sign its runtime only needs to hand back code and
//! storage from its embedder. This one does more: it sandboxes paths through the master object,
//! runs native efuns, looks up the simul-efun program, and delivers output to interactive users.
//! `Driver` collects exactly the collaborator surface §6.1 names, kept as one trait rather than
//! split per concern.

use crate::error::VmResult;
use crate::object::ObjectRef;
use crate::state::VmState;
use crate::value::Value;

/// The operation a [`Driver::check_valid_path`] call is being asked to authorize, mirroring the
/// `op` argument `check_valid_path(path, object, op, write_flag)` takes in §6.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOp {
    Read,
    Write,
    Delete,
    Compile,
}

/// Everything the interpreter consumes from its embedder (§6.1).
///
/// A `Driver` implementation owns the object table, the simul-efun registry, and the comm layer;
/// the interpreter only ever reaches them through this trait.
pub trait Driver {
    /// Consults the master object's `APPLY_VALID_READ`/`APPLY_VALID_WRITE`/… and returns a
    /// sanitized path, or `None` to deny the operation (§6.1 `check_valid_path`).
    fn check_valid_path(
        &mut self,
        path: &str,
        object: &ObjectRef,
        op: PathOp,
        write_flag: bool,
    ) -> Option<String>;

    /// The master object, if one has been set up (§6.1). Absent only during early bootstrap.
    fn master_object(&self) -> Option<ObjectRef>;

    /// The object simul-efuns dispatch into, if a simul-efun registry has been configured
    /// (§6.1 "Simul-efun registry"). `F_SIMUL_EFUN` resolves `simul_index` against this object's
    /// own program.
    fn simul_efun_object(&self) -> Option<ObjectRef>;

    /// Runs one native efun by its registry index against already-popped arguments (§2 "Efuns
    /// are called from the loop as native operations"). `caller` is the object the call is
    /// attributed to; `state` gives the efun read/write access to VM state it needs (e.g.
    /// `command_giver`, the evaluator stack) without the interpreter having to special-case
    /// every efun that touches more than its own arguments.
    fn call_efun(
        &mut self,
        efun_index: u32,
        args: Vec<Value>,
        caller: &ObjectRef,
        state: &mut VmState,
    ) -> VmResult<Value>;

    /// Delivers output attributed to `object` to its interactive user, if any (§6.1
    /// `add_message`). A no-op for non-interactive objects.
    fn add_message(&mut self, object: &ObjectRef, message: &str);

    /// Flushes buffered output for `object`'s interactive user (§6.1 `flush_message`).
    fn flush_message(&mut self, object: &ObjectRef);

    /// Delivers one input line to `object`'s current sentence, if it has one (§6.1
    /// `call_function_interactive`). Returns `true` if a sentence consumed the line.
    fn deliver_input(&mut self, object: &ObjectRef, line: &str) -> bool;
}
