//! # LPC VM Stable Interface
//!
//! This crate defines an interface for tracers that will never change but may be extended.
//! A tracer written against this interface keeps working against any `lpcvm` version built on
//! the same or a newer copy of it; there is no need to chase core-crate releases.
//!
//! A struct implementing [`Tracer`] may observe (and, through [`StateInterface`], read) the
//! VM's state around each opcode dispatch. This mirrors how embedders hook a MUD driver to add
//! profiling, command logging, or debugger breakpoints without reaching into interpreter
//! internals.
//!
//! ## Why the strict separation from `lpcvm`?
//!
//! Tracers are written once and should not need to track every internal refactor of the
//! interpreter loop. Keeping this crate's public API append-only (never change an existing
//! trait; add a new one and forward to the old one) means a tracer compiled against version 1
//! keeps compiling against version 5.

pub use self::{state_interface::*, tracer_interface::*};

mod state_interface;
mod tracer_interface;
