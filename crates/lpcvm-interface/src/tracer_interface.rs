use crate::GlobalStateInterface;

macro_rules! forall_simple_opcodes {
    ($m:ident) => {
        $m!(PushLiteral);
        $m!(LocalVar);
        $m!(GlobalVar);
        $m!(Arith);
        $m!(Compare);
        $m!(Index);
        $m!(RIndex);
        $m!(Range);
        $m!(Branch);
        $m!(Aggregate);
        $m!(Foreach);
        $m!(CallLocal);
        $m!(CallInherited);
        $m!(CallSimulEfun);
        $m!(CallEfun);
        $m!(Assign);
        $m!(IncDec);
        $m!(Catch);
        $m!(EndCatch);
        $m!(ExpandVarargs);
        $m!(Return);
    };
}

macro_rules! pub_struct {
    ($x:ident) => {
        #[doc = concat!("`", stringify!($x), "` opcode group.")]
        #[derive(Debug)]
        pub struct $x;
    };
}

/// LPC bytecode opcode groups, as types.
///
/// Each type here is a zero-sized marker used purely at the type level so that
/// [`Tracer::before_instruction`] / [`Tracer::after_instruction`] can be generic over the
/// opcode without paying for a runtime tag check in the hot dispatch loop; [`OpcodeType::VALUE`]
/// recovers the runtime [`Opcode`] when a tracer actually needs to branch on it.
pub mod opcodes {
    forall_simple_opcodes!(pub_struct);
}

/// All LPC opcode groups in a single runtime enumeration, for tracers that need to `match`.
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum Opcode {
    PushLiteral,
    LocalVar,
    GlobalVar,
    Arith,
    Compare,
    Index,
    RIndex,
    Range,
    Branch,
    Aggregate,
    Foreach,
    CallLocal,
    CallInherited,
    CallSimulEfun,
    CallEfun,
    Assign,
    IncDec,
    Catch,
    EndCatch,
    ExpandVarargs,
    Return,
}

/// Maps an opcode type to its runtime [`Opcode`] variant.
pub trait OpcodeType {
    /// `Opcode` variant corresponding to this opcode type.
    const VALUE: Opcode;
}

macro_rules! impl_opcode {
    ($x:ident) => {
        impl OpcodeType for opcodes::$x {
            const VALUE: Opcode = Opcode::$x;
        }
    };
}

forall_simple_opcodes!(impl_opcode);

/// LPC interpreter instruction tracer.
///
/// [`Self::before_instruction()`] runs just before an opcode's handler executes;
/// [`Self::after_instruction()`] runs once the handler has executed and the program counter has
/// advanced. Implement this to add profiling, instruction logging, or a debugger's
/// single-step/breakpoint support without touching the interpreter loop itself.
///
/// # Examples
///
/// ```
/// # use lpcvm_interface::{Tracer, GlobalStateInterface, OpcodeType, Opcode};
/// struct CallCounter(usize);
///
/// impl Tracer for CallCounter {
///     fn before_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, _state: &mut S) {
///         if let Opcode::CallLocal | Opcode::CallInherited | Opcode::CallEfun = OP::VALUE {
///             self.0 += 1;
///         }
///     }
/// }
/// ```
pub trait Tracer {
    /// Executes logic before an instruction handler.
    ///
    /// The default implementation does nothing.
    fn before_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, state: &mut S) {
        let _ = state;
    }

    /// Executes logic after an instruction handler.
    ///
    /// The default implementation does nothing.
    fn after_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, state: &mut S) {
        let _ = state;
    }
}

/// No-op tracer implementation, used when an embedder does not want tracing.
impl Tracer for () {}

/// Multiple tracers can be composed by building a linked list out of tuples.
impl<A: Tracer, B: Tracer> Tracer for (A, B) {
    fn before_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, state: &mut S) {
        self.0.before_instruction::<OP, S>(state);
        self.1.before_instruction::<OP, S>(state);
    }

    fn after_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, state: &mut S) {
        self.0.after_instruction::<OP, S>(state);
        self.1.after_instruction::<OP, S>(state);
    }
}

#[cfg(test)]
mod tests {
    use super::OpcodeType;
    use crate::{opcodes, state_interface::tests::DummyState, GlobalStateInterface, Tracer};

    struct CallCounter(usize);

    impl Tracer for CallCounter {
        fn before_instruction<OP: OpcodeType, S: GlobalStateInterface>(&mut self, _: &mut S) {
            if let super::Opcode::CallLocal = OP::VALUE {
                self.0 += 1;
            }
        }
    }

    #[test]
    fn counts_only_matching_opcode() {
        let mut tracer = CallCounter(0);

        tracer.before_instruction::<opcodes::PushLiteral, _>(&mut DummyState);
        assert_eq!(tracer.0, 0);

        tracer.before_instruction::<opcodes::CallLocal, _>(&mut DummyState);
        assert_eq!(tracer.0, 1);

        tracer.before_instruction::<opcodes::CallEfun, _>(&mut DummyState);
        assert_eq!(tracer.0, 1);
    }

    #[test]
    fn aggregate_tracer_calls_every_member() {
        let mut tracer = (CallCounter(0), (CallCounter(0), CallCounter(0)));

        tracer.before_instruction::<opcodes::CallLocal, _>(&mut DummyState);
        assert_eq!(tracer.0 .0, 1);
        assert_eq!(tracer.1 .0 .0, 1);
        assert_eq!(tracer.1 .1 .0, 1);
    }
}
