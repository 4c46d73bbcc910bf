//! In-memory [`Driver`] implementation used by this crate's own tests (and available to
//! downstream crates under `cfg(test)`-style usage) — no path sandboxing, no real comm socket,
//! efuns dispatch through a small registry the test installs.

use std::collections::HashMap;

use crate::driver::{Driver, PathOp};
use crate::error::{VmError, VmResult};
use crate::object::ObjectRef;
use crate::state::VmState;
use crate::value::Value;

/// A native efun implementation registered with a [`TestDriver`].
pub type EfunImpl = fn(&mut TestDriver, Vec<Value>, &ObjectRef, &mut VmState) -> VmResult<Value>;

/// Everything a [`Driver`] needs, backed by plain in-memory collections rather than a real
/// master object / comm layer. Paths are accepted unsanitized except for a `..` traversal check,
/// since there is no filesystem root to sandbox against in a test.
#[derive(Default)]
pub struct TestDriver {
    pub master: Option<ObjectRef>,
    pub simul_efun: Option<ObjectRef>,
    efuns: HashMap<u32, EfunImpl>,
    /// `(object name, message)` pairs, in delivery order, as handed to `add_message`.
    pub messages: Vec<(String, String)>,
    pub flush_count: usize,
    /// Lines handed to `deliver_input` for objects the test never wired a pending sentence for.
    pub undelivered_input: Vec<(String, String)>,
}

impl std::fmt::Debug for TestDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestDriver")
            .field("efuns_registered", &self.efuns.len())
            .field("messages", &self.messages.len())
            .finish_non_exhaustive()
    }
}

impl TestDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_efun(&mut self, index: u32, implementation: EfunImpl) {
        self.efuns.insert(index, implementation);
    }
}

impl Driver for TestDriver {
    fn check_valid_path(
        &mut self,
        path: &str,
        _object: &ObjectRef,
        _op: PathOp,
        _write_flag: bool,
    ) -> Option<String> {
        if path.contains("..") {
            None
        } else {
            Some(path.trim_start_matches('/').to_string())
        }
    }

    fn master_object(&self) -> Option<ObjectRef> {
        self.master.clone()
    }

    fn simul_efun_object(&self) -> Option<ObjectRef> {
        self.simul_efun.clone()
    }

    fn call_efun(
        &mut self,
        efun_index: u32,
        args: Vec<Value>,
        caller: &ObjectRef,
        state: &mut VmState,
    ) -> VmResult<Value> {
        let implementation = *self
            .efuns
            .get(&efun_index)
            .ok_or_else(|| VmError::UndefinedFunction(format!("efun #{efun_index}")))?;
        implementation(self, args, caller, state)
    }

    fn add_message(&mut self, object: &ObjectRef, message: &str) {
        self.messages.push((object.borrow().name.clone(), message.to_string()));
    }

    fn flush_message(&mut self, _object: &ObjectRef) {
        self.flush_count += 1;
    }

    fn deliver_input(&mut self, object: &ObjectRef, line: &str) -> bool {
        self.undelivered_input.push((object.borrow().name.clone(), line.to_string()));
        false
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::instruction::{Instruction, Literal, Op, Operand};
    use crate::lifecycle;
    use crate::object::ObjectData;
    use crate::program::{FunctionDef, FunctionFlags, ProgramBuilder};
    use crate::settings::Settings;

    fn write_efun(
        driver: &mut TestDriver,
        args: Vec<Value>,
        caller: &ObjectRef,
        _state: &mut VmState,
    ) -> VmResult<Value> {
        let message = match args.first() {
            Some(Value::String(s)) => s.to_string(),
            _ => String::new(),
        };
        driver.add_message(caller, &message);
        Ok(Value::Int(0))
    }

    fn program_returning_42() -> crate::program::Program {
        ProgramBuilder::new("/answer")
            .instructions(vec![
                Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::Int(42))),
                Instruction::new(Op::Return),
            ])
            .function(FunctionDef {
                name: Rc::from("query"),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 0,
                num_local: 0,
            })
            .build()
    }

    #[test]
    fn apply_runs_a_function_to_completion_and_returns_its_value() {
        let program = program_returning_42();
        let object = Rc::new(RefCell::new(ObjectData::new("/answer#1".into(), program, 0)));
        let mut driver = TestDriver::new();
        let settings = Settings::default();

        let result = lifecycle::apply(&object, "query", Vec::new(), &mut driver, &mut (), &settings)
            .expect("apply succeeds");
        assert_eq!(result, Value::Int(42));
    }

    #[test]
    fn apply_of_an_undefined_function_returns_undefined_rather_than_erroring() {
        let program = program_returning_42();
        let object = Rc::new(RefCell::new(ObjectData::new("/answer#1".into(), program, 0)));
        let mut driver = TestDriver::new();
        let settings = Settings::default();

        let result =
            lifecycle::apply(&object, "no_such_function", Vec::new(), &mut driver, &mut (), &settings)
                .expect("apply on a missing function does not error");
        assert_eq!(result, Value::Undefined);
    }

    #[test]
    fn efun_call_through_test_driver_is_attributed_to_the_caller() {
        let program = ProgramBuilder::new("/speaker")
            .instructions(vec![
                Instruction::with_operand(
                    Op::PushLiteral,
                    Operand::Literal(Literal::StringPoolIndex(0)),
                ),
                Instruction::with_operand(
                    Op::Call,
                    Operand::Call(crate::instruction::CallKind::Efun { efun_index: 0, num_args: 1 }),
                ),
                Instruction::new(Op::Return),
            ])
            .string_pool(vec![Rc::from("hello")])
            .function(FunctionDef {
                name: Rc::from("speak"),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 0,
                num_local: 0,
            })
            .build();
        let object = Rc::new(RefCell::new(ObjectData::new("/speaker#1".into(), program, 0)));
        let mut driver = TestDriver::new();
        driver.register_efun(0, write_efun);
        let settings = Settings::default();

        lifecycle::apply(&object, "speak", Vec::new(), &mut driver, &mut (), &settings)
            .expect("apply succeeds");
        assert_eq!(driver.messages, vec![("/speaker#1".to_string(), "hello".to_string())]);
    }

    #[test]
    fn uncaught_error_dispatches_to_the_master_objects_error_handler() {
        use crate::instruction::ArithOp;

        let master_program = ProgramBuilder::new("/master")
            .instructions(vec![
                Instruction::with_operand(
                    Op::PushLiteral,
                    Operand::Literal(Literal::StringPoolIndex(0)),
                ),
                Instruction::with_operand(
                    Op::Call,
                    Operand::Call(crate::instruction::CallKind::Efun { efun_index: 0, num_args: 1 }),
                ),
                Instruction::new(Op::Pop),
                Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::Int(1))),
                Instruction::new(Op::Return),
            ])
            .string_pool(vec![Rc::from("handled")])
            .function(FunctionDef {
                name: Rc::from("error_handler"),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 1,
                num_local: 0,
            })
            .build();
        let master = Rc::new(RefCell::new(ObjectData::new("/master#1".into(), master_program, 0)));

        let actor_program = ProgramBuilder::new("/actor")
            .instructions(vec![
                Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::Int(1))),
                Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::Int(0))),
                Instruction::new(Op::Arith(ArithOp::Divide)),
                Instruction::new(Op::Return),
            ])
            .function(FunctionDef {
                name: Rc::from("boom"),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 0,
                num_local: 0,
            })
            .build();
        let actor = Rc::new(RefCell::new(ObjectData::new("/actor#1".into(), actor_program, 0)));

        let mut driver = TestDriver::new();
        driver.master = Some(master);
        driver.register_efun(0, write_efun);
        let settings = Settings::default();

        let result = lifecycle::apply(&actor, "boom", Vec::new(), &mut driver, &mut (), &settings);
        assert!(result.is_err());
        assert_eq!(driver.messages, vec![("/master#1".to_string(), "handled".to_string())]);
    }

    #[test]
    fn destructing_an_object_removes_it_from_the_table_and_clears_sentences() {
        use crate::object::ObjectTable;
        use crate::sentence::{Sentence, SentenceCallback, SentenceFlags};

        let program = program_returning_42();
        let object = Rc::new(RefCell::new(ObjectData::new("/thing#1".into(), program, 0)));
        object.borrow_mut().sentences.push(Sentence::new(
            SentenceCallback::FunctionName("query".into()),
            Vec::new(),
            SentenceFlags::empty(),
        ));
        let mut table = ObjectTable::new();
        table.insert(object.clone());

        lifecycle::destruct_object(&object, &mut table);

        assert!(object.borrow().destructed);
        assert!(table.find("/thing#1").is_none());
        assert!(object.borrow().sentences.is_empty());
    }

    #[test]
    fn input_to_rejects_a_second_registration_while_one_is_pending() {
        use crate::sentence::{SentenceCallback, SentenceFlags};

        let program = program_returning_42();
        let object = Rc::new(RefCell::new(ObjectData::new("/thing#1".into(), program, 0)));

        assert!(lifecycle::input_to(
            &object,
            SentenceCallback::FunctionName("query".into()),
            Vec::new(),
            SentenceFlags::empty(),
        ));
        assert!(!lifecycle::input_to(
            &object,
            SentenceCallback::FunctionName("query".into()),
            Vec::new(),
            SentenceFlags::empty(),
        ));
    }
}
