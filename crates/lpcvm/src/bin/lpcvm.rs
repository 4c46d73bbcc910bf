//! Demo CLI: loads resource limits from an optional TOML file, hand-assembles a tiny object,
//! runs its `create`/`main` functions to completion, and prints the save-format dump of its
//! variables (§4.4, §6.4 "`CONFIG_INT`/`CONFIG_STR`").
//!
//! This is not a driver — there is no compiler here, so the "program" run is fixed. It exists to
//! exercise [`lifecycle::apply`] and [`save_restore::serialize_object`] end to end against a real
//! [`Driver`] implementation outside the test harness.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use lpcvm::testonly::TestDriver;
use lpcvm::{
    lifecycle, save_restore, CallKind, FunctionDef, FunctionFlags, Instruction, Literal, ObjectData,
    ObjectRef, Op, Operand, ProgramBuilder, Settings, Value, VmResult, VmState,
};

#[derive(Parser, Debug)]
#[command(name = "lpcvm", about = "Run a hand-assembled demo object to completion")]
struct Args {
    /// Path to a TOML file overriding the default resource limits (§6.4).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Object path to report in the save-format dump.
    #[arg(long, default_value = "/demo")]
    object_name: String,
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

fn write_efun(
    driver: &mut TestDriver,
    args: Vec<Value>,
    caller: &ObjectRef,
    _state: &mut VmState,
) -> VmResult<Value> {
    if let Some(Value::String(s)) = args.first() {
        s.with_str(|s| println!("{s}"));
        driver.add_message(caller, &s.to_string());
    }
    Ok(Value::Int(0))
}

/// Builds an object whose `create()` writes a greeting and stores `counter = 1` in a global.
fn demo_object(name: String) -> ObjectRef {
    let program = ProgramBuilder::new("/demo")
        .instructions(vec![
            // create(): write("booting"); counter = 1; return 0;
            Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::StringPoolIndex(0))),
            Instruction::with_operand(
                Op::Call,
                Operand::Call(CallKind::Efun { efun_index: 0, num_args: 1 }),
            ),
            Instruction::new(Op::Pop), // discard write()'s return value
            Instruction::lvalue(Op::GlobalVar, Operand::Slot(0)),
            Instruction::with_operand(Op::PushLiteral, Operand::Literal(Literal::Int(1))),
            Instruction::new(Op::VoidAssign),
            Instruction::new(Op::ReturnZero),
        ])
        .string_pool(vec![Rc::from("booting")])
        .variables(1, vec![Rc::from("counter")])
        .function(FunctionDef {
            name: Rc::from("create"),
            flags: FunctionFlags::PUBLIC,
            entry_offset: 0,
            num_arg: 0,
            num_local: 0,
        })
        .build();
    Rc::new(RefCell::new(ObjectData::new(name, program, 1)))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    let settings = load_settings(args.config.as_ref())?;

    let object = demo_object(args.object_name);
    let mut driver = TestDriver::new();
    driver.register_efun(0, write_efun);

    lifecycle::apply(&object, "create", Vec::new(), &mut driver, &mut (), &settings)
        .map_err(|err| anyhow::anyhow!("create() failed: {err}"))?;

    let dump = save_restore::serialize_object(&object.borrow(), settings.max_save_svalue_depth, true)
        .map_err(|err| anyhow::anyhow!("save failed: {err}"))?;
    print!("{dump}");
    Ok(())
}
