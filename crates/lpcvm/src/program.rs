//! Program image: immutable bytecode + function table + string pool + variable table + inherit
//! list (§3.2), plus the load-time flattening of inherited function tables described in §9
//! ("Inheritance-flattened function tables").
//!
//! `Program` is a cheap-to-clone `Rc`-backed handle — cloning a handle never copies the bytecode,
//! string pool, or dispatch table.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::instruction::Instruction;

bitflags::bitflags! {
    /// Function-flags bits keyed by runtime index (§4.2 "Call mechanics").
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FunctionFlags: u32 {
        const INHERITED     = 1 << 0;
        const UNDEFINED     = 1 << 1;
        const TRUE_VARARGS  = 1 << 2;
        const STATIC        = 1 << 3;
        const PRIVATE       = 1 << 4;
        const PROTECTED     = 1 << 5;
        const PUBLIC        = 1 << 6;
        const NO_MASK       = 1 << 7;
    }
}

/// A function defined directly in a program (not via inheritance).
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: Rc<str>,
    pub flags: FunctionFlags,
    pub entry_offset: u32,
    pub num_arg: u16,
    pub num_local: u16,
}

/// A class (struct) definition: just a name and fixed member count (§3.2).
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: Rc<str>,
    pub member_count: u32,
}

/// One entry of a program's `inherit` list.
#[derive(Debug, Clone)]
pub struct Inherit {
    pub program: Program,
    pub function_index_offset: u32,
    pub variable_index_offset: u32,
}

/// One entry of the flattened, load-time-precomputed dispatch table.
///
/// `defining_program`/`local_index` say where the actual code lives; `variable_index_offset`
/// says where that defining program's own globals land in *this* program's flattened variable
/// space, so a function inherited three levels deep still addresses its globals correctly
/// without a per-call inherit-table walk.
#[derive(Debug, Clone)]
pub struct DispatchEntry {
    pub name: Rc<str>,
    pub flags: FunctionFlags,
    defining_program: ProgramWeak,
    pub entry_offset: u32,
    pub num_arg: u16,
    pub num_local: u16,
    pub variable_index_offset: u32,
}

impl DispatchEntry {
    /// The program whose bytecode this entry's `entry_offset` indexes into.
    ///
    /// Held as a `Weak` (see [`Program::downgrade`]) so a program's own functions — whose
    /// `defining_program` is the program itself — do not create an unbreakable `Rc` cycle.
    /// Upgrading is infallible in practice: a `DispatchEntry` is only ever reached through a
    /// live `Program` that keeps the whole inherit chain (and itself) alive.
    pub fn defining_program(&self) -> Program {
        self.defining_program.upgrade()
    }

    /// Builds a one-off entry for a `function`/anonymous-function literal captured into a
    /// [`crate::function_pointer::FunctionPointer`] (§4.2): no flattened dispatch-table slot backs
    /// it, since the closure's frame-setup parameters are carried on the pointer itself rather
    /// than looked up by runtime index.
    pub(crate) fn synthetic(
        program: Program,
        entry_offset: u32,
        num_arg: u16,
        num_local: u16,
        variable_index_offset: u32,
    ) -> Self {
        DispatchEntry {
            name: Rc::from("<closure>"),
            flags: FunctionFlags::empty(),
            defining_program: program.downgrade(),
            entry_offset,
            num_arg,
            num_local,
            variable_index_offset,
        }
    }
}

/// A non-owning handle to a [`Program`], used for the self-referential and parent-referential
/// links inside a flattened dispatch table.
#[derive(Debug, Clone)]
struct ProgramWeak(Weak<ProgramImage>);

impl ProgramWeak {
    fn upgrade(&self) -> Program {
        Program(self.0.upgrade().expect(
            "DispatchEntry outlived its owning Program; dispatch tables are only reachable \
             through a live Program",
        ))
    }
}

struct ProgramImage {
    path: String,
    instructions: Vec<Instruction>,
    string_pool: Vec<Rc<str>>,
    own_functions: Vec<FunctionDef>,
    class_defs: Vec<ClassDef>,
    inherits: Vec<Inherit>,
    own_variable_count: u32,
    variable_names: Vec<Rc<str>>,

    // Computed by `flatten()` at construction time.
    dispatch: Vec<DispatchEntry>,
    name_to_index: std::collections::HashMap<Rc<str>, u32>,
    total_variable_count: u32,
}

impl fmt::Debug for ProgramImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramImage")
            .field("path", &self.path)
            .field("instructions.len", &self.instructions.len())
            .field("dispatch.len", &self.dispatch.len())
            .field("total_variable_count", &self.total_variable_count)
            .finish_non_exhaustive()
    }
}

/// Handle to an immutable, load-time-flattened program image. Cloning is `Rc::clone` — cheap.
#[derive(Debug, Clone)]
pub struct Program(Rc<ProgramImage>);

impl PartialEq for Program {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Program {
    /// An empty program with no functions and no variables, used for tests and as a
    /// placeholder before a real image is loaded.
    pub fn empty(path: impl Into<String>) -> Self {
        ProgramBuilder::new(path).build()
    }

    pub fn path(&self) -> &str {
        &self.0.path
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.0.instructions
    }

    pub fn string_pool(&self) -> &[Rc<str>] {
        &self.0.string_pool
    }

    pub fn class_defs(&self) -> &[ClassDef] {
        &self.0.class_defs
    }

    pub fn own_variable_count(&self) -> u32 {
        self.0.own_variable_count
    }

    pub fn total_variable_count(&self) -> u32 {
        self.0.total_variable_count
    }

    pub fn variable_names(&self) -> &[Rc<str>] {
        &self.0.variable_names
    }

    /// Flattened variable names in global-slot order: each inherit's own flattened names (in
    /// inherit order) followed by this program's own, matching how [`Self::total_variable_count`]
    /// accumulates offsets. Used by the save/restore codec (§4.4) to look a variable up by name
    /// "honoring inheritance" without the codec itself walking the inherit list.
    pub fn all_variable_names(&self) -> Vec<Rc<str>> {
        let mut names = Vec::with_capacity(self.0.total_variable_count as usize);
        for inherit in &self.0.inherits {
            names.extend(inherit.program.all_variable_names());
        }
        names.extend(self.0.variable_names.iter().cloned());
        names
    }

    pub fn inherits(&self) -> &[Inherit] {
        &self.0.inherits
    }

    /// Flattened dispatch table lookup by name — what `call_other`/`apply` use.
    pub fn find_function(&self, name: &str) -> Option<(u32, &DispatchEntry)> {
        let idx = *self.0.name_to_index.get(name)?;
        Some((idx, &self.0.dispatch[idx as usize]))
    }

    /// Flattened dispatch table lookup by runtime index — what `F_CALL_FUNCTION_BY_ADDRESS` uses.
    pub fn function_at(&self, index: u32) -> Option<&DispatchEntry> {
        self.0.dispatch.get(index as usize)
    }

    pub fn dispatch_table(&self) -> &[DispatchEntry] {
        &self.0.dispatch
    }

    fn downgrade(&self) -> ProgramWeak {
        ProgramWeak(Rc::downgrade(&self.0))
    }
}

/// Builds a [`Program`], computing the inheritance-flattened dispatch table once up front
/// (§9's re-architecture guidance), so no call site walks the inherit list at dispatch time.
pub struct ProgramBuilder {
    path: String,
    instructions: Vec<Instruction>,
    string_pool: Vec<Rc<str>>,
    own_functions: Vec<FunctionDef>,
    class_defs: Vec<ClassDef>,
    inherits: Vec<Inherit>,
    own_variable_count: u32,
    variable_names: Vec<Rc<str>>,
}

impl ProgramBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            instructions: Vec::new(),
            string_pool: Vec::new(),
            own_functions: Vec::new(),
            class_defs: Vec::new(),
            inherits: Vec::new(),
            own_variable_count: 0,
            variable_names: Vec::new(),
        }
    }

    pub fn instructions(mut self, instructions: Vec<Instruction>) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn string_pool(mut self, pool: Vec<Rc<str>>) -> Self {
        self.string_pool = pool;
        self
    }

    pub fn function(mut self, def: FunctionDef) -> Self {
        self.own_functions.push(def);
        self
    }

    pub fn class_def(mut self, def: ClassDef) -> Self {
        self.class_defs.push(def);
        self
    }

    pub fn variables(mut self, count: u32, names: Vec<Rc<str>>) -> Self {
        self.own_variable_count = count;
        self.variable_names = names;
        self
    }

    /// Adds an inherited program. Must be called before [`Self::build`]; inherit offsets are
    /// computed from the accumulated state of earlier inherits, mirroring `setup_new_frame`'s
    /// `function_index_offset`/`variable_index_offset` accumulation but done once, here.
    pub fn inherit(mut self, parent: Program) -> Self {
        let function_index_offset = self.flattened_len();
        let variable_index_offset = self.accumulated_variables();
        self.inherits.push(Inherit { program: parent, function_index_offset, variable_index_offset });
        self
    }

    fn flattened_len(&self) -> u32 {
        self.inherits
            .iter()
            .map(|i| i.program.dispatch_table().len() as u32)
            .sum()
    }

    fn accumulated_variables(&self) -> u32 {
        self.inherits.iter().map(|i| i.program.total_variable_count()).sum()
    }

    pub fn build(self) -> Program {
        let mut dispatch = Vec::new();
        let mut name_to_index = std::collections::HashMap::new();

        for inherit in &self.inherits {
            for entry in inherit.program.dispatch_table() {
                let mut flattened = entry.clone();
                flattened.variable_index_offset += inherit.variable_index_offset;
                let idx = dispatch.len() as u32;
                name_to_index.insert(flattened.name.clone(), idx);
                dispatch.push(flattened);
            }
        }

        let total_variable_count = self.accumulated_variables() + self.own_variable_count;
        let accumulated_variables = self.accumulated_variables();

        // `Rc::new_cyclic` lets own-function dispatch entries weak-reference the very `Program`
        // being built, instead of pointing at a throwaway stand-in or forming an `Rc` cycle.
        Program(Rc::new_cyclic(move |weak_self| {
            for def in &self.own_functions {
                let entry = DispatchEntry {
                    name: def.name.clone(),
                    flags: def.flags,
                    defining_program: ProgramWeak(weak_self.clone()),
                    entry_offset: def.entry_offset,
                    num_arg: def.num_arg,
                    num_local: def.num_local,
                    variable_index_offset: accumulated_variables,
                };
                // Own definitions override an inherited function of the same name in place,
                // preserving the runtime index existing call sites in this program use.
                if let Some(&existing) = name_to_index.get(&def.name) {
                    dispatch[existing as usize] = entry;
                } else {
                    let idx = dispatch.len() as u32;
                    name_to_index.insert(def.name.clone(), idx);
                    dispatch.push(entry);
                }
            }

            ProgramImage {
                path: self.path,
                instructions: self.instructions,
                string_pool: self.string_pool,
                own_functions: self.own_functions,
                class_defs: self.class_defs,
                inherits: self.inherits,
                own_variable_count: self.own_variable_count,
                variable_names: self.variable_names,
                dispatch,
                name_to_index,
                total_variable_count,
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::{Instruction, Op};

    fn leaf_program(name: &str, fn_name: &str) -> Program {
        ProgramBuilder::new(format!("/{name}"))
            .instructions(vec![Instruction::new(Op::ReturnZero)])
            .function(FunctionDef {
                name: Rc::from(fn_name),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 2,
                num_local: 0,
            })
            .build()
    }

    #[test]
    fn child_inherits_parent_function_by_name() {
        let parent = leaf_program("parent", "add");
        let child = ProgramBuilder::new("/child").inherit(parent).build();
        let (_, entry) = child.find_function("add").expect("inherited function visible");
        assert_eq!(&*entry.name, "add");
    }

    #[test]
    fn own_definition_overrides_inherited_one_of_the_same_name() {
        let parent = leaf_program("parent", "add");
        let child = ProgramBuilder::new("/child")
            .inherit(parent.clone())
            .instructions(vec![Instruction::new(Op::ReturnZero)])
            .function(FunctionDef {
                name: Rc::from("add"),
                flags: FunctionFlags::PUBLIC,
                entry_offset: 0,
                num_arg: 2,
                num_local: 0,
            })
            .build();
        let (_, entry) = child.find_function("add").unwrap();
        assert!(entry.defining_program() != parent);
        assert!(entry.defining_program() == child);
    }
}
