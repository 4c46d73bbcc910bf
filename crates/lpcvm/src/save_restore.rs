//! Textual save/restore codec (§4.4, §6.3).
//!
//! The format is line-oriented: a `#/program-path` header, then one `name rvalue` line per
//! variable, `name` resolved against [`crate::program::Program::all_variable_names`] so a
//! restore honors inheritance the same way a call does. [`serialize_object`]/[`deserialize_into`]
//! are pure text (de)serializers, independent of any filesystem; [`save_object`]/[`restore_object`]
//! wrap them with the path-sandbox check and the mandatory temp-then-rename write discipline.
//!
//! This crate has no model of a per-variable `static` flag (only functions carry one, via
//! `FunctionFlags::STATIC`; see `program.rs`) — since the compiler that would emit such a flag is
//! out of scope (§1), every variable is treated as savable. See `DESIGN.md`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::array::LpcArray;
use crate::class::ClassInstance;
use crate::driver::{Driver, PathOp};
use crate::error::{VmError, VmResult};
use crate::mapping::LpcMapping;
use crate::object::{ObjectData, ObjectRef};
use crate::value::{LpcString, Value};

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push('\r'),
            _ => out.push(c),
        }
    }
    out
}

fn write_value(out: &mut String, value: &Value, depth: usize, max_depth: usize) -> VmResult<()> {
    if depth > max_depth {
        return Err(VmError::Custom("save depth exceeded".into()).into());
    }
    match value {
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Undefined => out.push('0'),
        Value::Real(r) => out.push_str(&r.to_string()),
        Value::String(s) => {
            out.push('"');
            s.with_str(|s| out.push_str(&escape_string(s)));
            out.push('"');
        }
        Value::Array(a) => {
            out.push_str("({");
            for item in &a.borrow().items {
                write_value(out, item, depth + 1, max_depth)?;
                out.push(',');
            }
            out.push_str("})");
        }
        Value::Mapping(m) => {
            out.push_str("([");
            for (k, v) in m.borrow().iter() {
                write_value(out, k, depth + 1, max_depth)?;
                out.push(':');
                write_value(out, v, depth + 1, max_depth)?;
                out.push(',');
            }
            out.push_str("])");
        }
        Value::Class(c) => {
            out.push_str("(/");
            for member in &c.borrow().members {
                write_value(out, member, depth + 1, max_depth)?;
                out.push(',');
            }
            out.push_str("/)");
        }
        // Object/function/buffer/lvalue values are not representable in the save format (§4.4).
        Value::Object(_) | Value::Function(_) | Value::Buffer(_) | Value::Lvalue(_) => {
            out.push('0');
        }
    }
    Ok(())
}

/// Sweeps destructed-object keys out of every mapping reachable from `object`'s variables before
/// a save, per §4.3/§8 "destructed-object keys are collected lazily during iteration and save".
fn sweep_destructed_mapping_keys(object: &mut ObjectData) {
    for value in &object.variables {
        sweep_destructed_mapping_keys_in(value, 0, 64);
    }
}

fn sweep_destructed_mapping_keys_in(value: &Value, depth: usize, max_depth: usize) {
    if depth > max_depth {
        return;
    }
    match value {
        Value::Mapping(m) => {
            m.borrow_mut().sweep_destructed_keys();
            for (_, v) in m.borrow().iter() {
                sweep_destructed_mapping_keys_in(v, depth + 1, max_depth);
            }
        }
        Value::Array(a) => {
            for item in &a.borrow().items {
                sweep_destructed_mapping_keys_in(item, depth + 1, max_depth);
            }
        }
        Value::Class(c) => {
            for member in &c.borrow().members {
                sweep_destructed_mapping_keys_in(member, depth + 1, max_depth);
            }
        }
        _ => {}
    }
}

/// Serializes every variable of `object` to the textual save format, bounding nesting depth at
/// `max_depth` (`Settings::max_save_svalue_depth`). When `save_zeros` is false, a variable whose
/// rendered rvalue is the literal zero value (`0`) is omitted entirely, matching the original
/// codec's `save_zeros || new_str[0] != '0' || new_str[1] != 0` check.
pub fn serialize_object(object: &ObjectData, max_depth: usize, save_zeros: bool) -> VmResult<String> {
    let mut out = String::new();
    out.push('#');
    out.push_str(object.program.path());
    out.push('\n');
    let names = object.program.all_variable_names();
    for (name, value) in names.iter().zip(&object.variables) {
        let mut rendered = String::new();
        write_value(&mut rendered, value, 0, max_depth)?;
        if !save_zeros && rendered == "0" {
            continue;
        }
        out.push_str(name);
        out.push(' ');
        out.push_str(&rendered);
        out.push('\n');
    }
    Ok(out)
}

struct Parser<'a> {
    input: &'a str,
    max_mapping_size: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, max_mapping_size: usize) -> Self {
        Self { input, max_mapping_size }
    }

    fn peek(&self) -> Option<char> {
        self.input.chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let mut chars = self.input.chars();
        let c = chars.next()?;
        self.input = chars.as_str();
        Some(c)
    }

    fn skip_ws(&mut self) {
        self.input = self.input.trim_start();
    }

    fn expect(&mut self, s: &str) -> VmResult<()> {
        match self.input.strip_prefix(s) {
            Some(rest) => {
                self.input = rest;
                Ok(())
            }
            None => Err(VmError::InvalidSaveData(format!("expected `{s}`")).into()),
        }
    }

    fn parse_value(&mut self) -> VmResult<Value> {
        self.skip_ws();
        match self.peek() {
            Some('"') => self.parse_string(),
            Some('(') => self.parse_aggregate(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(VmError::InvalidSaveData("unexpected character in saved value".into()).into()),
        }
    }

    fn parse_string(&mut self) -> VmResult<Value> {
        self.bump();
        let mut raw = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('"') => raw.push('"'),
                    Some('\\') => raw.push('\\'),
                    Some(other) => {
                        raw.push('\\');
                        raw.push(other);
                    }
                    None => return Err(VmError::InvalidSaveData("unterminated string".into()).into()),
                },
                Some('\r') => raw.push('\n'),
                Some(c) => raw.push(c),
                None => return Err(VmError::InvalidSaveData("unterminated string".into()).into()),
            }
        }
        Ok(Value::String(LpcString::Owned(Rc::new(RefCell::new(raw)))))
    }

    fn parse_number(&mut self) -> VmResult<Value> {
        let start = self.input;
        let mut chars = self.input.chars().peekable();
        let mut len = 0;
        let mut is_real = false;
        if chars.peek() == Some(&'-') {
            chars.next();
            len += 1;
        }
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
            chars.next();
            len += 1;
        }
        if chars.peek() == Some(&'.') {
            is_real = true;
            chars.next();
            len += 1;
            while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
                chars.next();
                len += 1;
            }
        }
        if matches!(chars.peek(), Some('e') | Some('E')) {
            is_real = true;
            chars.next();
            len += 1;
            if matches!(chars.peek(), Some('+') | Some('-')) {
                chars.next();
                len += 1;
            }
            while matches!(chars.peek(), Some(c) if c.is_ascii_digit()) {
                chars.next();
                len += 1;
            }
        }
        let (text, rest) = start.split_at(len);
        self.input = rest;
        if is_real {
            text.parse::<f64>()
                .map(Value::Real)
                .map_err(|_| VmError::InvalidSaveData(format!("bad real `{text}`")).into())
        } else {
            text.parse::<i64>()
                .map(Value::Int)
                .map_err(|_| VmError::InvalidSaveData(format!("bad int `{text}`")).into())
        }
    }

    fn parse_list(&mut self, closer: &str) -> VmResult<Vec<Value>> {
        let mut items = Vec::new();
        self.skip_ws();
        while !self.input.starts_with(closer) {
            items.push(self.parse_value()?);
            self.skip_ws();
            if self.input.starts_with(',') {
                self.bump();
                self.skip_ws();
            }
        }
        self.expect(closer)?;
        Ok(items)
    }

    fn parse_aggregate(&mut self) -> VmResult<Value> {
        if self.input.starts_with("({") {
            self.expect("({")?;
            let items = self.parse_list("})")?;
            Ok(Value::Array(Rc::new(RefCell::new(LpcArray::new(items)))))
        } else if self.input.starts_with("([") {
            self.expect("([")?;
            let mut mapping = LpcMapping::new();
            self.skip_ws();
            while !self.input.starts_with("])") {
                let key = self.parse_value()?;
                self.skip_ws();
                self.expect(":")?;
                let value = self.parse_value()?;
                mapping
                    .insert(key, value, self.max_mapping_size)
                    .map_err(|()| VmError::MappingTooLarge)?;
                self.skip_ws();
                if self.input.starts_with(',') {
                    self.bump();
                    self.skip_ws();
                }
            }
            self.expect("])")?;
            Ok(Value::Mapping(Rc::new(RefCell::new(mapping))))
        } else if self.input.starts_with("(/") {
            self.expect("(/")?;
            let items = self.parse_list("/)")?;
            Ok(Value::Class(Rc::new(RefCell::new(ClassInstance::new(0, items)))))
        } else {
            Err(VmError::InvalidSaveData("unrecognized aggregate opener".into()).into())
        }
    }
}

/// Parses `text` into `object`'s variables by name (§4.4).
///
/// `noclear == false` (the default): every variable is reset to `0u` first, so a missing or
/// unparseable line simply leaves the reset value in place. `noclear == true`: each named
/// variable is only overwritten once its value parses successfully, so a malformed line leaves
/// the existing value untouched (the "single-slot atomic replace" of §4.4).
pub fn deserialize_into(
    object: &mut ObjectData,
    text: &str,
    noclear: bool,
    max_mapping_size: usize,
) -> VmResult<()> {
    if !noclear {
        for v in &mut object.variables {
            *v = Value::Undefined;
        }
    }
    let names = object.program.all_variable_names();
    for line in text.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, rest)) = line.split_once(' ') else {
            continue;
        };
        let Some(index) = names.iter().position(|n| &**n == name) else {
            continue;
        };
        let mut parser = Parser::new(rest, max_mapping_size);
        if let Ok(value) = parser.parse_value() {
            object.variables[index] = value;
        }
        // A line that fails to parse is treated like an unrecognized name: the variable keeps
        // whatever value it already had (reset to 0u, or preserved, per `noclear` above).
    }
    Ok(())
}

fn path_error(path: &str) -> VmError {
    VmError::Custom(format!("invalid path for save/restore: {path}"))
}

fn io_error(context: &str, err: std::io::Error) -> VmError {
    VmError::Custom(format!("{context}: {err}"))
}

/// `save_object(ob, path, save_zeros)` (§6.2): serializes `object` and writes it to `path` via
/// `path.tmp`, flush, atomic rename (§4.4, §6.3). `save_zeros == false` (the default) omits
/// zero-valued variable lines from the written file, matching the legacy codec.
pub fn save_object<D: Driver>(
    driver: &mut D,
    object: &ObjectRef,
    path: &str,
    max_depth: usize,
    save_zeros: bool,
) -> VmResult<()> {
    let sanitized = driver
        .check_valid_path(path, object, PathOp::Write, true)
        .ok_or_else(|| path_error(path))?;
    sweep_destructed_mapping_keys(&mut object.borrow_mut());
    let text = serialize_object(&object.borrow(), max_depth, save_zeros)?;
    let tmp_path = format!("{sanitized}.tmp");
    if let Err(err) = std::fs::write(&tmp_path, &text) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_error("writing save file", err).into());
    }
    if let Err(err) = std::fs::rename(&tmp_path, &sanitized) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_error("renaming save file", err).into());
    }
    Ok(())
}

/// `restore_object(ob, path, noclear)` (§6.2).
pub fn restore_object<D: Driver>(
    driver: &mut D,
    object: &ObjectRef,
    path: &str,
    noclear: bool,
    max_mapping_size: usize,
) -> VmResult<()> {
    let sanitized = driver
        .check_valid_path(path, object, PathOp::Read, false)
        .ok_or_else(|| path_error(path))?;
    let text = std::fs::read_to_string(&sanitized).map_err(|err| io_error("reading save file", err))?;
    deserialize_into(&mut object.borrow_mut(), &text, noclear, max_mapping_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::ProgramBuilder;

    fn object_with(names: Vec<&str>, values: Vec<Value>) -> ObjectData {
        let program = ProgramBuilder::new("/t")
            .variables(names.len() as u32, names.into_iter().map(Rc::from).collect())
            .build();
        let mut obj = ObjectData::new("/t#1".into(), program, values.len());
        obj.variables = values;
        obj
    }

    #[test]
    fn round_trips_ints_and_nested_aggregates() {
        let mapping = {
            let mut m = LpcMapping::new();
            m.insert(
                Value::String(LpcString::Shared(Rc::from("k"))),
                Value::Array(Rc::new(RefCell::new(LpcArray::new(vec![Value::Int(1), Value::Int(2)])))),
                1000,
            )
            .unwrap();
            m
        };
        let obj = object_with(
            vec!["x", "m"],
            vec![Value::Int(42), Value::Mapping(Rc::new(RefCell::new(mapping)))],
        );
        let text = serialize_object(&obj, 16, true).unwrap();
        assert!(text.starts_with("#/t\n"));

        let mut restored = object_with(vec!["x", "m"], vec![Value::Int(0), Value::Int(0)]);
        deserialize_into(&mut restored, &text, false, 1000).unwrap();
        assert_eq!(restored.variables[0], Value::Int(42));
        let Value::Mapping(m) = &restored.variables[1] else { panic!("expected mapping") };
        let Value::Array(arr) = m.borrow().get(&Value::String(LpcString::Shared(Rc::from("k")))).unwrap().clone() else {
            panic!("expected array")
        };
        assert_eq!(arr.borrow().items, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn missing_variable_becomes_zero_by_default() {
        let mut obj = object_with(vec!["x"], vec![Value::Int(99)]);
        deserialize_into(&mut obj, "#/t\n", false, 1000).unwrap();
        assert_eq!(obj.variables[0], Value::Int(0));
    }

    #[test]
    fn noclear_preserves_value_on_parse_failure() {
        let mut obj = object_with(vec!["x"], vec![Value::Int(7)]);
        deserialize_into(&mut obj, "#/t\nx not-a-value\n", true, 1000).unwrap();
        assert_eq!(obj.variables[0], Value::Int(7));
    }

    #[test]
    fn strings_escape_quotes_and_embedded_newlines() {
        let obj = object_with(vec!["s"], vec![Value::String(LpcString::Shared(Rc::from("a\"b\nc")))]);
        let text = serialize_object(&obj, 8, true).unwrap();
        assert!(text.contains("\"a\\\"b\rc\""));

        let mut restored = object_with(vec!["s"], vec![Value::Int(0)]);
        deserialize_into(&mut restored, &text, false, 1000).unwrap();
        assert_eq!(restored.variables[0], Value::String(LpcString::Shared(Rc::from("a\"b\nc"))));
    }

    #[test]
    fn object_values_save_as_zero() {
        use std::cell::RefCell;
        let target = Rc::new(RefCell::new(object_with(vec![], vec![])));
        let obj = object_with(vec!["o"], vec![Value::Object(target)]);
        let text = serialize_object(&obj, 8, true).unwrap();
        assert!(text.contains("o 0\n"));
    }

    #[test]
    fn save_zeros_false_omits_zero_valued_variable_lines() {
        let obj = object_with(vec!["hp", "gold"], vec![Value::Int(100), Value::Int(0)]);
        let text = serialize_object(&obj, 8, false).unwrap();
        assert!(text.contains("hp 100\n"));
        assert!(!text.contains("gold"));
    }

    #[test]
    fn save_zeros_true_keeps_zero_valued_variable_lines() {
        let obj = object_with(vec!["hp", "gold"], vec![Value::Int(100), Value::Int(0)]);
        let text = serialize_object(&obj, 8, true).unwrap();
        assert!(text.contains("gold 0\n"));
    }

    #[test]
    fn sweep_destructed_mapping_keys_drops_destructed_object_keys_before_save() {
        use std::cell::RefCell;
        let target = Rc::new(RefCell::new(object_with(vec![], vec![])));
        target.borrow_mut().destructed = true;
        let mut mapping = LpcMapping::new();
        mapping.insert(Value::Object(target), Value::Int(1), 1000).unwrap();
        mapping.insert(Value::Int(5), Value::Int(2), 1000).unwrap();
        let mut obj = object_with(vec!["m"], vec![Value::Mapping(Rc::new(RefCell::new(mapping)))]);
        sweep_destructed_mapping_keys(&mut obj);
        let Value::Mapping(m) = &obj.variables[0] else { panic!("expected mapping") };
        assert_eq!(m.borrow().len(), 1);
        assert_eq!(m.borrow().get(&Value::Int(5)), Some(&Value::Int(2)));
    }

    #[test]
    fn serializes_variables_in_declaration_order_with_the_expected_line_format() {
        let obj = object_with(
            vec!["hp", "name", "inventory"],
            vec![
                Value::Int(100),
                Value::String(LpcString::Shared(Rc::from("bob"))),
                Value::Array(Rc::new(RefCell::new(LpcArray::new(vec![Value::Int(1)])))),
            ],
        );
        let text = serialize_object(&obj, 8, true).unwrap();
        pretty_assertions::assert_eq!(text, "#/t\nhp 100\nname \"bob\"\ninventory ({1,})\n");
    }
}
