//! Core classes and global functions.
//!
//! Builtin classes provide the method tables behind primitive values;
//! they are registered once at state open, along with the shared
//! global functions.

mod file;
mod list;
mod map;
mod number;
mod range;
mod string;

use crate::error::TeaResult;
use crate::object::Handle;
use crate::utf;
use crate::value::Value;
use crate::vm::{Vm, VmOptions};

/// Handles of the classes backing primitive values. GC roots.
#[derive(Clone, Copy, Debug)]
pub struct BuiltinClasses {
    pub string: Handle,
    pub list: Handle,
    pub map: Handle,
    pub range: Handle,
    pub file: Handle,
    pub number: Handle,
}

impl BuiltinClasses {
    pub fn all(&self) -> [Handle; 6] {
        [
            self.string, self.list, self.map, self.range, self.file, self.number,
        ]
    }
}

/// Register the core classes and global functions.
pub(crate) fn open(vm: &mut Vm) {
    register_globals(vm);

    let classes = BuiltinClasses {
        string: string::register(vm),
        list: list::register(vm),
        map: map::register(vm),
        range: range::register(vm),
        file: file::register(vm),
        number: number::register(vm),
    };
    vm.builtin_classes = Some(classes);

    // The classes are reachable as globals too, so scripts can name
    // them in `is` checks.
    for (name, class) in [
        ("String", classes.string),
        ("List", classes.list),
        ("Map", classes.map),
        ("Range", classes.range),
        ("File", classes.file),
        ("Number", classes.number),
    ] {
        let key = vm.intern(name);
        let hash = vm.heap.string_hash(key);
        vm.globals.set(key, hash, Value::object(class));
    }
}

fn register_globals(vm: &mut Vm) {
    let globals: &[(&str, crate::object::NativeFn)] = &[
        ("print", global_print),
        ("input", global_input),
        ("open", global_open),
        ("assert", global_assert),
        ("error", global_error),
        ("type", global_type),
        ("gc", global_gc),
        ("interpret", global_interpret),
        ("char", global_char),
        ("ord", global_ord),
        ("hex", global_hex),
        ("bin", global_bin),
        ("number", global_number),
    ];
    for &(name, function) in globals {
        vm.register_function(name, function);
    }
}

fn global_print(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    if count == 0 {
        println!();
        vm.push_null();
        return Ok(());
    }

    let mut line = String::new();
    for i in 0..count {
        line.push_str(&vm.to_display_string(vm.get_value(i)));
        line.push('\t');
    }
    println!("{}", line.trim_end_matches('\t'));
    vm.push_null();
    Ok(())
}

fn global_input(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_max_args(count, 1)?;
    if count != 0 {
        let prompt = vm.check_string(0)?;
        print!("{prompt}");
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(|e| vm.error(format!("Failed to read input: {e}")))?;
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    vm.push_owned_string(line);
    Ok(())
}

fn global_open(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    if count == 0 || count > 2 {
        return Err(vm.error(format!("Expected 1 or 2 arguments, got {count}")));
    }

    let path = vm.check_string(0)?.to_string();
    let mode = if count == 2 {
        vm.check_string(1)?.to_string()
    } else {
        "r".to_string()
    };

    let file = file::open_with_mode(&path, &mode)
        .ok_or_else(|| vm.error(format!("Unable to open file '{path}'")))?;

    let path_handle = vm.intern(&path);
    let mode_handle = vm.intern(&mode);
    let handle = vm.new_file(file, path_handle, mode_handle);
    vm.push_raw(Value::object(handle));
    Ok(())
}

fn global_assert(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    if vm.is_falsey(0) {
        let message = if count > 1 {
            vm.get_lstring(1).to_string()
        } else {
            "Assertion failed".to_string()
        };
        return Err(vm.error(message));
    }
    vm.push_value(0);
    Ok(())
}

fn global_error(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    Err(vm.error(vm.get_lstring(0).to_string()))
}

fn global_type(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let name = vm.heap.type_name(vm.get_value(0));
    vm.push_string(name);
    Ok(())
}

fn global_gc(vm: &mut Vm) -> TeaResult<()> {
    vm.collect_garbage();
    vm.push_null();
    Ok(())
}

fn global_interpret(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let source = vm.check_string(0)?.to_string();
    let mut nested = Vm::new(VmOptions::default());
    let _ = nested.interpret("interpret", &source);
    vm.push_null();
    Ok(())
}

fn global_char(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let n = vm.check_number(0)?;
    match utf::encode_codepoint(n as u32) {
        Some(s) => {
            vm.push_owned_string(s);
            Ok(())
        }
        None => Err(vm.error("Invalid code point")),
    }
}

fn global_ord(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let s = vm.check_string(0)?;
    match s.chars().next() {
        Some(c) => {
            vm.push_number(c as u32 as f64);
            Ok(())
        }
        None => Err(vm.error("Expected a non-empty string")),
    }
}

fn global_hex(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let n = vm.check_number(0)? as i64;
    vm.push_owned_string(format!("{n:#x}"));
    Ok(())
}

fn global_bin(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let n = vm.check_number(0)? as i64;
    vm.push_owned_string(format!("{n:#b}"));
    Ok(())
}

fn global_number(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    match vm.heap.to_number(vm.get_value(0)) {
        Some(n) => {
            vm.push_number(n);
            Ok(())
        }
        None => Err(vm.error("Failed conversion")),
    }
}
