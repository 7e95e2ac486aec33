//! The file class: method table for open OS files.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind, Obj};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "File",
        &[
            ("closed", NativeKind::Property, file_closed),
            ("path", NativeKind::Property, file_path),
            ("type", NativeKind::Property, file_type),
            ("write", NativeKind::Method, file_write),
            ("writeline", NativeKind::Method, file_writeline),
            ("read", NativeKind::Method, file_read),
            ("readline", NativeKind::Method, file_readline),
            ("seek", NativeKind::Method, file_seek),
            ("close", NativeKind::Method, file_close),
            ("iterate", NativeKind::Method, file_iterate),
            ("iteratorvalue", NativeKind::Method, file_iteratorvalue),
        ],
    )
}

/// Translate a stdio-style mode string into open options.
pub(crate) fn open_with_mode(path: &str, mode: &str) -> Option<File> {
    let mut options = OpenOptions::new();
    match mode {
        "r" => options.read(true),
        "r+" => options.read(true).write(true),
        "w" => options.write(true).create(true).truncate(true),
        "w+" => options.read(true).write(true).create(true).truncate(true),
        "a" => options.append(true).create(true),
        "a+" => options.read(true).append(true).create(true),
        _ => return None,
    };
    options.open(path).ok()
}

fn with_open_file<T>(
    vm: &mut Vm,
    action: impl FnOnce(&mut File) -> std::io::Result<T>,
) -> TeaResult<T> {
    let handle = vm.check_file(0)?;
    let outcome = match vm.heap.get_mut(handle) {
        Obj::File(f) => match f.file.as_mut() {
            Some(file) if f.is_open => Some(action(file)),
            _ => None,
        },
        _ => None,
    };
    match outcome {
        Some(Ok(result)) => Ok(result),
        Some(Err(e)) => Err(vm.error(format!("File operation failed: {e}"))),
        None => Err(vm.error("File is closed")),
    }
}

fn file_closed(vm: &mut Vm) -> TeaResult<()> {
    let handle = vm.check_file(0)?;
    let closed = match vm.heap.get(handle) {
        Obj::File(f) => !f.is_open,
        _ => true,
    };
    vm.push_bool(closed);
    Ok(())
}

fn file_path(vm: &mut Vm) -> TeaResult<()> {
    let handle = vm.check_file(0)?;
    let path = match vm.heap.get(handle) {
        Obj::File(f) => f.path,
        _ => return Err(vm.error("Expected file")),
    };
    vm.push_raw(Value::object(path));
    Ok(())
}

fn file_type(vm: &mut Vm) -> TeaResult<()> {
    let handle = vm.check_file(0)?;
    let mode = match vm.heap.get(handle) {
        Obj::File(f) => f.mode,
        _ => return Err(vm.error("Expected file")),
    };
    vm.push_raw(Value::object(mode));
    Ok(())
}

fn file_write(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let text = vm.check_string(1)?.to_string();
    let written = with_open_file(vm, |file| file.write(text.as_bytes()))?;
    vm.push_number(written as f64);
    Ok(())
}

fn file_writeline(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let mut text = vm.check_string(1)?.to_string();
    text.push('\n');
    let written = with_open_file(vm, |file| file.write(text.as_bytes()))?;
    vm.push_number(written as f64);
    Ok(())
}

fn file_read(vm: &mut Vm) -> TeaResult<()> {
    let contents = with_open_file(vm, |file| {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents)
    })?;
    vm.push_owned_string(contents);
    Ok(())
}

/// One line without its terminator, or null at end of input.
fn read_line(file: &mut File) -> std::io::Result<Option<String>> {
    let mut bytes = Vec::new();
    let mut buffer = [0u8; 1];
    let mut saw_any = false;
    loop {
        if file.read(&mut buffer)? == 0 {
            break;
        }
        saw_any = true;
        if buffer[0] == b'\n' {
            break;
        }
        bytes.push(buffer[0]);
    }
    if !saw_any {
        return Ok(None);
    }
    while bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn file_readline(vm: &mut Vm) -> TeaResult<()> {
    let line = with_open_file(vm, read_line)?;
    match line {
        Some(line) => vm.push_owned_string(line),
        None => vm.push_null(),
    }
    Ok(())
}

fn file_seek(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let offset = vm.check_number(1)?;
    let position = with_open_file(vm, |file| file.seek(SeekFrom::Start(offset as u64)))?;
    vm.push_number(position as f64);
    Ok(())
}

fn file_close(vm: &mut Vm) -> TeaResult<()> {
    let handle = vm.check_file(0)?;
    if let Obj::File(f) = vm.heap.get_mut(handle) {
        f.is_open = false;
        f.file = None;
    }
    vm.push_null();
    Ok(())
}

/// Streaming line iteration: the iterator is the line itself.
fn file_iterate(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let line = with_open_file(vm, read_line)?;
    match line {
        Some(line) => vm.push_owned_string(line),
        None => vm.push_null(),
    }
    Ok(())
}

fn file_iteratorvalue(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    vm.push_value(1);
    Ok(())
}
