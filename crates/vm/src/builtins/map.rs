//! The map class: method table for map values.

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind, Obj};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "Map",
        &[
            ("len", NativeKind::Property, map_len),
            ("keys", NativeKind::Property, map_keys),
            ("values", NativeKind::Property, map_values),
            ("clear", NativeKind::Method, map_clear),
            ("contains", NativeKind::Method, map_contains),
            ("delete", NativeKind::Method, map_delete),
            ("copy", NativeKind::Method, map_copy),
            ("iterate", NativeKind::Method, map_iterate),
            ("iteratorvalue", NativeKind::Method, map_iteratorvalue),
        ],
    )
}

fn map_len(vm: &mut Vm) -> TeaResult<()> {
    let map = vm.check_map(0)?;
    let len = match vm.heap.get(map) {
        Obj::Map(m) => m.entries.len(),
        _ => 0,
    };
    vm.push_number(len as f64);
    Ok(())
}

fn map_keys(vm: &mut Vm) -> TeaResult<()> {
    let map = vm.check_map(0)?;
    let keys: Vec<Value> = match vm.heap.get(map) {
        Obj::Map(m) => m.entries.iter().map(|(k, _)| k).collect(),
        _ => Vec::new(),
    };
    let list = vm.push_list();
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items = keys;
    }
    Ok(())
}

fn map_values(vm: &mut Vm) -> TeaResult<()> {
    let map = vm.check_map(0)?;
    let values: Vec<Value> = match vm.heap.get(map) {
        Obj::Map(m) => m.entries.iter().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    };
    let list = vm.push_list();
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items = values;
    }
    Ok(())
}

fn map_clear(vm: &mut Vm) -> TeaResult<()> {
    let map = vm.check_map(0)?;
    if let Obj::Map(m) = vm.heap.get_mut(map) {
        m.entries.clear();
    }
    vm.push_value(0);
    Ok(())
}

fn map_contains(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let map = vm.check_map(0)?;
    let key = vm.get_value(1);
    let hash = match vm.heap.value_hash(key) {
        Some(hash) => hash,
        None => return Err(vm.error("Map key isn't hashable")),
    };
    let found = match vm.heap.get(map) {
        Obj::Map(m) => m.entries.contains(key, hash),
        _ => false,
    };
    vm.push_bool(found);
    Ok(())
}

fn map_delete(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let map = vm.check_map(0)?;
    let key = vm.get_value(1);
    let hash = match vm.heap.value_hash(key) {
        Some(hash) => hash,
        None => return Err(vm.error("Map key isn't hashable")),
    };
    let removed = match vm.heap.get_mut(map) {
        Obj::Map(m) => m.entries.delete(key, hash),
        _ => false,
    };
    if !removed {
        return Err(vm.error("Key does not exist within map"));
    }
    vm.push_value(0);
    Ok(())
}

fn map_copy(vm: &mut Vm) -> TeaResult<()> {
    let map = vm.check_map(0)?;
    let copy = vm.push_map();
    let entries: Vec<(Value, u32, Value)> = match vm.heap.get(map) {
        Obj::Map(m) => m
            .entries
            .iter()
            .filter_map(|(k, v)| vm.heap.value_hash(k).map(|h| (k, h, v)))
            .collect(),
        _ => Vec::new(),
    };
    if let Obj::Map(m) = vm.heap.get_mut(copy) {
        for (key, hash, value) in entries {
            m.entries.set(key, hash, value);
        }
    }
    Ok(())
}

/// Iterate over backing-store slots, skipping vacant entries.
fn map_iterate(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let map = vm.check_map(0)?;

    let occupied: Vec<bool> = match vm.heap.get(map) {
        Obj::Map(m) => m.entries.entries.iter().map(|e| !e.empty).collect(),
        _ => Vec::new(),
    };
    if occupied.iter().all(|&o| !o) {
        vm.push_null();
        return Ok(());
    }

    let mut index = 0usize;
    if !vm.is_null(1) {
        let given = vm.check_number(1)?;
        if given < 0.0 || given as usize >= occupied.len() {
            vm.push_null();
            return Ok(());
        }
        index = given as usize + 1;
    }

    while index < occupied.len() {
        if occupied[index] {
            vm.push_number(index as f64);
            return Ok(());
        }
        index += 1;
    }
    vm.push_null();
    Ok(())
}

/// The iterator value is a two-element `[key, value]` list, which is
/// what `for (var k, v in map)` destructures.
fn map_iteratorvalue(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let map = vm.check_map(0)?;
    let index = vm.check_number(1)? as usize;

    let entry = match vm.heap.get(map) {
        Obj::Map(m) => m
            .entries
            .entries
            .get(index)
            .filter(|e| !e.empty)
            .map(|e| (e.key, e.value)),
        _ => None,
    };
    let (key, value) = match entry {
        Some(pair) => pair,
        None => return Err(vm.error("Invalid map iterator")),
    };

    let list = vm.push_list();
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.push(key);
        l.items.push(value);
    }
    Ok(())
}
