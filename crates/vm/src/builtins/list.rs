//! The list class: method table for list values.
//!
//! Mutating methods return the receiver so calls chain; the
//! callback-taking methods re-enter the VM through the host `call`.

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind, Obj};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "List",
        &[
            ("len", NativeKind::Property, list_len),
            ("add", NativeKind::Method, list_add),
            ("remove", NativeKind::Method, list_remove),
            ("delete", NativeKind::Method, list_delete),
            ("clear", NativeKind::Method, list_clear),
            ("insert", NativeKind::Method, list_insert),
            ("extend", NativeKind::Method, list_extend),
            ("reverse", NativeKind::Method, list_reverse),
            ("contains", NativeKind::Method, list_contains),
            ("count", NativeKind::Method, list_count),
            ("swap", NativeKind::Method, list_swap),
            ("fill", NativeKind::Method, list_fill),
            ("sort", NativeKind::Method, list_sort),
            ("index", NativeKind::Method, list_index),
            ("join", NativeKind::Method, list_join),
            ("copy", NativeKind::Method, list_copy),
            ("find", NativeKind::Method, list_find),
            ("map", NativeKind::Method, list_map),
            ("filter", NativeKind::Method, list_filter),
            ("reduce", NativeKind::Method, list_reduce),
            ("foreach", NativeKind::Method, list_foreach),
            ("iterate", NativeKind::Method, list_iterate),
            ("iteratorvalue", NativeKind::Method, list_iteratorvalue),
        ],
    )
}

fn items_len(vm: &Vm, list: Handle) -> usize {
    match vm.heap.get(list) {
        Obj::List(l) => l.items.len(),
        _ => 0,
    }
}

fn item_at(vm: &Vm, list: Handle, index: usize) -> Option<Value> {
    match vm.heap.get(list) {
        Obj::List(l) => l.items.get(index).copied(),
        _ => None,
    }
}

fn list_len(vm: &mut Vm) -> TeaResult<()> {
    let list = vm.check_list(0)?;
    vm.push_number(items_len(vm, list) as f64);
    Ok(())
}

fn list_add(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    for i in 1..count {
        let item = vm.get_value(i);
        if let Obj::List(l) = vm.heap.get_mut(list) {
            l.items.push(item);
        }
    }
    vm.push_value(0);
    Ok(())
}

fn list_remove(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let target = vm.get_value(1);

    let position = match vm.heap.get(list) {
        Obj::List(l) => l
            .items
            .iter()
            .position(|&item| vm.heap.values_equal(item, target)),
        _ => None,
    };

    match position {
        Some(index) => {
            if let Obj::List(l) = vm.heap.get_mut(list) {
                l.items.remove(index);
            }
            vm.push_value(0);
            Ok(())
        }
        None => Err(vm.error("Value does not exist within the list")),
    }
}

fn list_delete(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let index = vm.check_number(1)? as i64;

    let len = items_len(vm, list) as i64;
    let index = if index < 0 { index + len } else { index };
    if index < 0 || index >= len {
        return Err(vm.error("List index out of bounds"));
    }
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.remove(index as usize);
    }
    vm.push_value(0);
    Ok(())
}

fn list_clear(vm: &mut Vm) -> TeaResult<()> {
    let list = vm.check_list(0)?;
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.clear();
    }
    vm.push_value(0);
    Ok(())
}

fn list_insert(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 3)?;
    let list = vm.check_list(0)?;
    let index = vm.check_number(1)? as i64;
    let item = vm.get_value(2);

    let len = items_len(vm, list) as i64;
    let index = if index < 0 { index + len } else { index };
    let index = index.clamp(0, len) as usize;
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.insert(index, item);
    }
    vm.push_value(0);
    Ok(())
}

fn list_extend(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let other = vm.check_list(1)?;

    let items = match vm.heap.get(other) {
        Obj::List(l) => l.items.clone(),
        _ => Vec::new(),
    };
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.extend(items);
    }
    vm.push_value(0);
    Ok(())
}

fn list_reverse(vm: &mut Vm) -> TeaResult<()> {
    let list = vm.check_list(0)?;
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.reverse();
    }
    vm.push_value(0);
    Ok(())
}

fn list_contains(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let target = vm.get_value(1);
    let found = match vm.heap.get(list) {
        Obj::List(l) => l
            .items
            .iter()
            .any(|&item| vm.heap.values_equal(item, target)),
        _ => false,
    };
    vm.push_bool(found);
    Ok(())
}

fn list_count(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let target = vm.get_value(1);
    let occurrences = match vm.heap.get(list) {
        Obj::List(l) => l
            .items
            .iter()
            .filter(|&&item| vm.heap.values_equal(item, target))
            .count(),
        _ => 0,
    };
    vm.push_number(occurrences as f64);
    Ok(())
}

fn list_swap(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 3)?;
    let list = vm.check_list(0)?;
    let a = vm.check_number(1)? as usize;
    let b = vm.check_number(2)? as usize;
    let len = items_len(vm, list);
    if a >= len || b >= len {
        return Err(vm.error("List index out of bounds"));
    }
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.swap(a, b);
    }
    vm.push_value(0);
    Ok(())
}

fn list_fill(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let value = vm.get_value(1);
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.fill(value);
    }
    vm.push_value(0);
    Ok(())
}

fn list_sort(vm: &mut Vm) -> TeaResult<()> {
    let list = vm.check_list(0)?;
    let all_numbers = match vm.heap.get(list) {
        Obj::List(l) => l.items.iter().all(|item| item.is_number()),
        _ => false,
    };
    if !all_numbers {
        return Err(vm.error("Can only sort lists of numbers"));
    }
    if let Obj::List(l) = vm.heap.get_mut(list) {
        l.items.sort_by(|a, b| {
            a.as_number()
                .partial_cmp(&b.as_number())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
    vm.push_value(0);
    Ok(())
}

fn list_index(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let target = vm.get_value(1);
    let position = match vm.heap.get(list) {
        Obj::List(l) => l
            .items
            .iter()
            .position(|&item| vm.heap.values_equal(item, target)),
        _ => None,
    };
    match position {
        Some(index) => vm.push_number(index as f64),
        None => vm.push_null(),
    }
    Ok(())
}

fn list_join(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    let list = vm.check_list(0)?;
    let separator = if count >= 2 {
        vm.check_string(1)?.to_string()
    } else {
        String::new()
    };

    let items = match vm.heap.get(list) {
        Obj::List(l) => l.items.clone(),
        _ => Vec::new(),
    };
    let parts: Vec<String> = items
        .iter()
        .map(|&item| vm.to_display_string(item))
        .collect();
    vm.push_owned_string(parts.join(&separator));
    Ok(())
}

fn list_copy(vm: &mut Vm) -> TeaResult<()> {
    let list = vm.check_list(0)?;
    let items = match vm.heap.get(list) {
        Obj::List(l) => l.items.clone(),
        _ => Vec::new(),
    };
    let copy = vm.push_list();
    if let Obj::List(l) = vm.heap.get_mut(copy) {
        l.items = items;
    }
    Ok(())
}

fn list_find(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;

    let mut index = 0;
    while index < items_len(vm, list) {
        let item = match item_at(vm, list, index) {
            Some(item) => item,
            None => break,
        };
        vm.push_value(1);
        vm.push_raw(item);
        vm.call(1)?;
        let verdict = vm.pop();
        if !vm.heap.is_falsey(verdict) {
            vm.push_raw(item);
            return Ok(());
        }
        index += 1;
    }
    vm.push_null();
    Ok(())
}

fn list_map(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let result = vm.push_list();

    let mut index = 0;
    while index < items_len(vm, list) {
        let item = match item_at(vm, list, index) {
            Some(item) => item,
            None => break,
        };
        vm.push_value(1);
        vm.push_raw(item);
        vm.call(1)?;
        let mapped = vm.pop();
        if let Obj::List(l) = vm.heap.get_mut(result) {
            l.items.push(mapped);
        }
        index += 1;
    }
    Ok(())
}

fn list_filter(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let result = vm.push_list();

    let mut index = 0;
    while index < items_len(vm, list) {
        let item = match item_at(vm, list, index) {
            Some(item) => item,
            None => break,
        };
        vm.push_value(1);
        vm.push_raw(item);
        vm.call(1)?;
        let verdict = vm.pop();
        if !vm.heap.is_falsey(verdict) {
            if let Obj::List(l) = vm.heap.get_mut(result) {
                l.items.push(item);
            }
        }
        index += 1;
    }
    Ok(())
}

fn list_reduce(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;

    let mut index = 0;
    let mut accumulator = if count >= 3 {
        vm.get_value(2)
    } else {
        match item_at(vm, list, 0) {
            Some(first) => {
                index = 1;
                first
            }
            None => return Err(vm.error("Cannot reduce an empty list")),
        }
    };

    while index < items_len(vm, list) {
        let item = match item_at(vm, list, index) {
            Some(item) => item,
            None => break,
        };
        vm.push_value(1);
        vm.push_raw(accumulator);
        vm.push_raw(item);
        vm.call(2)?;
        accumulator = vm.pop();
        index += 1;
    }
    vm.push_raw(accumulator);
    Ok(())
}

fn list_foreach(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;

    let mut index = 0;
    while index < items_len(vm, list) {
        let item = match item_at(vm, list, index) {
            Some(item) => item,
            None => break,
        };
        vm.push_value(1);
        vm.push_raw(item);
        vm.call(1)?;
        vm.pop();
        index += 1;
    }
    vm.push_value(0);
    Ok(())
}

/// Advance to the next element index; null ends the iteration.
fn list_iterate(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let len = items_len(vm, list);

    if vm.is_null(1) {
        if len == 0 {
            vm.push_null();
        } else {
            vm.push_number(0.0);
        }
        return Ok(());
    }

    let index = vm.check_number(1)?;
    if index < 0.0 || index as usize + 1 >= len {
        vm.push_null();
    } else {
        vm.push_number(index + 1.0);
    }
    Ok(())
}

fn list_iteratorvalue(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let list = vm.check_list(0)?;
    let index = vm.check_number(1)? as usize;
    match item_at(vm, list, index) {
        Some(item) => {
            vm.push_raw(item);
            Ok(())
        }
        None => Err(vm.error("Invalid list iterator")),
    }
}
