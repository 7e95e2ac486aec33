//! The string class: method table for string values.

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind};
use crate::utf;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "String",
        &[
            ("len", NativeKind::Property, string_len),
            ("constructor", NativeKind::Method, string_constructor),
            ("upper", NativeKind::Method, string_upper),
            ("lower", NativeKind::Method, string_lower),
            ("reverse", NativeKind::Method, string_reverse),
            ("split", NativeKind::Method, string_split),
            ("title", NativeKind::Method, string_title),
            ("contains", NativeKind::Method, string_contains),
            ("startswith", NativeKind::Method, string_startswith),
            ("endswith", NativeKind::Method, string_endswith),
            ("leftstrip", NativeKind::Method, string_leftstrip),
            ("rightstrip", NativeKind::Method, string_rightstrip),
            ("strip", NativeKind::Method, string_strip),
            ("count", NativeKind::Method, string_count),
            ("find", NativeKind::Method, string_find),
            ("replace", NativeKind::Method, string_replace),
            ("iterate", NativeKind::Method, string_iterate),
            ("iteratorvalue", NativeKind::Method, string_iteratorvalue),
        ],
    )
}

fn receiver(vm: &Vm) -> &str {
    vm.get_lstring(0)
}

fn string_len(vm: &mut Vm) -> TeaResult<()> {
    let len = utf::char_len(receiver(vm)) as f64;
    vm.push_number(len);
    Ok(())
}

/// `String(x)` coerces any value to its printed form.
fn string_constructor(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let rendered = vm.to_display_string(vm.get_value(1));
    vm.push_owned_string(rendered);
    Ok(())
}

fn string_upper(vm: &mut Vm) -> TeaResult<()> {
    let upper = receiver(vm).to_uppercase();
    vm.push_owned_string(upper);
    Ok(())
}

fn string_lower(vm: &mut Vm) -> TeaResult<()> {
    let lower = receiver(vm).to_lowercase();
    vm.push_owned_string(lower);
    Ok(())
}

fn string_reverse(vm: &mut Vm) -> TeaResult<()> {
    let reversed: String = receiver(vm).chars().rev().collect();
    vm.push_owned_string(reversed);
    Ok(())
}

fn string_title(vm: &mut Vm) -> TeaResult<()> {
    let mut titled = String::with_capacity(receiver(vm).len());
    let mut at_word_start = true;
    for c in receiver(vm).chars() {
        if c == ' ' {
            at_word_start = true;
            titled.push(c);
        } else if at_word_start {
            titled.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            titled.extend(c.to_lowercase());
        }
    }
    vm.push_owned_string(titled);
    Ok(())
}

fn string_split(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_max_args(count, 3)?;

    let subject = receiver(vm).to_string();
    let separator = if count >= 2 {
        vm.check_string(1)?.to_string()
    } else {
        " ".to_string()
    };
    let max_split = if count == 3 {
        vm.check_number(2)? as usize
    } else {
        subject.len() + 1
    };

    let parts: Vec<String> = if separator.is_empty() {
        subject.chars().map(|c| c.to_string()).collect()
    } else {
        subject.split(&separator).map(|s| s.to_string()).collect()
    };

    let list = vm.push_list();
    for part in parts.into_iter().take(max_split.max(1)) {
        let handle = vm.intern_owned(part);
        if let crate::object::Obj::List(l) = vm.heap.get_mut(list) {
            l.items.push(Value::object(handle));
        }
    }
    Ok(())
}

fn string_contains(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let needle = vm.check_string(1)?;
    let found = receiver(vm).contains(needle);
    vm.push_bool(found);
    Ok(())
}

fn string_startswith(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let prefix = vm.check_string(1)?;
    let result = receiver(vm).starts_with(prefix);
    vm.push_bool(result);
    Ok(())
}

fn string_endswith(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let suffix = vm.check_string(1)?;
    let result = receiver(vm).ends_with(suffix);
    vm.push_bool(result);
    Ok(())
}

fn string_leftstrip(vm: &mut Vm) -> TeaResult<()> {
    let stripped = receiver(vm).trim_start().to_string();
    vm.push_owned_string(stripped);
    Ok(())
}

fn string_rightstrip(vm: &mut Vm) -> TeaResult<()> {
    let stripped = receiver(vm).trim_end().to_string();
    vm.push_owned_string(stripped);
    Ok(())
}

fn string_strip(vm: &mut Vm) -> TeaResult<()> {
    let stripped = receiver(vm).trim().to_string();
    vm.push_owned_string(stripped);
    Ok(())
}

/// Occurrences of a needle, counting overlaps the way the runtime
/// always has.
fn string_count(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let needle = vm.check_string(1)?;
    let subject = receiver(vm);

    let mut occurrences = 0;
    if !needle.is_empty() {
        let mut offset = 0;
        while let Some(found) = subject[offset..].find(needle) {
            occurrences += 1;
            offset += found + 1;
            if offset > subject.len() {
                break;
            }
        }
    }
    vm.push_number(occurrences as f64);
    Ok(())
}

/// Character index of the nth occurrence of a substring, or -1.
fn string_find(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    if !(2..=3).contains(&count) {
        return Err(vm.error(format!("Expected 1 or 2 arguments, got {}", count - 1)));
    }
    let needle = vm.check_string(1)?.to_string();
    let occurrence = if count == 3 {
        vm.check_number(2)? as usize
    } else {
        1
    };
    let subject = receiver(vm).to_string();

    let mut remaining = occurrence.max(1);
    let mut offset = 0;
    let mut answer: i64 = -1;
    while let Some(found) = subject[offset..].find(&needle) {
        remaining -= 1;
        let byte_index = offset + found;
        if remaining == 0 {
            answer = utf::char_len(&subject[..byte_index]) as i64;
            break;
        }
        offset = byte_index + 1;
        if offset > subject.len() {
            break;
        }
    }

    vm.push_number(answer as f64);
    Ok(())
}

fn string_replace(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 3)?;
    let old = vm.check_string(1)?.to_string();
    let new = vm.check_string(2)?.to_string();
    let replaced = receiver(vm).replace(&old, &new);
    vm.push_owned_string(replaced);
    Ok(())
}

/// Step the iterator to the next code point's byte offset; null ends
/// the iteration.
fn string_iterate(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let subject = receiver(vm);
    let len = subject.len();

    if vm.is_null(1) {
        if len == 0 {
            vm.push_null();
        } else {
            vm.push_number(0.0);
        }
        return Ok(());
    }

    let index = vm.check_number(1)?;
    if index < 0.0 {
        vm.push_null();
        return Ok(());
    }

    let mut index = index as usize;
    let bytes = receiver(vm).as_bytes();
    loop {
        index += 1;
        if index >= len {
            vm.push_null();
            return Ok(());
        }
        if (bytes[index] & 0xc0) != 0x80 {
            break;
        }
    }
    vm.push_number(index as f64);
    Ok(())
}

fn string_iteratorvalue(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let index = vm.check_number(1)? as usize;
    let subject = receiver(vm);
    if index >= subject.len() {
        return Err(vm.error("Invalid string iterator"));
    }
    let ch = utf::code_point_at(subject, index).to_string();
    vm.push_owned_string(ch);
    Ok(())
}
