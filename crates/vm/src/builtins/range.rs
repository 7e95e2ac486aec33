//! The range class: method table for range values.

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind};
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "Range",
        &[
            ("start", NativeKind::Property, range_start),
            ("end", NativeKind::Property, range_end),
            ("step", NativeKind::Property, range_step),
            ("len", NativeKind::Property, range_len),
            ("constructor", NativeKind::Method, range_constructor),
            ("contains", NativeKind::Method, range_contains),
            ("reverse", NativeKind::Method, range_reverse),
            ("iterate", NativeKind::Method, range_iterate),
            ("iteratorvalue", NativeKind::Method, range_iteratorvalue),
        ],
    )
}

fn range_start(vm: &mut Vm) -> TeaResult<()> {
    let (start, _, _) = vm.check_range(0)?;
    vm.push_number(start);
    Ok(())
}

fn range_end(vm: &mut Vm) -> TeaResult<()> {
    let (_, end, _) = vm.check_range(0)?;
    vm.push_number(end);
    Ok(())
}

fn range_step(vm: &mut Vm) -> TeaResult<()> {
    let (_, _, step) = vm.check_range(0)?;
    vm.push_number(step);
    Ok(())
}

fn range_len(vm: &mut Vm) -> TeaResult<()> {
    let (start, end, step) = vm.check_range(0)?;
    let len = if step == 0.0 {
        0.0
    } else {
        ((end - start) / step).ceil().max(0.0)
    };
    vm.push_number(len);
    Ok(())
}

/// `Range(end)`, `Range(start, end)`, or `Range(start, end, step)`.
fn range_constructor(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    if !(2..=4).contains(&count) {
        return Err(vm.error(format!("Expected 1 to 3 arguments, got {}", count - 1)));
    }

    let (start, end, step) = match count {
        2 => (0.0, vm.check_number(1)?, 1.0),
        3 => (vm.check_number(1)?, vm.check_number(2)?, 1.0),
        _ => (
            vm.check_number(1)?,
            vm.check_number(2)?,
            vm.check_number(3)?,
        ),
    };
    vm.push_range(start, end, step);
    Ok(())
}

/// Bounds plus step alignment: a number is contained only when it
/// also lands on the range's step lattice. The `in` operator checks
/// bounds alone; the two are meant to differ.
fn range_contains(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let (start, end, step) = vm.check_range(0)?;
    let found = vm.is_number(1) && {
        let n = vm.get_number(1);
        !(n < start || n > end) && n % step == 0.0
    };
    vm.push_bool(found);
    Ok(())
}

fn range_reverse(vm: &mut Vm) -> TeaResult<()> {
    let (start, end, step) = vm.check_range(0)?;
    vm.push_range(end, start, -step);
    Ok(())
}

/// Walk from start toward end by step; the iterator is the value
/// itself, and the range is half-open.
fn range_iterate(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let (start, end, step) = vm.check_range(0)?;

    if start == end || step == 0.0 {
        vm.push_null();
        return Ok(());
    }

    if vm.is_null(1) {
        vm.push_number(start);
        return Ok(());
    }

    let mut iterator = vm.check_number(1)?;
    iterator += step;
    let done = if step > 0.0 {
        iterator >= end
    } else {
        iterator <= end
    };
    if done {
        vm.push_null();
    } else {
        vm.push_number(iterator);
    }
    Ok(())
}

fn range_iteratorvalue(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 2)?;
    let value = vm.check_number(1)?;
    vm.push_number(value);
    Ok(())
}
