//! The number class: the small method table behind number values.

use crate::error::TeaResult;
use crate::object::{Handle, NativeKind};
use crate::value::number_to_string;
use crate::vm::Vm;

pub(crate) fn register(vm: &mut Vm) -> Handle {
    vm.register_class(
        "Number",
        &[
            ("toString", NativeKind::Method, number_to_string_method),
            ("tostring", NativeKind::Method, number_to_string_method),
            ("abs", NativeKind::Method, number_abs),
            ("floor", NativeKind::Method, number_floor),
            ("ceil", NativeKind::Method, number_ceil),
            ("round", NativeKind::Method, number_round),
        ],
    )
}

fn number_to_string_method(vm: &mut Vm) -> TeaResult<()> {
    let n = vm.check_number(0)?;
    vm.push_owned_string(number_to_string(n));
    Ok(())
}

fn number_abs(vm: &mut Vm) -> TeaResult<()> {
    let n = vm.check_number(0)?;
    vm.push_number(n.abs());
    Ok(())
}

fn number_floor(vm: &mut Vm) -> TeaResult<()> {
    let n = vm.check_number(0)?;
    vm.push_number(n.floor());
    Ok(())
}

fn number_ceil(vm: &mut Vm) -> TeaResult<()> {
    let n = vm.check_number(0)?;
    vm.push_number(n.ceil());
    Ok(())
}

fn number_round(vm: &mut Vm) -> TeaResult<()> {
    let n = vm.check_number(0)?;
    vm.push_number(n.round());
    Ok(())
}
