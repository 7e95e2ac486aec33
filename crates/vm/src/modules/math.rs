//! The math module.

use crate::error::TeaResult;
use crate::object::Handle;
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn build(vm: &mut Vm) -> TeaResult<Handle> {
    let module = vm.register_module(
        "math",
        &[
            ("min", math_min),
            ("max", math_max),
            ("abs", math_abs),
            ("floor", math_floor),
            ("ceil", math_ceil),
            ("round", math_round),
            ("sqrt", math_sqrt),
            ("sin", math_sin),
            ("cos", math_cos),
            ("tan", math_tan),
            ("asin", math_asin),
            ("acos", math_acos),
            ("atan", math_atan),
            ("exp", math_exp),
            ("log", math_log),
            ("sum", math_sum),
        ],
    );

    for (name, value) in [
        ("pi", std::f64::consts::PI),
        ("tau", std::f64::consts::TAU),
        ("e", std::f64::consts::E),
        ("infinity", f64::INFINITY),
        ("nan", f64::NAN),
    ] {
        vm.set_module_value(module, name, Value::number(value));
    }

    Ok(module)
}

/// Fold every numeric argument with `f`, starting from the first.
fn fold(vm: &mut Vm, f: fn(f64, f64) -> f64) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let mut result = vm.check_number(0)?;
    for i in 1..count {
        result = f(result, vm.check_number(i)?);
    }
    vm.push_number(result);
    Ok(())
}

fn math_min(vm: &mut Vm) -> TeaResult<()> {
    fold(vm, f64::min)
}

fn math_max(vm: &mut Vm) -> TeaResult<()> {
    fold(vm, f64::max)
}

fn math_sum(vm: &mut Vm) -> TeaResult<()> {
    fold(vm, |a, b| a + b)
}

fn unary(vm: &mut Vm, f: fn(f64) -> f64) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let n = vm.check_number(0)?;
    vm.push_number(f(n));
    Ok(())
}

fn math_abs(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::abs)
}

fn math_floor(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::floor)
}

fn math_ceil(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::ceil)
}

fn math_round(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::round)
}

fn math_sqrt(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::sqrt)
}

fn math_sin(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::sin)
}

fn math_cos(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::cos)
}

fn math_tan(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::tan)
}

fn math_asin(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::asin)
}

fn math_acos(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::acos)
}

fn math_atan(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::atan)
}

fn math_exp(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::exp)
}

fn math_log(vm: &mut Vm) -> TeaResult<()> {
    unary(vm, f64::ln)
}
