//! The sys module.

use crate::error::TeaResult;
use crate::object::{Handle, Obj};
use crate::value::Value;
use crate::vm::Vm;

pub(crate) fn build(vm: &mut Vm) -> TeaResult<Handle> {
    let module = vm.register_module(
        "sys",
        &[("exit", sys_exit), ("sleep", sys_sleep)],
    );

    // Script arguments the host passed through.
    let argv = vm.new_list();
    vm.heap.protect.push(Value::object(argv));
    let args = vm.options.argv.clone();
    for arg in args {
        let handle = vm.intern_owned(arg);
        if let Obj::List(l) = vm.heap.get_mut(argv) {
            l.items.push(Value::object(handle));
        }
    }
    vm.set_module_value(module, "argv", Value::object(argv));
    vm.heap.protect.pop();

    let version = vm.intern(env!("CARGO_PKG_VERSION"));
    vm.set_module_value(module, "version", Value::object(version));

    Ok(module)
}

fn sys_exit(vm: &mut Vm) -> TeaResult<()> {
    let code = if vm.get_top() > 0 && vm.is_number(0) {
        vm.get_number(0) as i32
    } else {
        0
    };
    std::process::exit(code);
}

fn sys_sleep(vm: &mut Vm) -> TeaResult<()> {
    let count = vm.get_top();
    vm.ensure_min_args(count, 1)?;
    let seconds = vm.check_number(0)?;
    if seconds > 0.0 {
        std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
    }
    vm.push_null();
    Ok(())
}
