//! The time module.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::TeaResult;
use crate::object::Handle;
use crate::vm::Vm;

pub(crate) fn build(vm: &mut Vm) -> TeaResult<Handle> {
    let module = vm.register_module(
        "time",
        &[("clock", time_clock), ("time", time_time)],
    );
    Ok(module)
}

/// Seconds of process runtime, monotonic.
fn time_clock(vm: &mut Vm) -> TeaResult<()> {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    let start = START.get_or_init(Instant::now);
    vm.push_number(start.elapsed().as_secs_f64());
    Ok(())
}

/// Seconds since the Unix epoch.
fn time_time(vm: &mut Vm) -> TeaResult<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    vm.push_number(now);
    Ok(())
}
