//! Native module registry.
//!
//! `import name` resolves bare names against this registry; a module
//! is built on first import and cached in the modules table alongside
//! file-backed modules.

mod math;
mod sys;
mod time;

use hashbrown::HashMap;

use crate::error::TeaResult;
use crate::object::Handle;
use crate::vm::Vm;

/// Builds a native module on first import, returning its handle.
pub type ModuleBuilder = fn(&mut Vm) -> TeaResult<Handle>;

/// Name-to-builder registry for native modules.
#[derive(Default)]
pub struct NativeModules {
    builders: HashMap<String, ModuleBuilder>,
}

impl NativeModules {
    pub fn new() -> NativeModules {
        NativeModules::default()
    }

    pub fn register(&mut self, name: &str, builder: ModuleBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleBuilder> {
        self.builders.get(name).copied()
    }
}

/// Register the modules that ship with the engine.
pub(crate) fn open(vm: &mut Vm) {
    vm.native_modules.register("math", math::build);
    vm.native_modules.register("time", time::build);
    vm.native_modules.register("sys", sys::build);
}
