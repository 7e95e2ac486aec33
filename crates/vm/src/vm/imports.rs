//! Import execution: source-file modules and registered native
//! modules, cached by canonical path or name.

use std::path::{Path, PathBuf};

use log::trace;

use super::Vm;
use crate::compiler;
use crate::error::TeaResult;
use crate::object::{Handle, Obj};
use crate::value::Value;

/// Candidate files for an import spelled `name`, relative to the
/// importing module's directory.
fn candidates(dir: &str, name: &str) -> Vec<PathBuf> {
    let base = Path::new(dir).join(name);
    vec![
        base.clone(),
        PathBuf::from(format!("{}.tea", base.display())),
        base.join("init.tea"),
    ]
}

impl Vm {
    fn current_module_dir(&self, frame: usize) -> String {
        let module = self.frames[frame].module;
        match self.heap.get(module) {
            Obj::Module(m) => self.heap.string_chars(m.path).to_string(),
            _ => ".".to_string(),
        }
    }

    /// `import "path"`: load (or fetch from cache) a source module and
    /// start executing its top-level function. Pushes the placeholder
    /// the compiler pops.
    pub(crate) fn import_string(&mut self, name: Handle, frame: usize) -> TeaResult<()> {
        let spelled = self.heap.string_chars(name).to_string();
        let dir = self.current_module_dir(frame);

        let resolved = candidates(&dir, &spelled)
            .into_iter()
            .filter(|p| p.is_file())
            .find_map(|p| std::fs::canonicalize(p).ok());
        let path = match resolved {
            Some(path) => path,
            None => {
                return Err(self.error(format!("Could not open file \"{spelled}\"")));
            }
        };
        let path_str = path.to_string_lossy().into_owned();

        // Idempotent: the cache is keyed by canonical path.
        let key = self.intern(&path_str);
        let key_hash = self.heap.string_hash(key);
        if let Some(cached) = self.modules.get(key, key_hash) {
            trace!("module cache hit for {path_str}");
            self.last_module = Some(cached.as_object());
            self.push(Value::NULL);
            return Ok(());
        }

        trace!("loading module {path_str}");
        let source = match std::fs::read_to_string(&path) {
            Ok(source) => source,
            Err(_) => {
                return Err(self.error(format!("Could not open file \"{spelled}\"")));
            }
        };

        let module = self.new_module(key);
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        let parent = self.intern(&parent);
        if let Obj::Module(m) = self.heap.get_mut(module) {
            m.path = parent;
        }
        self.last_module = Some(module);

        let function = compiler::compile(self, &source, module)?;
        self.heap.protect.push(Value::object(function));
        let closure = self.new_closure(function);
        self.heap.protect.pop();

        self.push(Value::object(closure));
        self.call_closure(closure, 0)
    }

    /// `import name`: fetch a registered native module, building it on
    /// first use. Pushes the module object.
    pub(crate) fn import_name(&mut self, name: Handle) -> TeaResult<()> {
        let hash = self.heap.string_hash(name);
        if let Some(cached) = self.modules.get(name, hash) {
            self.last_module = Some(cached.as_object());
            self.push(cached);
            return Ok(());
        }

        let module_name = self.heap.string_chars(name).to_string();
        let builder = match self.native_modules.lookup(&module_name) {
            Some(builder) => builder,
            None => {
                return Err(self.error(format!("Unknown module '{module_name}'")));
            }
        };

        trace!("building native module {module_name}");
        let module = builder(self)?;
        self.last_module = Some(module);
        self.push(Value::object(module));
        Ok(())
    }

    /// `from m import name`: read one value out of the module imported
    /// by the preceding instruction.
    pub(crate) fn import_variable(&mut self, name: Handle) -> TeaResult<()> {
        let hash = self.heap.string_hash(name);
        let module = match self.last_module {
            Some(module) => module,
            None => return Err(self.error("No module imported")),
        };
        let value = match self.heap.get(module) {
            Obj::Module(m) => m.values.get(name, hash),
            _ => None,
        };
        match value {
            Some(value) => {
                self.push(value);
                Ok(())
            }
            None => {
                let module_name = match self.heap.get(module) {
                    Obj::Module(m) => self.heap.string_chars(m.name).to_string(),
                    _ => String::new(),
                };
                Err(self.error(format!(
                    "{} can't be found in module {}",
                    self.heap.string_chars(name),
                    module_name
                )))
            }
        }
    }
}
