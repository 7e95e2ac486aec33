//! Module loading: file-backed imports, `from ... import`, aliases,
//! and the native module registry.

use std::path::PathBuf;

use tea_vm::{TeaResult, Value, Vm, VmOptions};

struct Project {
    _dir: tempfile::TempDir,
    main: PathBuf,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Project {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, contents) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("mkdir");
            }
            std::fs::write(path, contents).expect("write module");
        }
        let main = dir.path().join("main.tea");
        Project { _dir: dir, main }
    }

    fn run(&self, source: &str) -> (Vm, String) {
        let mut vm = Vm::new(VmOptions::default());
        let name = self.main.to_string_lossy().into_owned();
        if let Err(error) = vm.interpret(&name, source) {
            panic!("script failed: {error}");
        }
        (vm, name)
    }
}

fn export(vm: &mut Vm, module: &str, name: &str) -> Value {
    vm.module_export(module, name)
        .unwrap_or_else(|| panic!("export '{name}' should exist"))
}

#[test]
fn import_runs_module_top_level() {
    let project = Project::new(&[("util.tea", "var answer = 42")]);
    let (mut vm, main) = project.run(
        "import \"util.tea\" as util \
         var got = util.answer",
    );
    let got = export(&mut vm, &main, "got");
    assert_eq!(got.as_number(), 42.0);
}

#[test]
fn import_resolves_without_extension() {
    let project = Project::new(&[("helper.tea", "var x = 7")]);
    let (mut vm, main) = project.run("import \"helper\" as h var x = h.x");
    assert_eq!(export(&mut vm, &main, "x").as_number(), 7.0);
}

#[test]
fn from_import_binds_names_and_aliases() {
    let project = Project::new(&[(
        "shapes.tea",
        "function area(w, h) { return w * h } var unit = 1",
    )]);
    let (mut vm, main) = project.run(
        "from \"shapes.tea\" import area, unit as one \
         var a = area(3, 4) \
         var b = one",
    );
    assert_eq!(export(&mut vm, &main, "a").as_number(), 12.0);
    assert_eq!(export(&mut vm, &main, "b").as_number(), 1.0);
}

#[test]
fn modules_have_separate_scopes() {
    let project = Project::new(&[("a.tea", "var name = \"module a\"")]);
    let (mut vm, main) = project.run(
        "var name = \"main\" \
         import \"a.tea\" as a \
         var mine = name \
         var theirs = a.name",
    );
    let mine = export(&mut vm, &main, "mine");
    let theirs = export(&mut vm, &main, "theirs");
    assert_eq!(vm.to_display_string(mine), "main");
    assert_eq!(vm.to_display_string(theirs), "module a");
}

#[test]
fn nested_imports_resolve_relative_to_importer() {
    let project = Project::new(&[
        ("lib/inner.tea", "var deep = \"deep\""),
        ("lib/outer.tea", "import \"inner.tea\" as inner var v = inner.deep"),
    ]);
    let (mut vm, main) = project.run("import \"lib/outer.tea\" as outer var got = outer.v");
    let got = export(&mut vm, &main, "got");
    assert_eq!(vm.to_display_string(got), "deep");
}

#[test]
fn missing_import_is_a_runtime_error() {
    let project = Project::new(&[]);
    let mut vm = Vm::new(VmOptions::default());
    let name = project.main.to_string_lossy().into_owned();
    let error = vm
        .interpret(&name, "import \"nope.tea\"")
        .expect_err("missing module");
    assert!(error.is_runtime());
    assert!(error.message().contains("Could not open file"), "{error}");
}

#[test]
fn native_math_module() {
    let mut vm = Vm::new(VmOptions::default());
    vm.interpret(
        "test",
        "import math \
         var root = math.sqrt(16) \
         var biggest = math.max(1, 7, 3) \
         var pi = math.pi",
    )
    .expect("math module should import");
    assert_eq!(export(&mut vm, "test", "root").as_number(), 4.0);
    assert_eq!(export(&mut vm, "test", "biggest").as_number(), 7.0);
    let pi = export(&mut vm, "test", "pi").as_number();
    assert!((pi - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn from_import_on_native_module() {
    let mut vm = Vm::new(VmOptions::default());
    vm.interpret(
        "test",
        "from math import sqrt, min as smallest \
         var a = sqrt(9) \
         var b = smallest(4, 2, 8)",
    )
    .expect("from-import should work on native modules");
    assert_eq!(export(&mut vm, "test", "a").as_number(), 3.0);
    assert_eq!(export(&mut vm, "test", "b").as_number(), 2.0);
}

#[test]
fn unknown_native_module_errors() {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", "import nosuchmodule")
        .expect_err("unknown module");
    assert!(error.is_runtime());
    assert!(error.message().contains("Unknown module"), "{error}");
}

#[test]
fn host_registered_module_is_importable() {
    fn shout(vm: &mut Vm) -> TeaResult<()> {
        let text = vm.check_string(0)?.to_uppercase();
        vm.push_owned_string(text);
        Ok(())
    }

    fn build(vm: &mut Vm) -> TeaResult<tea_vm::Handle> {
        Ok(vm.register_module("noise", &[("shout", shout)]))
    }

    let mut vm = Vm::new(VmOptions::default());
    vm.native_modules_mut().register("noise", build);
    vm.interpret("test", "import noise var loud = noise.shout(\"hi\")")
        .expect("registered module should import");
    let loud = export(&mut vm, "test", "loud");
    assert_eq!(vm.to_display_string(loud), "HI");
}

#[test]
fn file_class_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("notes.txt");
    let script = format!(
        "var f = open(\"{path}\", \"w\") \
         f.writeline(\"first\") \
         f.write(\"second\") \
         f.close() \
         var closed = f.closed \
         var g = open(\"{path}\") \
         var contents = g.read() \
         g.close()",
        path = path.display()
    );

    let mut vm = Vm::new(VmOptions::default());
    vm.interpret("test", &script).expect("file io should work");
    let closed = export(&mut vm, "test", "closed");
    assert!(closed.as_bool());
    let contents = export(&mut vm, "test", "contents");
    assert_eq!(vm.to_display_string(contents), "first\nsecond");
}
