//! The error taxonomy, end to end: lex errors, compile errors, and
//! runtime errors each surface with the right classification and
//! message shape.

use tea_vm::{TeaError, Vm, VmOptions};

fn compile_error(source: &str) -> TeaError {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", source)
        .expect_err("source should not compile");
    assert!(error.is_compile(), "expected compile error, got: {error}");
    error
}

fn runtime_error(source: &str) -> TeaError {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", source)
        .expect_err("source should fail at runtime");
    assert!(error.is_runtime(), "expected runtime error, got: {error}");
    error
}

// === Lex errors ===

#[test]
fn unterminated_string() {
    let error = compile_error("var s = \"open");
    assert!(error.message().contains("Unterminated string"), "{error}");
}

#[test]
fn unterminated_block_comment() {
    let error = compile_error("/* still open");
    assert!(error.message().contains("block comment"), "{error}");
}

#[test]
fn bad_escape() {
    let error = compile_error(r#"var s = "\q""#);
    assert!(error.message().contains("escape"), "{error}");
}

#[test]
fn adjacent_underscores_in_number() {
    let error = compile_error("var n = 1__0");
    assert!(error.message().contains("underscore"), "{error}");
}

#[test]
fn number_too_big() {
    let error = compile_error("var n = 0xFFFFFFFFFFFFFFFFFF");
    assert!(error.message().contains("too big"), "{error}");
}

#[test]
fn interpolation_too_deep() {
    let source = r#"var s = "{ "{ "{ "{ "{1}" }" }" }" }""#;
    let error = compile_error(source);
    assert!(error.message().contains("interpolation"), "{error}");
}

// === Parse errors ===

#[test]
fn unexpected_token() {
    compile_error("var 1 = 2");
    compile_error(")");
}

#[test]
fn assignment_to_const_forms() {
    compile_error("const x = 1 x = 2");
    compile_error("const x = 1 x += 2");
    compile_error("const x = 1 x++");
    compile_error("{ const y = 1 y = 2 }");
}

#[test]
fn invalid_assignment_target() {
    let error = compile_error("var a = 1 var b = 2 a + b = 3");
    assert!(
        error.message().contains("Invalid assignment target"),
        "{error}"
    );
}

#[test]
fn return_at_top_level() {
    let error = compile_error("return 1");
    assert!(error.message().contains("top-level"), "{error}");
}

#[test]
fn this_outside_class() {
    let error = compile_error("var t = this");
    assert!(error.message().contains("'this'"), "{error}");
}

#[test]
fn super_outside_class() {
    let error = compile_error("var s = super.x");
    assert!(error.message().contains("'super'"), "{error}");
}

#[test]
fn super_without_superclass() {
    let error = compile_error("class A { m() { return super.m() } }");
    assert!(error.message().contains("no superclass"), "{error}");
}

#[test]
fn break_and_continue_outside_loop() {
    compile_error("break");
    compile_error("continue");
}

#[test]
fn duplicate_parameter() {
    let error = compile_error("function f(a, a) { return a }");
    assert!(error.message().contains("Duplicate parameter"), "{error}");
}

#[test]
fn positional_after_optional() {
    let error = compile_error("function f(a = 1, b) { return b }");
    assert!(error.message().contains("optional"), "{error}");
}

#[test]
fn spread_must_be_last() {
    let error = compile_error("function f(...rest, a) { return a }");
    assert!(error.message().contains("last"), "{error}");
}

#[test]
fn constructor_cannot_return_value() {
    let error = compile_error("class A { constructor() { return 1 } }");
    assert!(error.message().contains("constructor"), "{error}");
}

#[test]
fn error_carries_line_number() {
    let error = compile_error("var a = 1\nvar b = 2\nbreak");
    assert!(error.to_string().contains("[line 3]"), "{error}");
}

// === Runtime errors ===

#[test]
fn arity_mismatch() {
    let error = runtime_error("function f(a, b) { return a } f(1)");
    assert!(error.message().contains("Expected 2 arguments"), "{error}");
}

#[test]
fn type_mismatch_on_operators() {
    runtime_error("var x = 1 - \"s\"");
    runtime_error("var x = [] * 2");
    runtime_error("var x = -\"s\"");
    runtime_error("var x = 1 < \"s\"");
}

#[test]
fn missing_property() {
    let error = runtime_error("class A { } var a = A() var v = a.nope");
    assert!(error.message().contains("no property"), "{error}");
}

#[test]
fn missing_map_key() {
    let error = runtime_error("var m = {} var v = m[\"ghost\"]");
    assert!(error.message().contains("Key does not exist"), "{error}");
}

#[test]
fn index_out_of_bounds() {
    let error = runtime_error("var l = [1] var v = l[5]");
    assert!(error.message().contains("out of bounds"), "{error}");
}

#[test]
fn undefined_variable() {
    let error = runtime_error("print(ghost)");
    assert!(error.message().contains("Undefined variable"), "{error}");
}

#[test]
fn assigning_undefined_variable() {
    let error = runtime_error("ghost = 1");
    assert!(error.message().contains("Undefined variable"), "{error}");
}

#[test]
fn calling_a_non_callable() {
    let error = runtime_error("var x = 5 x()");
    assert!(error.message().contains("not callable"), "{error}");
}

#[test]
fn is_requires_class_operand() {
    let error = runtime_error("var x = 1 is 2");
    assert!(error.message().contains("must be a class"), "{error}");
}

#[test]
fn unpack_count_mismatch() {
    runtime_error("var a, b = [1, 2, 3]");
    runtime_error("var a, b, c = [1]");
}

#[test]
fn frame_overflow() {
    let error = runtime_error("function f() { f() } f()");
    assert!(error.message().contains("Stack overflow"), "{error}");
}

#[test]
fn stack_trace_lists_call_chain() {
    let error = runtime_error(
        "function inner() { error(\"deep\") } \
         function outer() { inner() } \
         outer()",
    );
    let rendered = error.to_string();
    assert!(rendered.contains("in inner()"), "{rendered}");
    assert!(rendered.contains("in outer()"), "{rendered}");
    assert!(rendered.contains("in script"), "{rendered}");
}

#[test]
fn engine_is_usable_after_runtime_error() {
    let mut vm = Vm::new(VmOptions::default());
    vm.interpret("test", "error(\"boom\")").expect_err("raises");
    // The protected boundary reset the stacks; the next program runs.
    vm.interpret("test2", "var ok = 1 + 1").expect("recovers");
    let ok = vm.module_export("test2", "ok").expect("ok");
    assert_eq!(ok.as_number(), 2.0);
}

#[test]
fn native_check_errors_abort() {
    let error = runtime_error("var s = \"abc\" var x = s.startswith(5)");
    assert!(error.message().contains("Expected string"), "{error}");
}

#[test]
fn import_failure() {
    let error = runtime_error("import \"definitely-not-here.tea\"");
    assert!(error.message().contains("Could not open file"), "{error}");
}

#[test]
fn compile_error_in_imported_module_propagates() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("broken.tea"), "var = ").expect("write");
    let main = dir.path().join("main.tea");

    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret(&main.to_string_lossy(), "import \"broken.tea\"")
        .expect_err("broken module");
    assert!(error.is_compile(), "{error}");
}
