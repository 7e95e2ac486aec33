//! Language semantics, end to end: declarations, control flow,
//! classes, and the builtin classes.

use tea_vm::{Value, Vm, VmOptions};

fn run(source: &str) -> Vm {
    let mut vm = Vm::new(VmOptions::default());
    if let Err(error) = vm.interpret("test", source) {
        panic!("script failed: {error}");
    }
    vm
}

fn export(vm: &mut Vm, name: &str) -> Value {
    vm.module_export("test", name)
        .unwrap_or_else(|| panic!("export '{name}' should exist"))
}

fn number(vm: &mut Vm, name: &str) -> f64 {
    let value = export(vm, name);
    assert!(value.is_number(), "{name} should be a number");
    value.as_number()
}

fn boolean(vm: &mut Vm, name: &str) -> bool {
    let value = export(vm, name);
    assert!(value.is_bool(), "{name} should be a bool");
    value.as_bool()
}

fn display(vm: &mut Vm, name: &str) -> String {
    let value = export(vm, name);
    vm.to_display_string(value)
}

#[test]
fn ternary_and_comparisons() {
    let mut vm = run("var a = 2 < 3 ? 10 : 20 var b = 2 >= 3 ? 10 : 20");
    assert_eq!(number(&mut vm, "a"), 10.0);
    assert_eq!(number(&mut vm, "b"), 20.0);
}

#[test]
fn compound_assignment_and_increment() {
    let mut vm = run(
        "var a = 10 a += 5 a -= 3 a *= 4 a /= 2 \
         var b = 2 b **= 3 \
         var c = 6 c %= 4 \
         var e = 5 e++ \
         var f = 5 f--",
    );
    assert_eq!(number(&mut vm, "a"), 24.0);
    assert_eq!(number(&mut vm, "b"), 8.0);
    assert_eq!(number(&mut vm, "c"), 2.0);
    assert_eq!(number(&mut vm, "e"), 6.0);
    assert_eq!(number(&mut vm, "f"), 4.0);
}

#[test]
fn bitwise_operators() {
    let mut vm = run(
        "var a = 12 & 10 var b = 12 | 10 var c = 12 ^ 10 \
         var d = 1 << 4 var e = 32 >> 2 var f = ~0",
    );
    assert_eq!(number(&mut vm, "a"), 8.0);
    assert_eq!(number(&mut vm, "b"), 14.0);
    assert_eq!(number(&mut vm, "c"), 6.0);
    assert_eq!(number(&mut vm, "d"), 16.0);
    assert_eq!(number(&mut vm, "e"), 8.0);
    assert_eq!(number(&mut vm, "f"), -1.0);
}

#[test]
fn pow_is_right_associative() {
    let mut vm = run("var a = 2 ** 3 ** 2");
    assert_eq!(number(&mut vm, "a"), 512.0);
}

#[test]
fn not_and_falsiness() {
    let mut vm = run(
        "var a = !0 var b = !\"\" var c = ![] var d = !{} \
         var e = not null var f = !1 var g = !\"x\"",
    );
    assert!(boolean(&mut vm, "a"));
    assert!(boolean(&mut vm, "b"));
    assert!(boolean(&mut vm, "c"));
    assert!(boolean(&mut vm, "d"));
    assert!(boolean(&mut vm, "e"));
    assert!(!boolean(&mut vm, "f"));
    assert!(!boolean(&mut vm, "g"));
}

#[test]
fn while_do_and_for_loops() {
    let mut vm = run(
        "var a = 0 while (a < 5) a += 1 \
         var b = 0 do b += 1 while (b < 3) \
         var c = 0 for (var i = 0; i < 4; i += 1) c += i",
    );
    assert_eq!(number(&mut vm, "a"), 5.0);
    assert_eq!(number(&mut vm, "b"), 3.0);
    assert_eq!(number(&mut vm, "c"), 6.0);
}

#[test]
fn break_and_continue() {
    let mut vm = run(
        "var sum = 0 \
         for (var i = 0; i < 10; i += 1) { \
           if (i == 7) break \
           if (i % 2 == 0) continue \
           sum += i \
         }",
    );
    // 1 + 3 + 5
    assert_eq!(number(&mut vm, "sum"), 9.0);
}

#[test]
fn for_in_over_builtin_sequences() {
    let mut vm = run(
        "var list_sum = 0 \
         for (var x in [1, 2, 3]) list_sum += x \
         var range_sum = 0 \
         for (var n in 0..5) range_sum += n \
         var chars = \"\" \
         for (var c in \"tea\") chars = c + chars \
         var keys = 0 \
         var map_values = 0 \
         for (var k, v in {a = 1, b = 2}) { keys += 1 map_values += v }",
    );
    assert_eq!(number(&mut vm, "list_sum"), 6.0);
    assert_eq!(number(&mut vm, "range_sum"), 10.0);
    assert_eq!(display(&mut vm, "chars"), "aet");
    assert_eq!(number(&mut vm, "keys"), 2.0);
    assert_eq!(number(&mut vm, "map_values"), 3.0);
}

#[test]
fn user_defined_iterator_protocol() {
    let mut vm = run(
        "class Countdown { \
           constructor(from) { this.from = from } \
           iterate(iter) { \
             if (iter == null) return this.from \
             if (iter <= 1) return null \
             return iter - 1 \
           } \
           iteratorvalue(iter) { return iter } \
         } \
         var collected = [] \
         for (var n in Countdown(3)) collected.add(n) \
         var ok = collected == [3, 2, 1]",
    );
    assert!(boolean(&mut vm, "ok"));
}

#[test]
fn destructuring_declarations() {
    let mut vm = run(
        "var a, b = [1, 2] \
         var x, ...rest, y = [10, 20, 30, 40] \
         var ok = rest == [20, 30] \
         var c, d = 7, 8",
    );
    assert_eq!(number(&mut vm, "a"), 1.0);
    assert_eq!(number(&mut vm, "b"), 2.0);
    assert_eq!(number(&mut vm, "x"), 10.0);
    assert_eq!(number(&mut vm, "y"), 40.0);
    assert!(boolean(&mut vm, "ok"));
    assert_eq!(number(&mut vm, "c"), 7.0);
    assert_eq!(number(&mut vm, "d"), 8.0);
}

#[test]
fn multiple_assignment_statement() {
    let mut vm = run("var a = 0 var b = 0 a, b = [5, 6]");
    assert_eq!(number(&mut vm, "a"), 5.0);
    assert_eq!(number(&mut vm, "b"), 6.0);
}

#[test]
fn classes_fields_methods_statics() {
    let mut vm = run(
        "class Counter { \
           var kind = \"counter\" \
           constructor(start) { this.value = start } \
           bump() { this.value += 1 return this.value } \
           static describe() { return \"counts\" } \
         } \
         var c = Counter(10) \
         c.bump() c.bump() \
         var value = c.value \
         var described = Counter.describe() \
         var kind = Counter.kind",
    );
    assert_eq!(number(&mut vm, "value"), 12.0);
    assert_eq!(display(&mut vm, "described"), "counts");
    assert_eq!(display(&mut vm, "kind"), "counter");
}

#[test]
fn inheritance_and_super() {
    let mut vm = run(
        "class Animal { \
           constructor(name) { this.name = name } \
           speak() { return this.name + \" makes a sound\" } \
         } \
         class Dog : Animal { \
           constructor(name) { super(name) } \
           speak() { return super.speak() + \": woof\" } \
         } \
         var d = Dog(\"Rex\") \
         var line = d.speak() \
         var is_dog = d is Dog \
         var is_animal = d is Animal \
         var not_animal = 5 is not Dog",
    );
    assert_eq!(display(&mut vm, "line"), "Rex makes a sound: woof");
    assert!(boolean(&mut vm, "is_dog"));
    assert!(boolean(&mut vm, "is_animal"));
    assert!(boolean(&mut vm, "not_animal"));
}

#[test]
fn extension_methods() {
    let mut vm = run(
        "class Box { constructor(v) { this.v = v } } \
         function Box:double() { return this.v * 2 } \
         var b = Box(21) \
         var result = b.double()",
    );
    assert_eq!(number(&mut vm, "result"), 42.0);
}

#[test]
fn subscript_operator_method() {
    let mut vm = run(
        "class Wrap { \
           constructor() { this.data = [1, 2, 3] } \
           [](index, value) { \
             if (value == null) return this.data[index] \
             this.data[index] = value \
             return value \
           } \
         } \
         var w = Wrap() \
         var got = w[1] \
         w[1] = 99 \
         var set = w.data[1]",
    );
    assert_eq!(number(&mut vm, "got"), 2.0);
    assert_eq!(number(&mut vm, "set"), 99.0);
}

#[test]
fn membership_tests() {
    let mut vm = run(
        "var a = \"ell\" in \"hello\" \
         var b = 3 in [1, 2, 3] \
         var c = \"k\" in {k = 1} \
         var d = 2 in 0..5 \
         var e = 9 not in [1, 2]",
    );
    assert!(boolean(&mut vm, "a"));
    assert!(boolean(&mut vm, "b"));
    assert!(boolean(&mut vm, "c"));
    assert!(boolean(&mut vm, "d"));
    assert!(boolean(&mut vm, "e"));
}

#[test]
fn string_interpolation() {
    let mut vm = run(
        "var name = \"tea\" \
         var n = 3 \
         var s = \"brewing {name} x{n + 1}\"",
    );
    assert_eq!(display(&mut vm, "s"), "brewing tea x4");
}

#[test]
fn string_methods() {
    let mut vm = run(
        "var s = \"  Hello World  \" \
         var up = \"tea\".upper() \
         var low = \"TEA\".lower() \
         var stripped = s.strip() \
         var rev = \"abc\".reverse() \
         var has = \"hello\".contains(\"ell\") \
         var starts = \"hello\".startswith(\"he\") \
         var parts_ok = \"a,b,c\".split(\",\") == [\"a\", \"b\", \"c\"] \
         var replaced = \"aaa\".replace(\"a\", \"b\") \
         var n = \"chai\".len",
    );
    assert_eq!(display(&mut vm, "up"), "TEA");
    assert_eq!(display(&mut vm, "low"), "tea");
    assert_eq!(display(&mut vm, "stripped"), "Hello World");
    assert_eq!(display(&mut vm, "rev"), "cba");
    assert!(boolean(&mut vm, "has"));
    assert!(boolean(&mut vm, "starts"));
    assert!(boolean(&mut vm, "parts_ok"));
    assert_eq!(display(&mut vm, "replaced"), "bbb");
    assert_eq!(number(&mut vm, "n"), 4.0);
}

#[test]
fn list_methods() {
    let mut vm = run(
        "var l = [3, 1, 2] \
         l.add(4) \
         var sorted_ok = l.copy().sort() == [1, 2, 3, 4] \
         var mapped_ok = [1, 2, 3].map((x) => x * 2) == [2, 4, 6] \
         var filtered_ok = [1, 2, 3, 4].filter((x) => x % 2 == 0) == [2, 4] \
         var reduced = [1, 2, 3, 4].reduce((a, b) => a + b) \
         var joined = [1, 2, 3].join(\"-\") \
         var idx = [\"a\", \"b\"].index(\"b\") \
         var n = l.len",
    );
    assert!(boolean(&mut vm, "sorted_ok"));
    assert!(boolean(&mut vm, "mapped_ok"));
    assert!(boolean(&mut vm, "filtered_ok"));
    assert_eq!(number(&mut vm, "reduced"), 10.0);
    assert_eq!(display(&mut vm, "joined"), "1-2-3");
    assert_eq!(number(&mut vm, "idx"), 1.0);
    assert_eq!(number(&mut vm, "n"), 4.0);
}

#[test]
fn map_operations() {
    let mut vm = run(
        "var m = {a = 1, [2] = \"two\"} \
         var a = m.a \
         var two = m[2] \
         m[\"b\"] = 5 \
         var b = m.b \
         var n = m.len \
         var merged = {x = 1} + {x = 2, y = 3} \
         var mx = merged[\"x\"]",
    );
    assert_eq!(number(&mut vm, "a"), 1.0);
    assert_eq!(display(&mut vm, "two"), "two");
    assert_eq!(number(&mut vm, "b"), 5.0);
    assert_eq!(number(&mut vm, "n"), 3.0);
    assert_eq!(number(&mut vm, "mx"), 2.0);
}

#[test]
fn list_concat_builds_a_new_list() {
    let mut vm = run(
        "var a = [1] \
         var b = [2] \
         var c = a + b \
         var a_unchanged = a == [1] \
         var c_ok = c == [1, 2]",
    );
    assert!(boolean(&mut vm, "a_unchanged"));
    assert!(boolean(&mut vm, "c_ok"));
}

#[test]
fn string_repeat() {
    let mut vm = run("var a = \"ab\" * 3 var b = 2 * \"x\"");
    assert_eq!(display(&mut vm, "a"), "ababab");
    assert_eq!(display(&mut vm, "b"), "xx");
}

#[test]
fn ranges() {
    let mut vm = run(
        "var r = 1..10..2 \
         var s = r.start \
         var e = r.end \
         var st = r.step \
         var third = (0..10)[3] \
         var neg = (0..5)[-1]",
    );
    assert_eq!(number(&mut vm, "s"), 1.0);
    assert_eq!(number(&mut vm, "e"), 10.0);
    assert_eq!(number(&mut vm, "st"), 2.0);
    assert_eq!(number(&mut vm, "third"), 3.0);
    assert_eq!(number(&mut vm, "neg"), 4.0);
}

#[test]
fn number_coercion_globals() {
    let mut vm = run(
        "var t = type(1) \
         var n = number(\"4.5\") \
         var h = hex(255) \
         var b = bin(5) \
         var c = char(97) \
         var o = ord(\"a\")",
    );
    assert_eq!(display(&mut vm, "t"), "number");
    assert_eq!(number(&mut vm, "n"), 4.5);
    assert_eq!(display(&mut vm, "h"), "0xff");
    assert_eq!(display(&mut vm, "b"), "0b101");
    assert_eq!(display(&mut vm, "c"), "a");
    assert_eq!(number(&mut vm, "o"), 97.0);
}

#[test]
fn assert_raises_runtime_error() {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", "assert(false, \"boom\")")
        .expect_err("assert should raise");
    assert!(error.is_runtime());
    assert!(error.message().contains("boom"), "{error}");
}

#[test]
fn error_global_aborts_with_trace() {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", "function f() { error(\"bad\") } f()")
        .expect_err("error() should raise");
    assert!(error.is_runtime());
    assert!(error.message().contains("bad"));
    assert!(error.to_string().contains("in f()"), "{error}");
}

#[test]
fn anonymous_and_arrow_functions() {
    let mut vm = run(
        "var f = function(x) { return x + 1 } \
         var g = (x) => x * 2 \
         var h = (a, b) => { return a + b } \
         var zero = () => 42 \
         var r1 = f(1) \
         var r2 = g(2) \
         var r3 = h(1, 2) \
         var r4 = zero()",
    );
    assert_eq!(number(&mut vm, "r1"), 2.0);
    assert_eq!(number(&mut vm, "r2"), 4.0);
    assert_eq!(number(&mut vm, "r3"), 3.0);
    assert_eq!(number(&mut vm, "r4"), 42.0);
}

#[test]
fn nested_closures_share_captures() {
    let mut vm = run(
        "function outer() { \
           var count = 0 \
           var inc = () => { count += 1 return count } \
           var get = () => count \
           inc() inc() \
           return get() \
         } \
         var result = outer()",
    );
    assert_eq!(number(&mut vm, "result"), 2.0);
}

#[test]
fn switch_without_match_runs_default_only() {
    let mut vm = run(
        "var log = [] \
         switch (5) { \
           case 1: log.add(\"one\") \
           case 2: log.add(\"two\") \
           default: log.add(\"other\") \
         } \
         var ok = log == [\"other\"]",
    );
    assert!(boolean(&mut vm, "ok"));
}

#[test]
fn shebang_and_comments() {
    let mut vm = run("#!/usr/bin/env tea\n// line comment\n/* block /* nested */ */ var a = 1");
    assert_eq!(number(&mut vm, "a"), 1.0);
}

#[test]
fn number_literal_forms() {
    let mut vm = run(
        "var a = 0xFF var b = 0b101 var c = 0c17 \
         var d = 1_000_000 var e = 2.5e2 var f = .5",
    );
    assert_eq!(number(&mut vm, "a"), 255.0);
    assert_eq!(number(&mut vm, "b"), 5.0);
    assert_eq!(number(&mut vm, "c"), 15.0);
    assert_eq!(number(&mut vm, "d"), 1_000_000.0);
    assert_eq!(number(&mut vm, "e"), 250.0);
    assert_eq!(number(&mut vm, "f"), 0.5);
}

#[test]
fn runtime_type_errors_carry_traces() {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", "var x = 1 + \"s\"")
        .expect_err("number plus string");
    assert!(error.is_runtime());
    assert!(error.message().contains("+ operator"), "{error}");
}

#[test]
fn parse_errors_synchronize_and_report_first() {
    let mut vm = Vm::new(VmOptions::default());
    let error = vm
        .interpret("test", "var = 1 \n var ok = 2")
        .expect_err("missing name");
    assert!(error.is_compile());
}
