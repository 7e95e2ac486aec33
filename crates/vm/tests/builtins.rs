//! The builtin class method tables, exercised from scripts.

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
    export(vm, name).as_number()
}

fn boolean(vm: &mut Vm, name: &str) -> bool {
    export(vm, name).as_bool()
}

fn display(vm: &mut Vm, name: &str) -> String {
    let value = export(vm, name);
    vm.to_display_string(value)
}

#[test]
fn string_search_methods() {
    let mut vm = run(
        "var c = \"aaa\".count(\"aa\") \
         var f1 = \"hello world\".find(\"o\") \
         var f2 = \"hello world\".find(\"o\", 2) \
         var missing = \"abc\".find(\"z\") \
         var t = \"hello world\".title() \
         var ends = \"script.tea\".endswith(\".tea\")",
    );
    // Overlapping occurrences count.
    assert_eq!(number(&mut vm, "c"), 2.0);
    assert_eq!(number(&mut vm, "f1"), 4.0);
    assert_eq!(number(&mut vm, "f2"), 7.0);
    assert_eq!(number(&mut vm, "missing"), -1.0);
    assert_eq!(display(&mut vm, "t"), "Hello World");
    assert!(boolean(&mut vm, "ends"));
}

#[test]
fn string_split_variants() {
    let mut vm = run(
        "var words = \"a b c\".split() \
         var csv = \"a,b,,c\".split(\",\") \
         var chars = \"tea\".split(\"\") \
         var ok1 = words == [\"a\", \"b\", \"c\"] \
         var ok2 = csv == [\"a\", \"b\", \"\", \"c\"] \
         var ok3 = chars == [\"t\", \"e\", \"a\"]",
    );
    assert!(boolean(&mut vm, "ok1"));
    assert!(boolean(&mut vm, "ok2"));
    assert!(boolean(&mut vm, "ok3"));
}

#[test]
fn string_indexing_is_codepoint_aware() {
    let mut vm = run(
        "var s = \"чай\" \
         var n = s.len \
         var first = s[0] \
         var last = s[-1] \
         var rev = s.reverse()",
    );
    assert_eq!(number(&mut vm, "n"), 3.0);
    assert_eq!(display(&mut vm, "first"), "ч");
    assert_eq!(display(&mut vm, "last"), "й");
    assert_eq!(display(&mut vm, "rev"), "йач");
}

#[test]
fn list_mutators() {
    let mut vm = run(
        "var l = [1, 2, 3] \
         l.insert(1, 99) \
         var inserted = l == [1, 99, 2, 3] \
         l.remove(99) \
         var removed = l == [1, 2, 3] \
         l.delete(0) \
         var deleted = l == [2, 3] \
         l.swap(0, 1) \
         var swapped = l == [3, 2] \
         l.fill(7) \
         var filled = l == [7, 7] \
         l.clear() \
         var cleared = l.len == 0",
    );
    for name in ["inserted", "removed", "deleted", "swapped", "filled", "cleared"] {
        assert!(boolean(&mut vm, name), "{name}");
    }
}

#[test]
fn list_queries_and_callbacks() {
    let mut vm = run(
        "var l = [4, 1, 4, 2] \
         var c = l.count(4) \
         var has = l.contains(2) \
         var at = l.index(2) \
         var found = l.find((x) => x > 3) \
         var total = l.reduce((a, b) => a + b, 10) \
         var seen = [] \
         l.foreach((x) => seen.add(x)) \
         var seen_ok = seen == [4, 1, 4, 2] \
         var ext = [1].extend([2, 3]) == [1, 2, 3]",
    );
    assert_eq!(number(&mut vm, "c"), 2.0);
    assert!(boolean(&mut vm, "has"));
    assert_eq!(number(&mut vm, "at"), 3.0);
    assert_eq!(number(&mut vm, "found"), 4.0);
    assert_eq!(number(&mut vm, "total"), 21.0);
    assert!(boolean(&mut vm, "seen_ok"));
    assert!(boolean(&mut vm, "ext"));
}

#[test]
fn map_views_and_mutators() {
    let mut vm = run(
        "var m = {a = 1, b = 2} \
         var ks = m.keys \
         var vs = m.values \
         var has = m.contains(\"a\") \
         var lacks = m.contains(\"z\") \
         var copy = m.copy() \
         copy.delete(\"a\") \
         var copy_len = copy.len \
         var orig_len = m.len \
         var key_count = ks.len \
         var value_sum = vs.reduce((x, y) => x + y)",
    );
    assert!(boolean(&mut vm, "has"));
    assert!(!boolean(&mut vm, "lacks"));
    assert_eq!(number(&mut vm, "copy_len"), 1.0);
    assert_eq!(number(&mut vm, "orig_len"), 2.0);
    assert_eq!(number(&mut vm, "key_count"), 2.0);
    assert_eq!(number(&mut vm, "value_sum"), 3.0);
}

#[test]
fn map_accepts_scalar_keys() {
    let mut vm = run(
        "var m = {} \
         m[true] = \"yes\" \
         m[null] = \"nothing\" \
         m[2.5] = \"half\" \
         var a = m[true] \
         var b = m[null] \
         var c = m[2.5] \
         var n = m.len",
    );
    assert_eq!(display(&mut vm, "a"), "yes");
    assert_eq!(display(&mut vm, "b"), "nothing");
    assert_eq!(display(&mut vm, "c"), "half");
    assert_eq!(number(&mut vm, "n"), 3.0);
}

#[test]
fn range_views() {
    let mut vm = run(
        "var r = 0..10..2 \
         var n = r.len \
         var rev = r.reverse() \
         var rs = rev.start \
         var has = r.contains(4) \
         var lacks = r.contains(11) \
         var ctor = Range(3).end",
    );
    assert_eq!(number(&mut vm, "n"), 5.0);
    assert_eq!(number(&mut vm, "rs"), 10.0);
    assert!(boolean(&mut vm, "has"));
    assert!(!boolean(&mut vm, "lacks"));
    assert_eq!(number(&mut vm, "ctor"), 3.0);
}

#[test]
fn range_contains_requires_step_alignment() {
    // `contains()` tests bounds AND the step lattice; the `in`
    // operator tests bounds alone. They diverge on purpose — keep it
    // that way.
    let mut vm = run(
        "var r = Range(0, 10, 2) \
         var on_step = r.contains(4) \
         var off_step = r.contains(3) \
         var out = r.contains(12) \
         var in_on = 4 in r \
         var in_off = 3 in r \
         var in_out = 12 in r",
    );
    assert!(boolean(&mut vm, "on_step"));
    assert!(!boolean(&mut vm, "off_step"));
    assert!(!boolean(&mut vm, "out"));
    assert!(boolean(&mut vm, "in_on"));
    assert!(boolean(&mut vm, "in_off"), "`in` ignores the step");
    assert!(!boolean(&mut vm, "in_out"));
}

#[test]
fn range_iteration_honors_step() {
    let mut vm = run(
        "var up = [] \
         for (var i in 0..10..3) up.add(i) \
         var up_ok = up == [0, 3, 6, 9] \
         var down = [] \
         for (var i in 5..0..-1) down.add(i) \
         var down_ok = down == [5, 4, 3, 2, 1]",
    );
    assert!(boolean(&mut vm, "up_ok"));
    assert!(boolean(&mut vm, "down_ok"));
}

#[test]
fn number_methods() {
    let mut vm = run(
        "var s = (42).toString() \
         var f = (2.75).floor() \
         var c = (2.25).ceil() \
         var r = (2.5).round() \
         var a = (-3).abs()",
    );
    assert_eq!(display(&mut vm, "s"), "42");
    assert_eq!(number(&mut vm, "f"), 2.0);
    assert_eq!(number(&mut vm, "c"), 3.0);
    assert_eq!(number(&mut vm, "r"), 3.0);
    assert_eq!(number(&mut vm, "a"), 3.0);
}

#[test]
fn string_constructor_coerces() {
    let mut vm = run(
        "var a = String(42) \
         var b = String(true) \
         var c = String([1, 2]) \
         var d = String(null)",
    );
    assert_eq!(display(&mut vm, "a"), "42");
    assert_eq!(display(&mut vm, "b"), "true");
    assert_eq!(display(&mut vm, "c"), "[1, 2]");
    assert_eq!(display(&mut vm, "d"), "null");
}

#[test]
fn display_formats() {
    let mut vm = run(
        "var l = [1, \"two\", [3]] \
         var m = {a = 1} \
         var r = 1..4 \
         var nested = {[2] = \"x\"}",
    );
    assert_eq!(display(&mut vm, "l"), "[1, two, [3]]");
    assert_eq!(display(&mut vm, "m"), "{a = 1}");
    assert_eq!(display(&mut vm, "r"), "1...4");
    assert_eq!(display(&mut vm, "nested"), "{[2] = x}");
}

#[test]
fn bound_methods_remember_their_receiver() {
    let mut vm = run(
        "var l = [1, 2] \
         var add = l.add \
         add(3) \
         var ok = l == [1, 2, 3]",
    );
    assert!(boolean(&mut vm, "ok"));
}

#[test]
fn time_and_sys_modules() {
    let mut vm = run(
        "import time \
         var t = time.time() \
         var c = time.clock() \
         import sys \
         var v = sys.version \
         var args = sys.argv",
    );
    assert!(number(&mut vm, "t") > 0.0);
    assert!(number(&mut vm, "c") >= 0.0);
    assert!(!display(&mut vm, "v").is_empty());
    let args = export(&mut vm, "args");
    assert!(vm.values_equal(args, args));
}

#[test]
fn argv_reaches_scripts() {
    let mut vm = Vm::new(VmOptions {
        argv: vec!["one".to_string(), "two".to_string()],
        ..VmOptions::default()
    });
    vm.interpret(
        "test",
        "import sys var n = sys.argv.len var first = sys.argv[0]",
    )
    .expect("runs");
    let n = vm.module_export("test", "n").expect("n");
    assert_eq!(n.as_number(), 2.0);
    let first = vm.module_export("test", "first").expect("first");
    assert_eq!(vm.to_display_string(first), "one");
}
