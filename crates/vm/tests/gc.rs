//! Collector behavior observed through whole programs.

use tea_vm::{Vm, VmOptions};

fn run(source: &str) -> Vm {
    let mut vm = Vm::new(VmOptions::default());
    if let Err(error) = vm.interpret("test", source) {
        panic!("script failed: {error}");
    }
    vm
}

#[test]
fn collection_reclaims_unreachable_objects() {
    let mut vm = run(
        "for (var i = 0; i < 10000; i += 1) { \
           var garbage = [i.toString(), i.toString(), [i]] \
         } \
         var keep = \"survivor\"",
    );
    let (live_before, _) = vm.gc_stats();
    vm.collect_garbage();
    let (live_after, _) = vm.gc_stats();
    assert!(live_after <= live_before);

    // The module export stays intact across an explicit collection.
    let keep = vm.module_export("test", "keep").expect("keep");
    assert_eq!(vm.to_display_string(keep), "survivor");
}

#[test]
fn closures_keep_captures_alive_across_collections() {
    let mut vm = run(
        "function make() { \
           var secret = \"kept-\" + \"alive\" \
           return () => secret \
         } \
         var f = make() \
         gc() \
         var still = f()",
    );
    let still = vm.module_export("test", "still").expect("still");
    assert_eq!(vm.to_display_string(still), "kept-alive");
}

#[test]
fn cyclic_structures_are_collected() {
    let mut vm = run(
        "for (var i = 0; i < 1000; i += 1) { \
           var a = [] \
           var b = [a] \
           a.add(b) \
         } \
         var done = true",
    );
    let (live_before, _) = vm.gc_stats();
    vm.collect_garbage();
    let (live_after, _) = vm.gc_stats();
    // The cycles are unreachable; the collector must not leak them.
    assert!(live_after < live_before);
}

#[test]
fn class_and_method_cycles_survive_while_reachable() {
    let mut vm = run(
        "class Node { \
           constructor(value) { this.value = value this.next = null } \
           chain(other) { this.next = other return other } \
         } \
         var head = Node(1) \
         head.chain(Node(2)).chain(Node(3)) \
         gc() \
         var sum = head.value + head.next.value + head.next.next.value",
    );
    let sum = vm.module_export("test", "sum").expect("sum");
    assert_eq!(sum.as_number(), 6.0);
}

#[test]
fn stress_mode_matches_normal_mode_results() {
    let program = "var acc = [] \
                   for (var i = 0; i < 120; i += 1) { \
                     acc.add(\"item-{i}\") \
                   } \
                   var joined = acc.join(\",\") \
                   var n = acc.len";

    let mut normal = Vm::new(VmOptions::default());
    normal.interpret("test", program).expect("normal");
    let mut stressed = Vm::new(VmOptions {
        gc_stress: true,
        ..VmOptions::default()
    });
    stressed.interpret("test", program).expect("stressed");

    let a = normal.module_export("test", "joined").expect("joined");
    let b = stressed.module_export("test", "joined").expect("joined");
    assert_eq!(
        normal.to_display_string(a),
        stressed.to_display_string(b)
    );
}

#[test]
fn explicit_gc_global_is_callable() {
    let mut vm = run("gc() var after = 1");
    let after = vm.module_export("test", "after").expect("after");
    assert_eq!(after.as_number(), 1.0);
}

#[test]
fn interned_strings_survive_via_any_reference() {
    let mut vm = run(
        "var a = \"in\" + \"terned\" \
         gc() \
         var b = \"interned\"",
    );
    let a = vm.module_export("test", "a").expect("a");
    let b = vm.module_export("test", "b").expect("b");
    // Same canonical object even though a collection ran in between.
    assert_eq!(a.as_object(), b.as_object());
}

#[test]
fn upvalues_closed_by_returns_are_traced() {
    let mut vm = run(
        "function counter() { \
           var n = 0 \
           return [() => { n += 1 return n }, () => n] \
         } \
         var fns = counter() \
         gc() \
         fns[0]() fns[0]() \
         var read = fns[1]()",
    );
    let read = vm.module_export("test", "read").expect("read");
    assert_eq!(read.as_number(), 2.0);
}
