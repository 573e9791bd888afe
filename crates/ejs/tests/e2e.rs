//! End-to-end console-output scenarios (spec §8 "End-to-end scenarios").
//!
//! Each test runs a literal JS program through [`Engine::exec`] against a
//! [`NullHost`] and asserts on the bytes the script wrote to the console,
//! mirroring `ouros`'s `tests/repl_tests.rs` style of driving the whole
//! interpreter through its public entry point rather than poking internals.

use ejs::{Engine, EngineConfig, NullHost};

fn run(source: &str) -> String {
    let (host, output) = NullHost::with_handle();
    let mut engine = Engine::new(EngineConfig::default(), host);
    let result = engine.exec(source);
    assert!(result.is_ok(), "script should not throw: {:?}", result.err());
    output.output()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(run("print(1+2*3)"), "7\n");
}

#[test]
fn function_call_and_return() {
    assert_eq!(run("var f = function(x){ return x*x; }; print(f(5))"), "25\n");
}

#[test]
fn array_sort_with_comparator() {
    assert_eq!(
        run("var a = [3,1,4,1,5,9,2,6]; a.sort(function(x,y){return x-y;}); print(a.join(','))"),
        "1,1,2,3,4,5,6,9\n"
    );
}

#[test]
fn json_stringify_nested_object() {
    assert_eq!(
        run(r#"print(JSON.stringify({a:1,b:[true,null,"x"]}))"#),
        "{\"a\":1,\"b\":[true,null,\"x\"]}\n"
    );
}

#[test]
fn try_catch_binds_thrown_message() {
    assert_eq!(run(r#"try { throw new Error("oops"); } catch(e) { print(e.message); }"#), "oops\n");
}

#[test]
fn string_concatenation_in_a_loop() {
    assert_eq!(run("var s=\"\"; for (var i=0;i<5;i++) s+=i; print(s)"), "01234\n");
}

#[test]
fn typeof_reflection() {
    assert_eq!(run("print(typeof 1, typeof \"s\", typeof [], typeof null)"), "number string object object\n");
}

#[test]
fn regex_global_replace() {
    assert_eq!(run(r#"print("abc123def".replace(/[0-9]+/g, "#"))"#), "abc#def\n");
}

#[test]
fn uncaught_exception_surfaces_to_caller() {
    let mut engine = Engine::new(EngineConfig::default(), NullHost::new());
    let err = engine.exec("throw new TypeError('boom');").unwrap_err();
    assert_eq!(err.message, "boom");
}

#[test]
fn class_extends_super_lowers_to_prototype_chain() {
    assert_eq!(
        run(
            "class Animal { constructor(name) { this.name = name; } speak() { return this.name + ' makes a sound'; } } \
             class Dog extends Animal { speak() { return super.speak() + ' (bark)'; } } \
             print(new Dog('Rex').speak());"
        ),
        "Rex makes a sound (bark)\n"
    );
}

#[test]
fn template_literal_desugars_to_concatenation() {
    assert_eq!(run("var x = 3; print(`x is ${x} and doubled ${x*2}`)"), "x is 3 and doubled 6\n");
}

#[test]
fn eval_shares_calling_scope() {
    assert_eq!(run("var x = 10; eval('x = x + 5;'); print(x)"), "15\n");
}

#[test]
fn typed_array_indexed_access_and_length() {
    assert_eq!(
        run("var a = new Int8Array(3); a[0] = 1; a[1] = 2; a[2] = -3; print(a.length, a[0], a[1], a[2]);"),
        "3 1 2 -3\n"
    );
}

#[test]
fn typed_array_wraps_out_of_range_int8_values() {
    assert_eq!(run("var a = new Uint8ClampedArray(1); a[0] = 400; print(a[0]);"), "255\n");
}

#[test]
fn typed_array_constructed_from_array_copies_values() {
    assert_eq!(run("var a = new Int32Array([1,2,3]); print(a.length, a[1]);"), "3 2\n");
}

#[test]
fn for_of_over_typed_array_visits_every_element() {
    assert_eq!(
        run(
            "var a = new Float64Array(3); a[0]=1.5; a[1]=2.5; a[2]=3.5; \
             var sum = 0; for (var x of a) { sum += x; } print(sum);"
        ),
        "7.5\n"
    );
}

#[test]
fn dataview_reads_across_explicit_endianness() {
    assert_eq!(
        run(
            "var buf = new ArrayBuffer(4); var dv = new DataView(buf); \
             dv.setUint16(0, 0x0102, true); \
             print(dv.getUint16(0, true), dv.getUint16(0, false));"
        ),
        "258 513\n"
    );
}

#[test]
fn array_reduce_right_and_last_index_of() {
    assert_eq!(
        run(
            "var a = [1,2,1]; \
             print(a.lastIndexOf(1), a.reduceRight(function(acc, x){ return acc + '-' + x; }));"
        ),
        "2 1-2-1\n"
    );
}

#[test]
fn number_to_string_exponential_and_precision() {
    assert_eq!(
        run("print((255).toString(16), (1234).toExponential(2), (123.456).toPrecision(4));"),
        "ff 1.23e+3 123.5\n"
    );
}
