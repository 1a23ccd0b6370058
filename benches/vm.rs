//! End-to-end benchmarks: compile + execute representative programs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::rc::Rc;

use ry::vm::Vm;

const FIB_RECURSIVE: &str = r#"
func fib(n) {
    if n <= 1 {
        return n
    }
    return fib(n - 1) + fib(n - 2)
}
var result = fib(15)
"#;

const FIB_ITERATIVE: &str = r#"
func fib(n) {
    if n <= 1 {
        return n
    }
    var a = 0
    var b = 1
    var i = 2
    while i <= n {
        var temp = a + b
        a = b
        b = temp
        i = i + 1
    }
    return b
}
var result = fib(40)
"#;

const LOOP_SUM: &str = r#"
var total = 0
for (var i = 1; i <= 10000; i = i + 1) {
    total = total + i
}
"#;

fn run_vm(source: &str) {
    let function = ry::compile(source).expect("compile error");
    let mut vm = Vm::new();
    vm.interpret(Rc::new(function), source).expect("runtime error");
}

fn fibonacci(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib");
    group.bench_function("recursive", |b| b.iter(|| run_vm(black_box(FIB_RECURSIVE))));
    group.bench_function("iterative", |b| b.iter(|| run_vm(black_box(FIB_ITERATIVE))));
    group.finish();
}

fn loop_sum(c: &mut Criterion) {
    c.bench_function("loop_sum", |b| b.iter(|| run_vm(black_box(LOOP_SUM))));
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");
    for n in [10, 15, 18].iter() {
        let source = format!(
            r#"
func fib(n) {{
    if n <= 1 {{
        return n
    }}
    return fib(n - 1) + fib(n - 2)
}}
var result = fib({})
"#,
            n
        );
        group.bench_with_input(BenchmarkId::from_parameter(n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }
    group.finish();
}

/// Compilation time alone, without execution.
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    group.bench_function("fib", |b| {
        b.iter(|| ry::compile(black_box(FIB_RECURSIVE)).unwrap())
    });
    group.bench_function("loop", |b| {
        b.iter(|| ry::compile(black_box(LOOP_SUM)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, fibonacci, loop_sum, fib_scaling, compilation_overhead);
criterion_main!(benches);
