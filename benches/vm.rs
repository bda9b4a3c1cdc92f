//! Benchmarks comparing the tree-walking interpreter against the
//! bytecode VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use quill::bytecode::{Compiler, Vm};
use quill::interpreter::Interpreter;
use quill::lexer::Scanner;
use quill::parser::Parser;

const FIB_RECURSIVE: &str = "
let fib = fn(n) {
    if (n < 2) { n } else { fib(n - 1) + fib(n - 2) }
};
fib(15);
";

const LOOP_SUM: &str = "
let sum = 0;
let i = 0;
while (i < 10000) {
    let sum = sum + i;
    let i = i + 1;
}
sum;
";

const ARRAY_BUILD: &str = "
let acc = [];
let i = 0;
while (i < 500) {
    let acc = push(acc, i * 2);
    let i = i + 1;
}
len(acc);
";

/// Parse source into an AST.
fn parse(source: &str) -> quill::ast::Program {
    let tokens = Scanner::new(source).scan_tokens().expect("lexer error");
    Parser::new(tokens).parse().expect("parser error")
}

/// Run via tree-walking interpreter.
fn run_treewalk(source: &str) {
    let program = parse(source);
    let mut interpreter = Interpreter::new();
    interpreter.interpret(&program).expect("runtime error");
}

/// Run via bytecode VM (compile + execute).
fn run_vm(source: &str) {
    let program = parse(source);
    let mut compiler = Compiler::new();
    compiler.compile(&program).expect("compile error");
    let mut vm = Vm::new(compiler.bytecode());
    vm.run().expect("vm runtime error");
}

fn fibonacci_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_recursive_comparison");

    group.bench_function("treewalk", |b| {
        b.iter(|| run_treewalk(black_box(FIB_RECURSIVE)))
    });
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(FIB_RECURSIVE))));

    group.finish();
}

fn loop_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("loop_sum_comparison");

    group.bench_function("treewalk", |b| {
        b.iter(|| run_treewalk(black_box(LOOP_SUM)))
    });
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(LOOP_SUM))));

    group.finish();
}

fn array_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_build_comparison");

    group.bench_function("treewalk", |b| {
        b.iter(|| run_treewalk(black_box(ARRAY_BUILD)))
    });
    group.bench_function("vm", |b| b.iter(|| run_vm(black_box(ARRAY_BUILD))));

    group.finish();
}

fn fib_scaling_comparison(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling_comparison");

    for n in [10, 15, 18].iter() {
        let source = format!(
            "let fib = fn(n) {{ if (n < 2) {{ n }} else {{ fib(n - 1) + fib(n - 2) }} }}; fib({});",
            n
        );

        group.bench_with_input(BenchmarkId::new("treewalk", n), &source, |b, src| {
            b.iter(|| run_treewalk(black_box(src)))
        });
        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }

    group.finish();
}

/// Benchmark compilation alone (no execution).
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    let program = parse(FIB_RECURSIVE);
    group.bench_function("compile_fib", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            compiler.compile(black_box(&program)).unwrap();
            compiler.bytecode()
        })
    });

    let program = parse(LOOP_SUM);
    group.bench_function("compile_loop", |b| {
        b.iter(|| {
            let mut compiler = Compiler::new();
            compiler.compile(black_box(&program)).unwrap();
            compiler.bytecode()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    fibonacci_comparison,
    loop_comparison,
    array_comparison,
    fib_scaling_comparison,
    compilation_overhead,
);

criterion_main!(benches);
