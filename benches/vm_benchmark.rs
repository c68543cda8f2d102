//! VM performance benchmarks, with the default collector and in stress mode.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use loxide::{GcConfig, RuntimeConfig, Vm};
use std::time::Duration;

/// Compile and run `source` on a fresh VM that discards its output.
fn run_lox(source: &str, config: &RuntimeConfig) {
    let mut vm = Vm::new_with_config(config.clone(), Box::new(std::io::sink()));
    vm.interpret(black_box(source))
        .expect("benchmark program should succeed");
}

fn stress() -> RuntimeConfig {
    RuntimeConfig {
        gc: GcConfig {
            stress: true,
            ..GcConfig::default()
        },
        ..RuntimeConfig::default()
    }
}

/// Fibonacci benchmark - tests recursive function calls
fn fibonacci_source(n: u32) -> String {
    format!(
        r#"
fun fib(n) {{
  if (n < 2) return n;
  return fib(n - 1) + fib(n - 2);
}}
print fib({n});
"#
    )
}

/// Sum loop benchmark - tests basic loop, globals and arithmetic
fn sum_loop_source(n: u32) -> String {
    format!(
        r#"
var sum = 0;
for (var i = 0; i < {n}; i = i + 1) {{
  sum = sum + i;
}}
print sum;
"#
    )
}

/// Closure benchmark - creates and calls a closure per iteration
fn closure_source(n: u32) -> String {
    format!(
        r#"
fun makeAdder(k) {{
  fun add(x) {{ return x + k; }}
  return add;
}}
var total = 0;
for (var i = 0; i < {n}; i = i + 1) {{
  total = makeAdder(i)(total);
}}
print total;
"#
    )
}

/// String churn benchmark - concatenation allocates and interns every step
fn string_source(n: u32) -> String {
    format!(
        r#"
var s = "";
for (var i = 0; i < {n}; i = i + 1) {{
  s = s + "x";
  if (s == "xxxxxxxxxxxxxxxx") s = "";
}}
print s;
"#
    )
}

fn bench_fibonacci(c: &mut Criterion) {
    let mut group = c.benchmark_group("fibonacci");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    let config = RuntimeConfig::default();
    for n in [15, 20, 25] {
        let source = fibonacci_source(n);
        group.bench_with_input(BenchmarkId::new("fib", n), &source, |b, s| {
            b.iter(|| run_lox(s, &config))
        });
    }

    group.finish();
}

fn bench_loops(c: &mut Criterion) {
    let mut group = c.benchmark_group("loops");
    group.sample_size(10);

    let config = RuntimeConfig::default();
    for n in [10_000, 100_000] {
        let source = sum_loop_source(n);
        group.bench_with_input(BenchmarkId::new("sum_loop", n), &source, |b, s| {
            b.iter(|| run_lox(s, &config))
        });
    }

    group.finish();
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.sample_size(10);
    group.measurement_time(Duration::from_secs(5));

    let default = RuntimeConfig::default();
    let stress = stress();
    let closures = closure_source(2_000);
    let strings = string_source(2_000);

    group.bench_function("closures_default_gc", |b| b.iter(|| run_lox(&closures, &default)));
    group.bench_function("closures_stress_gc", |b| b.iter(|| run_lox(&closures, &stress)));
    group.bench_function("strings_default_gc", |b| b.iter(|| run_lox(&strings, &default)));
    group.bench_function("strings_stress_gc", |b| b.iter(|| run_lox(&strings, &stress)));

    group.finish();
}

criterion_group!(benches, bench_fibonacci, bench_loops, bench_allocation);
criterion_main!(benches);
