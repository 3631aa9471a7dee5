//! Safety Gate and Fingerprint Benchmarks
//!
//! Both run on every question, before any network or database work, so they
//! should stay effectively free.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use sqlsight::{fingerprint, safety};

fn bench_safety_gate(c: &mut Criterion) {
    let clean = "SELECT c.name, COUNT(o.id) FROM customers c \
                 JOIN orders o ON o.customer_id = c.id \
                 GROUP BY c.name ORDER BY COUNT(o.id) DESC LIMIT 10";
    let dangerous = "DROP TABLE customers";

    c.bench_function("safety_gate_clean", |b| {
        b.iter(|| safety::check(black_box(clean)));
    });

    c.bench_function("safety_gate_dangerous", |b| {
        b.iter(|| safety::check(black_box(dangerous)));
    });
}

fn bench_fingerprint(c: &mut Criterion) {
    let question = "show me the top 10 customers by order volume this quarter";

    c.bench_function("question_fingerprint", |b| {
        b.iter(|| fingerprint(black_box(question)));
    });
}

criterion_group!(benches, bench_safety_gate, bench_fingerprint);
criterion_main!(benches);
