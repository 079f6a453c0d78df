//! Benchmarks for the monitor fast paths.
//!
//! Measures uncontended monitor operations on a single thread:
//! - Enter and exit of a free embedded word
//! - Enter and exit of a word reserved for the calling thread
//! - Nested reentry
//! - Enter and exit through the lookup cache for external words
//! - Lock word decoding

extern crate lockword;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use lockword::prelude::*;

/// Benchmark a normal enter/exit pair: two compare-and-swaps.
fn bench_enter_exit_normal(c: &mut Criterion) {
    let registry = ThreadRegistry::new();
    let heap = ObjectHeap::new();
    let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
    let thread = registry.attach();
    let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));

    c.bench_function("enter_exit_normal", |b| {
        b.iter(|| {
            protocol.enter(&thread, black_box(&object), false).unwrap();
            protocol.exit(&thread, black_box(&object), false).unwrap();
        });
    });
}

/// Benchmark a reserved enter/exit pair: one plain store and one release store.
fn bench_enter_exit_reserved(c: &mut Criterion) {
    let registry = ThreadRegistry::new();
    let heap = ObjectHeap::new();
    let protocol = MonitorProtocol::with_config(
        BackoffFallback::new(registry.clone()),
        LockingConfig::reserving(),
    );
    let thread = registry.attach();
    let object = heap.allocate(ClassInfo::with_lockword("java.util.Vector"));
    protocol.enter(&thread, &object, true).unwrap();
    protocol.exit(&thread, &object, true).unwrap();

    c.bench_function("enter_exit_reserved", |b| {
        b.iter(|| {
            protocol.enter(&thread, black_box(&object), true).unwrap();
            protocol.exit(&thread, black_box(&object), true).unwrap();
        });
    });
}

/// Benchmark nested acquisition eight levels deep.
fn bench_nested_reentry(c: &mut Criterion) {
    let registry = ThreadRegistry::new();
    let heap = ObjectHeap::new();
    let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
    let thread = registry.attach();
    let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));

    c.bench_function("nested_reentry_8", |b| {
        b.iter(|| {
            for _ in 0..8 {
                protocol.enter(&thread, black_box(&object), false).unwrap();
            }
            for _ in 0..8 {
                protocol.exit(&thread, black_box(&object), false).unwrap();
            }
        });
    });
}

/// Benchmark enter/exit on an object without an embedded word (cache hit path).
fn bench_enter_exit_external(c: &mut Criterion) {
    let registry = ThreadRegistry::new();
    let heap = ObjectHeap::new();
    let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
    let thread = registry.attach();
    let object = heap.allocate(ClassInfo::without_lockword("java.lang.String"));

    c.bench_function("enter_exit_external", |b| {
        b.iter(|| {
            protocol.enter(&thread, black_box(&object), false).unwrap();
            protocol.exit(&thread, black_box(&object), false).unwrap();
        });
    });
}

/// Benchmark decoding of each word shape.
fn bench_decode(c: &mut Criterion) {
    let tag = OwnerTag::from_index(42).unwrap();
    let words = [
        LockWord::FREE,
        LockWord::with_owner(tag).increment_recursion(),
        LockWord::reserved_for(tag),
        LockWord::inflated(0x1000),
    ];

    c.bench_function("lockword_decode", |b| {
        b.iter(|| {
            for word in &words {
                black_box(black_box(*word).decode());
            }
        });
    });
}

criterion_group!(
    benches,
    bench_enter_exit_normal,
    bench_enter_exit_reserved,
    bench_nested_reentry,
    bench_enter_exit_external,
    bench_decode
);
criterion_main!(benches);
