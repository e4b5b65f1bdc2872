// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Publish/Read Latency Benchmark
//!
//! Measures `ProviderContext::set_offset` (writer push) and
//! `ConsumerContext::get_offset` (reader poll) against a temp-file-backed
//! region, isolating the shared-memory protocol overhead from any network
//! or daemon-side cost (this crate has no notion of either).

use byztime::{ConsumerContext, ProviderContext, Stamp};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box as bb;
use tempfile::tempdir;

fn bench_publish(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("region");
    let mut provider = ProviderContext::open_rw(&path).unwrap();

    c.bench_function("provider_set_offset", |b| {
        b.iter(|| {
            provider
                .set_offset(bb(Stamp::new(5, 0)), bb(Stamp::new(0, 1_000_000)), None)
                .unwrap();
        });
    });
}

fn bench_read(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("region");
    let mut provider = ProviderContext::open_rw(&path).unwrap();
    provider
        .set_offset(Stamp::new(5, 0), Stamp::new(0, 1_000_000), None)
        .unwrap();

    let mut consumer = ConsumerContext::open_ro(&path).unwrap();

    c.bench_function("consumer_get_offset", |b| {
        b.iter(|| bb(consumer.get_offset().unwrap()));
    });

    c.bench_function("consumer_get_global_time", |b| {
        b.iter(|| bb(consumer.get_global_time().unwrap()));
    });
}

criterion_group!(benches, bench_publish, bench_read);
criterion_main!(benches);
