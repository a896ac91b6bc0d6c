#[macro_use]
extern crate criterion;

use criterion::Criterion;

use siphon::metric::Metric;
use siphon::protocols::wire::{decode, encode};

fn frame() -> Vec<u8> {
    let m = Metric::new("php.request.duration", 1_234)
        .timestamp_secs(1_700_000_000)
        .tags(vec!["checkout", "eu-west-1", "web-07"]);
    let mut buf = Vec::new();
    encode(&m, &mut buf).unwrap();
    buf
}

fn benchmark(c: &mut Criterion) {
    let payload = frame();
    c.bench_function("decode_wire", move |b| {
        b.iter(|| decode(&payload).unwrap());
    });

    let short = vec![0u8; 12];
    c.bench_function("decode_wire_too_short", move |b| {
        b.iter(|| decode(&short).is_err());
    });
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
