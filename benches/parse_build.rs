use binform::prelude::*;
use criterion::{criterion_group, criterion_main, Criterion};

fn gen_format(field_count: usize) -> Con {
    let mut members = Vec::with_capacity(field_count + 1);
    members.push("count" / rebuild(int16ub(), lit(field_count as u64)));
    for i in 0..field_count {
        members.push(int16ub().named(format!("f{}", i)));
    }
    record(members)
}

fn gen_packet(field_count: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(2 + field_count * 2);
    data.extend_from_slice(&(field_count as u16).to_be_bytes());

    // Deterministic but non-trivial pattern
    for i in 0..field_count * 2 {
        data.push((i * 31 % 256) as u8);
    }

    data
}

fn bench_parse(c: &mut Criterion) {
    for &field_count in &[1usize, 10, 50, 100] {
        let format = gen_format(field_count);
        let packet = gen_packet(field_count);

        c.bench_function(&format!("parse_{}_fields", field_count), |b| {
            b.iter(|| {
                let _ = format.parse(&packet).unwrap();
            })
        });
    }
}

fn bench_build(c: &mut Criterion) {
    let format = gen_format(50);
    let packet = gen_packet(50);
    let value = format.parse(&packet).unwrap();

    c.bench_function("build_50_fields", |b| {
        b.iter(|| {
            let _ = format.build(&value).unwrap();
        })
    });
}

criterion_group!(benches, bench_parse, bench_build);
criterion_main!(benches);
