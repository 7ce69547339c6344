use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kube_health_auditor::parsing::{parse_channel, parse_cpu_millicores, parse_memory_bytes};

fn cpu_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec![
        "100m",
        "1",
        "0.5",
        "2.5",
        "1000000000n",
        "1000000u",
        "500m",
        "1500m",
    ];

    c.bench_function("parse_cpu_millicores", |b| {
        b.iter(|| {
            for value in &test_values {
                black_box(parse_cpu_millicores(black_box(value)));
            }
        })
    });
}

fn memory_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec![
        "1Ki", "1Mi", "1Gi", "1Ti", "1K", "1M", "1G", "1T", "512Mi", "2.5Gi", "16417124Ki",
    ];

    c.bench_function("parse_memory_bytes", |b| {
        b.iter(|| {
            for value in &test_values {
                black_box(parse_memory_bytes(black_box(value)));
            }
        })
    });
}

fn channel_parsing_benchmark(c: &mut Criterion) {
    let test_values = vec!["stable-4.10", "fast-4.14", "eus-4.12", "4.9", "candidate-4.16"];

    c.bench_function("parse_channel", |b| {
        b.iter(|| {
            for value in &test_values {
                let _ = black_box(parse_channel(black_box(value)));
            }
        })
    });
}

criterion_group!(
    benches,
    cpu_parsing_benchmark,
    memory_parsing_benchmark,
    channel_parsing_benchmark
);
criterion_main!(benches);
