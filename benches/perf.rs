use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use less_resolver::{compile, CompileOptions};

struct Case {
    name: &'static str,
    source: &'static str,
    minify: bool,
}

fn compile_benchmarks(c: &mut Criterion) {
    let fixtures = [
        ("mixins", include_str!("../fixtures/mixins.less")),
        ("guards", include_str!("../fixtures/guards.less")),
        ("namespaces", include_str!("../fixtures/namespaces.less")),
    ];

    for (name, source) in fixtures {
        for minify in [false, true] {
            bench_case(
                c,
                &Case {
                    name,
                    source,
                    minify,
                },
            );
        }
    }
}

fn bench_case(c: &mut Criterion, case: &Case) {
    let mut group = c.benchmark_group(format!("less_resolve/{}", case.name));
    group.throughput(Throughput::Bytes(case.source.len() as u64));

    let id = BenchmarkId::new(case.name, if case.minify { "min" } else { "pretty" });
    group.bench_with_input(id, &case.minify, |b, &minify| {
        b.iter(|| {
            compile(
                case.source,
                CompileOptions {
                    minify,
                    ..CompileOptions::default()
                },
            )
            .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, compile_benchmarks);
criterion_main!(benches);
