use carbon_ql::{parse, Filter, FilterSet};
use criterion::{criterion_group, criterion_main, Criterion};

fn benchmark(c: &mut Criterion) {
    c.bench_function("parse single filter", |b| b.iter(|| {
        parse(r#"{level="ERROR"}"#)
    }));

    c.bench_function("parse many filters", |b| b.iter(|| {
        parse(r#"{level="ERROR", body!="Something bad", labels.app="api", labels.http.status_code=404, traceID!="", labels.pod_name="otelgen-pod-cf186283"}"#)
    }));

    let set = (0..32).fold(FilterSet::new(), |set, i| {
        set.add(&Filter::eq(format!("labels.k{}", i), i))
    });
    c.bench_function("toggle in 32 filters", |b| b.iter(|| {
        set.toggle(&Filter::eq("labels.k16", 16))
    }));
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
