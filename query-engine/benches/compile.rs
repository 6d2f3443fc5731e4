use carbon_ql::parse;
use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use query_engine::sql::histogram_buckets;
use query_engine::{Compiler, Lookup, QueryInput, QueryMode, Selection, TimeWindow};

fn benchmark(c: &mut Criterion) {
    let filters = parse(r#"{level="ERROR", labels.app="api", labels.team!="core", traceID!=""}"#)
        .unwrap();
    let selection = Selection {
        log_levels: vec!["WARN".into(), "ERROR".into(), "FATAL".into()],
        apps: vec!["api".into(), "web".into()],
        ..Default::default()
    };
    let input = QueryInput {
        mode: QueryMode::Builder,
        sql: None,
        search_term: "timeout",
        filters: &filters,
        selection: &selection,
    };
    let compiler = Compiler::default();
    let window = TimeWindow::default().resolve(Utc::now());

    c.bench_function("compile expression", |b| b.iter(|| compiler.expression(&input)));

    let expression = compiler.expression(&input);
    c.bench_function("compile refresh cycle", |b| b.iter(|| {
        let mut queries = vec![
            compiler.log_rows(&expression, &window),
            compiler.histogram(&expression, &selection.log_levels, &window),
        ];
        for lookup in Lookup::ALL {
            queries.push(compiler.lookup(lookup, &input, &window));
        }
        queries
    }));

    c.bench_function("histogram buckets", |b| b.iter(|| histogram_buckets(window.duration())));
}

criterion_group!(benches, benchmark);
criterion_main!(benches);
