use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weft_core::pipeline::{InjectOptions, Injector, RemoveOptions, Remover};
use weft_core::{GoFile, Registry, TransformContext};

/// A service with `handlers` HTTP handlers, each with one error guard.
fn service(handlers: usize) -> String {
    let mut src = String::from(
        "package main\n\nimport (\n\t\"database/sql\"\n\t\"net/http\"\n)\n\nfunc main() {\n\tdb, err := sql.Open(\"postgres\", dsn)\n\tif err != nil {\n\t\tpanic(err)\n\t}\n",
    );
    for i in 0..handlers {
        src.push_str(&format!("\thttp.HandleFunc(\"/h{i}\", handler{i}(db))\n"));
    }
    src.push_str("\thttp.ListenAndServe(\":8080\", nil)\n}\n");
    for i in 0..handlers {
        src.push_str(&format!(
            "\nfunc handler{i}(db *sql.DB) http.HandlerFunc {{\n\treturn func(w http.ResponseWriter, r *http.Request) {{\n\t\trow := db.QueryRow(\"select {i}\")\n\t\tif err := row.Err(); err != nil {{\n\t\t\thttp.Error(w, err.Error(), 500)\n\t\t\treturn\n\t\t}}\n\t\tresp, err := http.Get(upstream)\n\t\tif err != nil {{\n\t\t\treturn\n\t\t}}\n\t\tdefer resp.Body.Close()\n\t}}\n}}\n"
        ));
    }
    src
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for size in [1, 10, 100] {
        let src = service(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &src, |b, src| {
            b.iter(|| GoFile::parse(black_box(src)).map(|f| f.print()))
        });
    }
    group.finish();
}

fn bench_inject(c: &mut Criterion) {
    let registry = Registry::builtin();
    let injector = Injector::new(&registry, InjectOptions::default());
    let ctx = TransformContext::new();
    let mut group = c.benchmark_group("inject");
    for size in [1, 10, 100] {
        let src = service(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &src, |b, src| {
            b.iter(|| injector.inject_source(black_box(src), &ctx))
        });
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let registry = Registry::builtin();
    let injector = Injector::new(&registry, InjectOptions::default());
    let remover = Remover::new(&registry, RemoveOptions::default());
    let ctx = TransformContext::new();
    let injected = injector.inject_source(&service(100), &ctx).output;
    c.bench_function("remove_100", |b| {
        b.iter(|| remover.remove_source(black_box(&injected), &ctx))
    });
}

criterion_group!(benches, bench_parse, bench_inject, bench_remove);
criterion_main!(benches);
